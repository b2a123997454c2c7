//! 终端输出

use crate::environment::{EnvironmentReport, PlatformInfo};
use crate::orchestrator::{BatchReport, ItemState, Progress};
use crate::package_manager::{InstallRequest, InstallerError, Operation, PackageInfo};
use anyhow::Result;
use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use unicode_width::UnicodeWidthStr;

/// 状态页最多列出的已安装软件数
const STATUS_PREVIEW: usize = 10;

pub fn batch_bar(total: u64, operation: Operation) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{prefix} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏ ");
    bar.set_style(style);
    bar.set_prefix(operation.verb());
    bar
}

/// 每次轮询刷新进度条：计数 + 正在处理的包
pub fn tick(bar: &ProgressBar, progress: &Progress, states: &[ItemState], requests: &[InstallRequest]) {
    bar.set_position(progress.completed as u64);
    bar.set_message(progress_message(progress, states, requests));
    bar.tick();
}

fn progress_message(progress: &Progress, states: &[ItemState], requests: &[InstallRequest]) -> String {
    let running: Vec<&str> = states
        .iter()
        .zip(requests)
        .filter(|(state, _)| **state == ItemState::Running)
        .map(|(_, request)| request.package_id())
        .collect();
    let summary = progress.summary;
    let mut message = format!("✓{} ✗{} ⊘{}", summary.success, summary.failed, summary.skipped);
    if !running.is_empty() {
        message.push_str(&format!("  {}", running.join(", ")));
    }
    message
}

pub fn print_results(operation: Operation, report: &BatchReport) {
    for result in &report.results {
        let package = &result.package;
        if package.name == package.id || package.name.is_empty() {
            println!("{} {}", result.status().icon(), package.id);
        } else {
            println!("{} {} ({})", result.status().icon(), package.name, package.id);
        }
        if let Some(err) = result.error() {
            println!("    {}", err);
        }
    }
    let summary = report.summary;
    println!();
    println!(
        "{} 完成: 成功 {}, 失败 {}, 跳过 {}",
        operation.verb(),
        summary.success,
        summary.failed,
        summary.skipped
    );
}

/// 按显示宽度补齐，中日韩字符占两列
fn pad(text: &str, width: usize) -> String {
    let padding = width.saturating_sub(UnicodeWidthStr::width(text));
    format!("{}{}", text, " ".repeat(padding))
}

fn package_rows(packages: &[PackageInfo]) -> Vec<String> {
    let name_width = packages
        .iter()
        .map(|p| UnicodeWidthStr::width(p.display_name()))
        .max()
        .unwrap_or(0);
    let id_width = packages.iter().map(|p| UnicodeWidthStr::width(p.id.as_str())).max().unwrap_or(0);

    packages
        .iter()
        .map(|package| {
            let mut line = format!(
                "{}  {}  {}",
                pad(package.display_name(), name_width),
                pad(&package.id, id_width),
                package.version.as_deref().unwrap_or("-"),
            );
            if let Some(description) = &package.description {
                line.push_str("  ");
                line.push_str(description);
            }
            line.trim_end().to_string()
        })
        .collect()
}

pub fn print_packages(packages: &[PackageInfo]) {
    if packages.is_empty() {
        println!("没有找到软件包");
        return;
    }
    for row in package_rows(packages) {
        println!("{}", row);
    }
    println!("\n共 {} 个", packages.len());
}

pub fn print_packages_json(packages: &[PackageInfo]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(packages)?);
    Ok(())
}

pub fn print_environment(report: &EnvironmentReport) {
    if report.ready {
        println!("✓ 环境就绪");
    } else {
        println!("✗ 环境检查未通过:");
        for detail in &report.details {
            println!("  - {}", detail);
        }
        println!("请先修复以上问题再执行安装或搜索");
    }
    for warning in &report.warnings {
        println!("  ! {}", warning);
    }
}

pub fn print_status(
    platform: &PlatformInfo,
    manager: &str,
    version: Option<&str>,
    installed: Option<Result<Vec<PackageInfo>, InstallerError>>,
) {
    println!("系统:       {}/{}", platform.os, platform.arch);
    println!("内核:       {}", platform.kernel);
    match version {
        Some(version) => println!("包管理器:   {} ({})", manager, version),
        None => println!("包管理器:   {} (不可用)", manager),
    }
    match installed {
        Some(Ok(packages)) => {
            println!("已安装:     {} 个", packages.len());
            for package in packages.iter().take(STATUS_PREVIEW) {
                println!("  - {}", package.display_name());
            }
            if packages.len() > STATUS_PREVIEW {
                println!("  ... 另有 {} 个", packages.len() - STATUS_PREVIEW);
            }
        }
        Some(Err(e)) => println!("已安装:     读取失败: {}", e),
        None => {}
    }
}

fn update_line(manager: &str, outcome: &Result<(), InstallerError>) -> String {
    match outcome {
        Ok(()) => format!("✓ {} 元数据已是最新", manager),
        Err(e) => format!("✗ {} 元数据更新失败: {}", manager, e),
    }
}

pub fn print_update(manager: &str, outcome: &Result<(), InstallerError>, checked_at: DateTime<Local>) {
    println!("{}", update_line(manager, outcome));
    println!("检查时间: {}", checked_at.to_rfc3339());
}

pub fn print_update_skipped() {
    println!("! 跳过: 当前平台没有受支持的包管理器");
}
