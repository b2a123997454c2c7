//! 命令行入口：参数定义与子命令分发

use crate::config::{Config, SoftwareStore};
use crate::environment::{check_environment, EnvironmentReport, PlatformInfo};
use crate::orchestrator::{Mode, Orchestrator, POLL_INTERVAL};
use crate::package_manager::{self, Backend, InstallRequest, InstallerError, Operation};
use crate::render;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sis")]
#[command(author, version, about = "跨平台批量软件安装 (winget / Homebrew / apt)")]
pub struct Cli {
    /// 使用指定的配置文件
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// 并行执行安装/卸载
    #[arg(short, long, global = true)]
    pub parallel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 安装软件；不带参数时安装配置中的全部软件
    Install { packages: Vec<String> },
    /// 卸载软件；不带参数时卸载配置中的全部软件
    Uninstall { packages: Vec<String> },
    /// 卸载配置中的全部软件
    UninstallAll,
    /// 搜索软件包
    Search {
        query: String,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 列出已安装的软件包
    List,
    /// 显示平台与包管理器状态
    Status,
    /// 刷新包管理器元数据
    Update,
    /// 检查运行环境
    Check,
    /// 按列表批量安装；默认使用配置中的列表
    Batch { file: Option<PathBuf> },
    /// 向配置添加软件
    Add {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "")]
        category: String,
    },
    /// 按序号修改配置中的软件
    Edit {
        index: usize,
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// 按序号从配置移除软件
    Remove { index: usize },
    /// 合并另一个 TOML 文件中的软件列表
    Import { file: PathBuf },
}

/// 执行子命令；返回 false 表示应以非零状态退出
pub async fn run(cli: Cli) -> Result<bool> {
    let mut config = Config::load(cli.config.as_deref())?;
    let backend = package_manager::select_backend(&config.skip_rules);
    let mode = if cli.parallel || config.parallel {
        Mode::Parallel
    } else {
        Mode::Sequential
    };

    match cli.command {
        Commands::Install { packages } => {
            let requests = requests_or_config(packages, &config);
            run_batch(backend, &config, Operation::Install, requests, mode).await
        }
        Commands::Uninstall { packages } => {
            let requests = requests_or_config(packages, &config);
            run_batch(backend, &config, Operation::Uninstall, requests, mode).await
        }
        Commands::UninstallAll => {
            let requests = config.software_list().to_vec();
            run_batch(backend, &config, Operation::Uninstall, requests, mode).await
        }
        Commands::Batch { file } => {
            let requests = match file {
                Some(path) => Config::read_software_file(&path)?,
                None => config.software_list().to_vec(),
            };
            run_batch(backend, &config, Operation::Install, requests, mode).await
        }
        Commands::Search { query, json } => {
            let Some(backend) = ensure_ready(backend.as_ref()) else {
                return Ok(false);
            };
            let found = blocking(&backend, move |b| b.search(&query)).await?;
            match found {
                Ok(packages) if json => render::print_packages_json(&packages)?,
                Ok(packages) => render::print_packages(&packages),
                Err(e) => return report_error(e),
            }
            Ok(true)
        }
        Commands::List => {
            let Some(backend) = ensure_ready(backend.as_ref()) else {
                return Ok(false);
            };
            match blocking(&backend, |b| b.list_installed()).await? {
                Ok(packages) => render::print_packages(&packages),
                Err(e) => return report_error(e),
            }
            Ok(true)
        }
        Commands::Status => {
            let platform = PlatformInfo::detect();
            let Some(backend) = backend else {
                render::print_status(&platform, package_manager::package_manager_name(&platform.os), None, None);
                return Ok(false);
            };
            let (version, installed) = blocking(&backend, |b| {
                let version = b.version();
                let installed = version.as_ref().map(|_| b.list_installed());
                (version, installed)
            })
            .await?;
            render::print_status(&platform, backend.name(), version.as_deref(), installed);
            Ok(true)
        }
        Commands::Update => {
            let Some(backend) = backend else {
                render::print_update_skipped();
                return Ok(false);
            };
            let refreshed = blocking(&backend, |b| b.refresh_metadata()).await?;
            render::print_update(backend.name(), &refreshed, chrono::Local::now());
            Ok(refreshed.is_ok())
        }
        Commands::Check => {
            let report = environment_report(backend.as_ref());
            render::print_environment(&report);
            Ok(report.ready)
        }
        Commands::Add { id, name, category } => {
            let request = InstallRequest {
                name: name.unwrap_or_else(|| id.clone()),
                id,
                category,
                ..InstallRequest::default()
            };
            println!("已添加: {}", request.name);
            config.add_software(request);
            config.save()?;
            Ok(true)
        }
        Commands::Edit { index, id, name, category } => {
            // 越界由 update_software 报错
            let current = config.software_list().get(index).cloned().unwrap_or_default();
            config.update_software(index, edited(current, id, name, category))?;
            config.save()?;
            Ok(true)
        }
        Commands::Remove { index } => {
            let removed = config.remove_software(index)?;
            config.save()?;
            println!("已移除: {}", removed.name);
            Ok(true)
        }
        Commands::Import { file } => {
            let added = config.import_from_file(&file)?;
            config.save()?;
            println!("导入 {} 个软件到 {}", added, config.path().display());
            Ok(true)
        }
    }
}

fn requests_or_config(packages: Vec<String>, config: &Config) -> Vec<InstallRequest> {
    if packages.is_empty() {
        config.software_list().to_vec()
    } else {
        packages.iter().map(|p| InstallRequest::from_id(p)).collect()
    }
}

/// 只替换用户给出的字段；名称原本就是 id 时跟随新 id
fn edited(
    mut current: InstallRequest,
    id: String,
    name: Option<String>,
    category: Option<String>,
) -> InstallRequest {
    match name {
        Some(name) => current.name = name,
        None if current.name.is_empty() || current.name == current.package_id() => current.name = id.clone(),
        None => {}
    }
    current.id = id;
    if let Some(category) = category {
        current.category = category;
    }
    current
}

fn environment_report(backend: Option<&Arc<dyn Backend>>) -> EnvironmentReport {
    check_environment(backend.map(|b| b.as_ref()))
}

/// 环境未就绪时打印诊断并返回 None
fn ensure_ready(backend: Option<&Arc<dyn Backend>>) -> Option<Arc<dyn Backend>> {
    let report = environment_report(backend);
    if let Err(e) = report.ensure_ready() {
        log::warn!("{}", e);
        render::print_environment(&report);
        return None;
    }
    for warning in &report.warnings {
        eprintln!("! {}", warning);
    }
    backend.cloned()
}

fn report_error(err: InstallerError) -> Result<bool> {
    eprintln!("错误: {}", err);
    Ok(false)
}

/// 后端调用都会阻塞到子进程退出
async fn blocking<T, F>(backend: &Arc<dyn Backend>, f: F) -> Result<T>
where
    F: FnOnce(&dyn Backend) -> T + Send + 'static,
    T: Send + 'static,
{
    let backend = backend.clone();
    Ok(tokio::task::spawn_blocking(move || f(backend.as_ref())).await?)
}

async fn run_batch(
    backend: Option<Arc<dyn Backend>>,
    config: &Config,
    operation: Operation,
    requests: Vec<InstallRequest>,
    mode: Mode,
) -> Result<bool> {
    if requests.is_empty() {
        eprintln!("没有要处理的软件：请传入包名，或在 {} 中配置 software 列表", config.path().display());
        return Ok(false);
    }
    let Some(backend) = ensure_ready(backend.as_ref()) else {
        return Ok(false);
    };

    let orchestrator =
        Orchestrator::new(Some(backend), operation, requests.clone()).with_pool_size(config.pool_size);
    let bar = render::batch_bar(requests.len() as u64, operation);
    let watcher = {
        let bar = bar.clone();
        let requests = requests.clone();
        tokio::spawn(orchestrator.progress().watch(POLL_INTERVAL, move |progress, states| {
            render::tick(&bar, progress, states, &requests);
        }))
    };

    let outcome = orchestrator.run(mode).await;
    watcher.abort();
    bar.finish_and_clear();

    match outcome {
        Ok(report) => {
            render::print_results(operation, &report);
            Ok(!report.has_failures())
        }
        Err(e @ InstallerError::ConcurrencyUnsupported { .. }) => {
            eprintln!("错误: {}", e);
            eprintln!("去掉 --parallel（或在配置中设置 parallel = false）后重试");
            Ok(false)
        }
        Err(e) => report_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["sis", "install", "Git.Git", "jq", "-p", "--config", "/tmp/c.toml"]).unwrap();
        assert!(cli.parallel);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        match cli.command {
            Commands::Install { packages } => assert_eq!(packages, ["Git.Git", "jq"]),
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn search_requires_query() {
        assert!(Cli::try_parse_from(["sis", "search"]).is_err());
        let cli = Cli::try_parse_from(["sis", "search", "vscode", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Search { json: true, .. }));
    }

    #[test]
    fn batch_file_is_optional() {
        let cli = Cli::try_parse_from(["sis", "batch"]).unwrap();
        assert!(matches!(cli.command, Commands::Batch { file: None }));
        let cli = Cli::try_parse_from(["sis", "uninstall-all"]).unwrap();
        assert!(matches!(cli.command, Commands::UninstallAll));
    }

    #[test]
    fn edit_keeps_fields_not_given() {
        let current = InstallRequest {
            name: "Visual Studio Code".into(),
            id: "Microsoft.VisualStudioCode".into(),
            category: "Dev".into(),
            ..InstallRequest::default()
        };
        let updated = edited(current.clone(), "Microsoft.VisualStudioCode.Insiders".into(), None, None);
        assert_eq!(updated.id, "Microsoft.VisualStudioCode.Insiders");
        assert_eq!(updated.name, "Visual Studio Code");
        assert_eq!(updated.category, "Dev");

        let updated = edited(current, "Git.Git".into(), Some("Git".into()), Some("Tools".into()));
        assert_eq!(updated.name, "Git");
        assert_eq!(updated.category, "Tools");
    }

    #[test]
    fn edit_renames_entries_named_after_their_id() {
        let current = InstallRequest {
            category: "CLI".into(),
            ..InstallRequest::from_id("jq")
        };
        let updated = edited(current, "jqlang.jq".into(), None, None);
        assert_eq!(updated.name, "jqlang.jq");
        assert_eq!(updated.category, "CLI");
    }

    #[test]
    fn edit_command_accepts_category() {
        let cli = Cli::try_parse_from(["sis", "edit", "0", "Git.Git", "--category", "Dev"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Edit { index: 0, category: Some(ref c), name: None, .. } if c == "Dev"
        ));
    }

    #[test]
    fn bare_install_falls_back_to_config_list() {
        let mut config = Config::default();
        config.add_software(InstallRequest::from_id("Git.Git"));
        assert_eq!(requests_or_config(Vec::new(), &config)[0].id, "Git.Git");
        assert_eq!(requests_or_config(vec!["jq".into()], &config)[0].id, "jq");
    }
}
