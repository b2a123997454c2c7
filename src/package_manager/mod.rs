//! 包管理器模块：对 winget / brew / apt 的统一封装

pub mod apt;
pub mod brew;
pub mod error;
pub mod parser;
pub mod runner;
pub mod skip;
pub mod types;
pub mod winget;

// 重新导出常用类型
pub use apt::Apt;
pub use brew::Brew;
pub use error::InstallerError;
pub use runner::{CommandRunner, SystemRunner};
pub use skip::{Operation, SkipRules, SkipRulesOverride};
pub use types::{CommandOutput, InstallRequest, InstallResult, InstallStatus, PackageInfo};
pub use winget::Winget;

use std::collections::BTreeMap;
use std::sync::Arc;

/// 单个原生包管理器的统一能力集
///
/// 所有方法都会阻塞到外部进程退出；实现本身不保存调用间状态，
/// 可以被多个工作线程同时调用（是否安全取决于 `supports_concurrent`）。
pub trait Backend: Send + Sync {
    /// 原生工具名，如 "winget"
    fn name(&self) -> &'static str;

    /// 可执行文件在 PATH 中且能响应版本探测
    fn is_available(&self) -> bool {
        self.version().is_some()
    }

    /// 版本探测输出的首行
    fn version(&self) -> Option<String>;

    /// 原生工具是否容忍并发调用（brew / dpkg 持有全局锁）
    fn supports_concurrent(&self) -> bool {
        true
    }

    /// 前置条件诊断，每个缺失项一条；为空表示就绪
    fn diagnose(&self) -> Vec<String> {
        if self.is_available() {
            Vec::new()
        } else {
            vec![format!("{} not found on PATH", self.name())]
        }
    }

    /// 不影响就绪状态的提示（例如卸载/安装需要提权）
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }

    fn install(&self, id: &str) -> InstallResult;

    fn uninstall(&self, id: &str) -> InstallResult;

    /// 零结果返回空列表而不是错误
    fn search(&self, query: &str) -> Result<Vec<PackageInfo>, InstallerError>;

    fn list_installed(&self) -> Result<Vec<PackageInfo>, InstallerError>;

    /// 同步元数据/索引，与具体包无关
    fn refresh_metadata(&self) -> Result<(), InstallerError>;
}

/// 按当前操作系统选择后端；不支持的平台返回 None
pub fn select_backend(overrides: &BTreeMap<String, SkipRulesOverride>) -> Option<Arc<dyn Backend>> {
    select_backend_for(std::env::consts::OS, Arc::new(SystemRunner), overrides)
}

pub fn select_backend_for(
    os: &str,
    runner: Arc<dyn CommandRunner>,
    overrides: &BTreeMap<String, SkipRulesOverride>,
) -> Option<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match os {
        "windows" => Arc::new(Winget::new(runner).with_overrides(overrides.get(winget::NAME))),
        "macos" => Arc::new(Brew::new(runner).with_overrides(overrides.get(brew::NAME))),
        "linux" => Arc::new(Apt::new(runner).with_overrides(overrides.get(apt::NAME))),
        other => {
            log::warn!("不支持的平台: {}", other);
            return None;
        }
    };
    log::debug!("选择后端: {}", backend.name());
    Some(backend)
}

/// 当前平台对应的包管理器名称（状态页展示用）
pub fn package_manager_name(os: &str) -> &'static str {
    match os {
        "windows" => winget::NAME,
        "macos" => brew::NAME,
        "linux" => apt::NAME,
        _ => "unknown",
    }
}

/// 执行一次安装/卸载并把原生输出归一化为三态结果
///
/// 进程无法启动 → Launch；"已是目标状态" → Skipped；
/// 其余非零退出 → Execution，保留原始诊断文本。
pub(crate) fn run_operation(
    runner: &dyn CommandRunner,
    rules: &SkipRules,
    op: Operation,
    id: &str,
    program: &str,
    args: &[&str],
    env: &[(&str, &str)],
) -> InstallResult {
    let package = PackageInfo::from_id(id);
    let output = match runner.run(program, args, env) {
        Ok(output) => output,
        Err(e) => return InstallResult::failed(package, InstallerError::launch(program, &e)),
    };
    classify(rules, op, package, program, &output)
}

pub(crate) fn classify(
    rules: &SkipRules,
    op: Operation,
    package: PackageInfo,
    program: &str,
    output: &CommandOutput,
) -> InstallResult {
    if rules.is_noop(op, output) {
        log::info!("{} {}: 已是目标状态，跳过", op.verb(), package.id);
        InstallResult::skipped(package)
    } else if output.success() {
        InstallResult::success(package)
    } else {
        InstallResult::failed(package, execution_error(program, output))
    }
}

/// 执行查询类命令，失败时转换为错误
pub(crate) fn run_query(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
    env: &[(&str, &str)],
) -> Result<CommandOutput, InstallerError> {
    runner
        .run(program, args, env)
        .map_err(|e| InstallerError::launch(program, &e))
}

pub(crate) fn execution_error(program: &str, output: &CommandOutput) -> InstallerError {
    InstallerError::Execution {
        program: program.to_string(),
        code: output.code,
        output: output.diagnostic(),
    }
}

#[cfg(test)]
mod tests {
    use super::runner::testing::ScriptedRunner;
    use super::*;

    #[test]
    fn selects_backend_per_os() {
        let runner: Arc<dyn CommandRunner> = Arc::new(ScriptedRunner::new());
        let none = BTreeMap::new();
        assert_eq!(select_backend_for("windows", runner.clone(), &none).map(|b| b.name()), Some("winget"));
        assert_eq!(select_backend_for("macos", runner.clone(), &none).map(|b| b.name()), Some("brew"));
        assert_eq!(select_backend_for("linux", runner.clone(), &none).map(|b| b.name()), Some("apt"));
        assert!(select_backend_for("freebsd", runner, &none).is_none());
    }

    #[test]
    fn classify_maps_three_states() {
        let rules = SkipRules::brew();
        let out = |code, stderr: &str| CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            code: Some(code),
        };

        let r = classify(&rules, Operation::Install, PackageInfo::from_id("git"), "brew", &out(0, ""));
        assert_eq!(r.status(), InstallStatus::Success);

        let r = classify(
            &rules,
            Operation::Install,
            PackageInfo::from_id("git"),
            "brew",
            &out(0, "Warning: git 2.44.0 is already installed and up-to-date."),
        );
        assert_eq!(r.status(), InstallStatus::Skipped);

        let r = classify(
            &rules,
            Operation::Install,
            PackageInfo::from_id("nope"),
            "brew",
            &out(1, "Error: No available formula with the name \"nope\"."),
        );
        assert_eq!(r.status(), InstallStatus::Failed);
        assert_eq!(
            r.error().map(|e| e.to_string()).unwrap_or_default(),
            "brew exited with code 1: Error: No available formula with the name \"nope\"."
        );
    }

    #[test]
    fn launch_failure_keeps_package_identity() {
        let runner = ScriptedRunner::new().fail_launch("winget", std::io::ErrorKind::PermissionDenied);
        let r = run_operation(
            &runner,
            &SkipRules::winget(),
            Operation::Install,
            "Git.Git",
            "winget",
            &["install"],
            &[],
        );
        assert_eq!(r.status(), InstallStatus::Failed);
        assert_eq!(r.package.id, "Git.Git");
        assert!(matches!(r.error(), Some(InstallerError::Launch { .. })));
    }
}
