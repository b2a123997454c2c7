use crate::package_manager::{Backend, InstallerError};
use std::fmt;
use std::process::Command;

/// 环境检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentReport {
    pub ready: bool,
    /// 每个缺失前置条件一条可读诊断
    pub details: Vec<String>,
    /// 不阻止操作的提示
    pub warnings: Vec<String>,
}

impl EnvironmentReport {
    /// 未就绪时转换为错误，供安装/搜索入口使用
    pub fn ensure_ready(&self) -> Result<(), InstallerError> {
        if self.ready {
            Ok(())
        } else {
            Err(InstallerError::EnvironmentNotReady(self.details.clone()))
        }
    }
}

impl fmt::Display for EnvironmentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ready {
            write!(f, "environment ready")?;
        } else {
            write!(f, "environment check failed:")?;
            for detail in &self.details {
                write!(f, "\n  - {}", detail)?;
            }
        }
        for warning in &self.warnings {
            write!(f, "\n  ! {}", warning)?;
        }
        Ok(())
    }
}

/// 检查所选后端的前置条件。只读，可重复调用。
///
/// 没有后端（不支持的平台）时同样返回未就绪。
pub fn check_environment(backend: Option<&dyn Backend>) -> EnvironmentReport {
    let Some(backend) = backend else {
        return EnvironmentReport {
            ready: false,
            details: vec![format!(
                "unsupported platform: {}/{}",
                std::env::consts::OS,
                std::env::consts::ARCH
            )],
            warnings: Vec::new(),
        };
    };

    let details = backend.diagnose();
    let ready = details.is_empty();
    if !ready {
        log::warn!("{} 环境检查未通过: {}", backend.name(), details.join("; "));
    }
    EnvironmentReport {
        ready,
        details,
        warnings: backend.warnings(),
    }
}

/// 平台信息，用于状态页
#[derive(Debug, Clone)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
    pub kernel: String,
}

impl PlatformInfo {
    /// 自动检测平台信息
    pub fn detect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            kernel: Self::get_kernel(),
        }
    }

    fn run_cmd(cmd: &str, args: &[&str]) -> String {
        Command::new(cmd)
            .args(args)
            .output()
            .ok()
            .and_then(|o| {
                if o.status.success() {
                    let s = String::from_utf8_lossy(&o.stdout).trim().to_string();
                    if s.is_empty() { None } else { Some(s) }
                } else {
                    None
                }
            })
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn get_kernel() -> String {
        if cfg!(windows) {
            // `ver` 是 cmd 内建命令
            Self::run_cmd("cmd", &["/C", "ver"])
        } else {
            Self::run_cmd("uname", &["-sr"])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package_manager::{InstallResult, PackageInfo};

    struct FakeBackend {
        available: bool,
    }

    impl Backend for FakeBackend {
        fn name(&self) -> &'static str {
            "winget"
        }
        fn version(&self) -> Option<String> {
            self.available.then(|| "v1.7".to_string())
        }
        fn warnings(&self) -> Vec<String> {
            vec!["heads up".to_string()]
        }
        fn install(&self, id: &str) -> InstallResult {
            InstallResult::success(PackageInfo::from_id(id))
        }
        fn uninstall(&self, id: &str) -> InstallResult {
            InstallResult::success(PackageInfo::from_id(id))
        }
        fn search(&self, _query: &str) -> Result<Vec<PackageInfo>, InstallerError> {
            Ok(Vec::new())
        }
        fn list_installed(&self) -> Result<Vec<PackageInfo>, InstallerError> {
            Ok(Vec::new())
        }
        fn refresh_metadata(&self) -> Result<(), InstallerError> {
            Ok(())
        }
    }

    #[test]
    fn unavailable_backend_is_not_ready() {
        let backend = FakeBackend { available: false };
        let report = check_environment(Some(&backend));
        assert!(!report.ready);
        assert_eq!(report.details, vec!["winget not found on PATH".to_string()]);
        assert_eq!(
            report.ensure_ready(),
            Err(InstallerError::EnvironmentNotReady(vec!["winget not found on PATH".to_string()]))
        );
    }

    #[test]
    fn available_backend_is_ready_and_repeatable() {
        let backend = FakeBackend { available: true };
        let first = check_environment(Some(&backend));
        let second = check_environment(Some(&backend));
        assert!(first.ready);
        assert!(first.details.is_empty());
        assert_eq!(first.warnings, vec!["heads up".to_string()]);
        assert_eq!(first, second);
        assert!(first.ensure_ready().is_ok());
    }

    #[test]
    fn missing_backend_reports_unsupported_platform() {
        let report = check_environment(None);
        assert!(!report.ready);
        assert!(report.details[0].starts_with("unsupported platform"));
        assert!(report.to_string().contains("unsupported platform"));
    }
}
