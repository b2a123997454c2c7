//! Linux：apt 后端
//!
//! 安装/卸载/刷新需要 root。非 root 时通过 `sudo -n` 执行，
//! `-n`（non-interactive）保证凭证过期时直接失败而不是卡在密码提示上。

use super::parser::{parse_apt_search, parse_dpkg_query, DPKG_QUERY_FORMAT};
use super::runner::{probe_version, CommandRunner};
use super::{
    classify, execution_error, run_query, Backend, CommandOutput, InstallResult, InstallerError,
    Operation, PackageInfo, SkipRules, SkipRulesOverride,
};
use std::sync::Arc;

pub const NAME: &str = "apt";

const APT_GET: &str = "apt-get";
const NONINTERACTIVE: &str = "DEBIAN_FRONTEND=noninteractive";

/// apt 打开锁文件失败（EACCES）时的输出片段
const LOCK_DENIED_MARKERS: [&str; 2] = ["(13: permission denied)", "are you root?"];

/// `sudo -n` 缺少缓存凭证
const SUDO_PASSWORD_MARKER: &str = "a password is required";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Elevation {
    Root,
    Sudo,
    Unavailable,
}

pub struct Apt {
    runner: Arc<dyn CommandRunner>,
    rules: SkipRules,
    is_root: bool,
}

#[cfg(unix)]
fn current_user_is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn current_user_is_root() -> bool {
    false
}

impl Apt {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            rules: SkipRules::apt(),
            is_root: current_user_is_root(),
        }
    }

    pub fn with_overrides(mut self, extra: Option<&SkipRulesOverride>) -> Self {
        if let Some(extra) = extra {
            self.rules.extend(extra);
        }
        self
    }

    #[cfg(test)]
    fn as_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    fn elevation(&self) -> Elevation {
        if self.is_root {
            Elevation::Root
        } else if self.runner.locate("sudo").is_some() {
            Elevation::Sudo
        } else {
            Elevation::Unavailable
        }
    }

    /// 以合适的权限执行 apt-get
    fn run_privileged(&self, apt_args: &[&str]) -> Result<CommandOutput, InstallerError> {
        let elevation = self.elevation();
        let output = match elevation {
            Elevation::Root => {
                let env = [("DEBIAN_FRONTEND", "noninteractive")];
                run_query(self.runner.as_ref(), APT_GET, apt_args, &env)?
            }
            Elevation::Sudo => {
                // sudo 会重置环境变量，交给 env 传递
                let mut args = vec!["-n", "env", NONINTERACTIVE, APT_GET];
                args.extend_from_slice(apt_args);
                run_query(self.runner.as_ref(), "sudo", &args, &[])?
            }
            Elevation::Unavailable => {
                return Err(InstallerError::PrivilegeRequired {
                    program: APT_GET.to_string(),
                })
            }
        };

        // 其余失败（例如 dpkg 维护脚本出错）保留原始输出，交给 classify
        if !output.success() {
            let text = output.combined_output().to_lowercase();
            let denied = LOCK_DENIED_MARKERS.iter().any(|m| text.contains(m))
                || (elevation == Elevation::Sudo && text.contains(SUDO_PASSWORD_MARKER));
            if denied {
                log::warn!("{} 需要提权: {}", APT_GET, output.diagnostic());
                return Err(InstallerError::PrivilegeRequired {
                    program: APT_GET.to_string(),
                });
            }
        }
        Ok(output)
    }

    fn operate(&self, op: Operation, id: &str, apt_args: &[&str]) -> InstallResult {
        let package = PackageInfo::from_id(id);
        match self.run_privileged(apt_args) {
            Ok(output) => classify(&self.rules, op, package, APT_GET, &output),
            Err(e) => InstallResult::failed(package, e),
        }
    }
}

impl Backend for Apt {
    fn name(&self) -> &'static str {
        NAME
    }

    fn version(&self) -> Option<String> {
        probe_version(self.runner.as_ref(), APT_GET)
    }

    /// dpkg 前端锁同一时间只允许一个进程持有
    fn supports_concurrent(&self) -> bool {
        false
    }

    fn diagnose(&self) -> Vec<String> {
        let mut details = Vec::new();
        if self.runner.locate(APT_GET).is_none() {
            details.push(format!("{} not found on PATH", APT_GET));
        } else if self.version().is_none() {
            details.push(format!("{} found but did not respond to --version", APT_GET));
        }
        if self.runner.locate("apt-cache").is_none() {
            details.push("apt-cache not found on PATH".to_string());
        }
        details
    }

    fn warnings(&self) -> Vec<String> {
        match self.elevation() {
            Elevation::Root => Vec::new(),
            Elevation::Sudo => vec![
                "not running as root; install/uninstall will use `sudo -n` and fail if no cached credentials".to_string(),
            ],
            Elevation::Unavailable => vec![
                "not running as root and sudo not found; install/uninstall require elevated privileges".to_string(),
            ],
        }
    }

    fn install(&self, id: &str) -> InstallResult {
        self.operate(Operation::Install, id, &["install", "-y", id])
    }

    fn uninstall(&self, id: &str) -> InstallResult {
        self.operate(Operation::Uninstall, id, &["remove", "-y", id])
    }

    fn search(&self, query: &str) -> Result<Vec<PackageInfo>, InstallerError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let output = run_query(self.runner.as_ref(), "apt-cache", &["search", query], &[])?;
        if !output.success() {
            return Err(execution_error("apt-cache", &output));
        }
        Ok(parse_apt_search(&output.stdout))
    }

    fn list_installed(&self) -> Result<Vec<PackageInfo>, InstallerError> {
        let format = format!("-f={}", DPKG_QUERY_FORMAT);
        let output = run_query(self.runner.as_ref(), "dpkg-query", &["-W", &format], &[])?;
        if !output.success() {
            return Err(execution_error("dpkg-query", &output));
        }
        Ok(parse_dpkg_query(&output.stdout))
    }

    fn refresh_metadata(&self) -> Result<(), InstallerError> {
        let output = self.run_privileged(&["update"])?;
        if output.success() {
            Ok(())
        } else {
            Err(execution_error(APT_GET, &output))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::runner::testing::ScriptedRunner;
    use super::super::InstallStatus;
    use super::*;

    fn backend(runner: ScriptedRunner, is_root: bool) -> (Apt, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        (Apt::new(runner.clone()).as_root(is_root), runner)
    }

    #[test]
    fn root_runs_apt_get_directly() {
        let (apt, runner) = backend(ScriptedRunner::new().reply("apt-get install", 0, "Setting up jq", ""), true);
        assert_eq!(apt.install("jq").status(), InstallStatus::Success);
        assert_eq!(runner.calls(), vec!["apt-get install -y jq".to_string()]);
    }

    #[test]
    fn non_root_goes_through_sudo() {
        let (apt, runner) = backend(ScriptedRunner::new().reply("sudo -n", 0, "", ""), false);
        assert_eq!(apt.uninstall("jq").status(), InstallStatus::Success);
        assert_eq!(
            runner.calls(),
            vec!["sudo -n env DEBIAN_FRONTEND=noninteractive apt-get remove -y jq".to_string()]
        );
    }

    #[test]
    fn sudo_password_prompt_is_privilege_error() {
        let (apt, _) = backend(
            ScriptedRunner::new().reply("sudo -n", 1, "", "sudo: a password is required\n"),
            false,
        );
        let result = apt.install("jq");
        assert_eq!(result.status(), InstallStatus::Failed);
        assert!(matches!(result.error(), Some(InstallerError::PrivilegeRequired { .. })));
    }

    #[test]
    fn no_sudo_fails_without_launching() {
        let (apt, runner) = backend(ScriptedRunner::new().without("sudo"), false);
        let result = apt.install("jq");
        assert!(matches!(result.error(), Some(InstallerError::PrivilegeRequired { .. })));
        assert!(runner.calls().is_empty());
        assert_eq!(apt.warnings().len(), 1);
    }

    #[test]
    fn lock_permission_denied_is_privilege_error() {
        let (apt, _) = backend(
            ScriptedRunner::new().reply(
                "sudo -n",
                100,
                "",
                "E: Could not open lock file /var/lib/dpkg/lock-frontend - open (13: Permission denied)\n\
                 E: Unable to acquire the dpkg frontend lock (/var/lib/dpkg/lock-frontend), are you root?\n",
            ),
            false,
        );
        assert!(matches!(
            apt.install("jq").error(),
            Some(InstallerError::PrivilegeRequired { .. })
        ));
    }

    #[test]
    fn maintainer_script_failure_as_root_keeps_output() {
        let stderr = "/var/lib/dpkg/info/foo.postinst: 12: /opt/foo/setup.sh: Permission denied\n\
                      dpkg: error processing package foo (--configure):\n\
                      E: Sub-process /usr/bin/dpkg returned an error code (1)";
        let (apt, _) = backend(ScriptedRunner::new().reply("apt-get install", 100, "", stderr), true);
        assert_eq!(
            apt.install("foo").error(),
            Some(&InstallerError::Execution {
                program: "apt-get".into(),
                code: Some(100),
                output: stderr.into(),
            })
        );
    }

    #[test]
    fn already_newest_is_skipped() {
        let (apt, _) = backend(
            ScriptedRunner::new().reply("apt-get install", 0, "jq is already the newest version (1.7.1-3).", ""),
            true,
        );
        assert_eq!(apt.install("jq").status(), InstallStatus::Skipped);
    }

    #[test]
    fn unknown_package_fails_with_verbatim_output() {
        let (apt, _) = backend(
            ScriptedRunner::new().reply("apt-get install", 100, "", "E: Unable to locate package nope"),
            true,
        );
        let result = apt.install("nope");
        assert_eq!(
            result.error(),
            Some(&InstallerError::Execution {
                program: "apt-get".into(),
                code: Some(100),
                output: "E: Unable to locate package nope".into(),
            })
        );
    }

    #[test]
    fn search_and_list_do_not_need_privileges() {
        let (apt, runner) = backend(
            ScriptedRunner::new()
                .reply("apt-cache search", 0, "jq - lightweight and flexible command-line JSON processor\n", "")
                .reply("dpkg-query -W", 0, "jq\t1.7.1-3\tii \tJSON processor\n", ""),
            false,
        );
        assert_eq!(apt.search("jq").unwrap()[0].id, "jq");
        assert_eq!(apt.list_installed().unwrap()[0].version.as_deref(), Some("1.7.1-3"));
        assert!(runner.calls().iter().all(|c| !c.starts_with("sudo")));
    }

    #[test]
    fn diagnose_reports_missing_tools() {
        let (apt, _) = backend(ScriptedRunner::new().without("apt-get").without("apt-cache"), true);
        assert_eq!(
            apt.diagnose(),
            vec![
                "apt-get not found on PATH".to_string(),
                "apt-cache not found on PATH".to_string()
            ]
        );
        assert!(!apt.is_available());
    }
}
