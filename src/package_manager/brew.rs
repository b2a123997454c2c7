//! macOS：Homebrew 后端

use super::parser::{parse_brew_list, parse_brew_search};
use super::runner::{probe_version, CommandRunner};
use super::{
    execution_error, run_operation, run_query, Backend, InstallResult, InstallerError, Operation,
    PackageInfo, SkipRules, SkipRulesOverride,
};
use std::sync::Arc;

pub const NAME: &str = "brew";

/// 关闭自动更新和交互提示
const ENV: [(&str, &str); 3] = [
    ("HOMEBREW_NO_AUTO_UPDATE", "1"),
    ("HOMEBREW_NO_ENV_HINTS", "1"),
    ("NONINTERACTIVE", "1"),
];

pub struct Brew {
    runner: Arc<dyn CommandRunner>,
    rules: SkipRules,
}

impl Brew {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            rules: SkipRules::brew(),
        }
    }

    pub fn with_overrides(mut self, extra: Option<&SkipRulesOverride>) -> Self {
        if let Some(extra) = extra {
            self.rules.extend(extra);
        }
        self
    }
}

impl Backend for Brew {
    fn name(&self) -> &'static str {
        NAME
    }

    fn version(&self) -> Option<String> {
        probe_version(self.runner.as_ref(), NAME)
    }

    /// brew 对 Cellar 加全局锁，并发调用会互相失败
    fn supports_concurrent(&self) -> bool {
        false
    }

    fn install(&self, id: &str) -> InstallResult {
        run_operation(self.runner.as_ref(), &self.rules, Operation::Install, id, NAME, &["install", id], &ENV)
    }

    fn uninstall(&self, id: &str) -> InstallResult {
        run_operation(self.runner.as_ref(), &self.rules, Operation::Uninstall, id, NAME, &["uninstall", id], &ENV)
    }

    fn search(&self, query: &str) -> Result<Vec<PackageInfo>, InstallerError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let output = run_query(self.runner.as_ref(), NAME, &["search", query], &ENV)?;
        if output.success() {
            return Ok(parse_brew_search(&output.stdout));
        }
        if output.stderr.contains("No formulae or casks found") {
            return Ok(Vec::new());
        }
        Err(execution_error(NAME, &output))
    }

    fn list_installed(&self) -> Result<Vec<PackageInfo>, InstallerError> {
        let output = run_query(self.runner.as_ref(), NAME, &["list", "--versions"], &ENV)?;
        if !output.success() {
            return Err(execution_error(NAME, &output));
        }
        Ok(parse_brew_list(&output.stdout))
    }

    fn refresh_metadata(&self) -> Result<(), InstallerError> {
        // 这里需要真正更新，不能带 HOMEBREW_NO_AUTO_UPDATE
        let output = run_query(self.runner.as_ref(), NAME, &["update"], &ENV[1..])?;
        if output.success() {
            Ok(())
        } else {
            Err(execution_error(NAME, &output))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::runner::testing::ScriptedRunner;
    use super::super::InstallStatus;
    use super::*;

    fn backend(runner: ScriptedRunner) -> Brew {
        Brew::new(Arc::new(runner))
    }

    #[test]
    fn not_safe_for_concurrency() {
        assert!(!backend(ScriptedRunner::new()).supports_concurrent());
    }

    #[test]
    fn install_outcomes() {
        let brew = backend(
            ScriptedRunner::new()
                .reply("brew install wget", 0, "==> Pouring wget--1.24.5.arm64_sonoma.bottle.tar.gz", "")
                .reply("brew install git", 0, "", "Warning: git 2.44.0 is already installed and up-to-date.")
                .reply("brew install nope", 1, "", "Error: No available formula with the name \"nope\"."),
        );
        assert_eq!(brew.install("wget").status(), InstallStatus::Success);
        assert_eq!(brew.install("git").status(), InstallStatus::Skipped);
        assert_eq!(brew.install("nope").status(), InstallStatus::Failed);
    }

    #[test]
    fn uninstall_not_installed_is_skipped() {
        let brew = backend(ScriptedRunner::new().reply("brew uninstall", 1, "", "Error: No such keg: /opt/homebrew/Cellar/jq"));
        assert_eq!(brew.uninstall("jq").status(), InstallStatus::Skipped);
    }

    #[test]
    fn search_zero_matches() {
        let brew = backend(ScriptedRunner::new().reply(
            "brew search",
            1,
            "",
            "Error: No formulae or casks found for \"qqqq\".",
        ));
        assert!(brew.search("qqqq").unwrap().is_empty());
    }

    #[test]
    fn list_installed_versions() {
        let brew = backend(ScriptedRunner::new().reply("brew list --versions", 0, "git 2.44.0\njq 1.7.1\n", ""));
        let installed = brew.list_installed().unwrap();
        assert_eq!(installed.len(), 2);
        assert_eq!(installed[1].version.as_deref(), Some("1.7.1"));
    }

    #[test]
    fn refresh_failure_is_reported() {
        let brew = backend(ScriptedRunner::new().reply("brew update", 1, "", "Error: Failed to update tap"));
        assert!(matches!(
            brew.refresh_metadata(),
            Err(InstallerError::Execution { code: Some(1), .. })
        ));
    }
}
