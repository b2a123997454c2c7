//! Windows：winget 后端

use super::parser::parse_winget_table;
use super::runner::{probe_version, CommandRunner};
use super::{
    execution_error, run_operation, run_query, Backend, CommandOutput, InstallResult, InstallerError, Operation,
    PackageInfo, SkipRules, SkipRulesOverride,
};
use std::sync::Arc;

pub const NAME: &str = "winget";

/// 所有子命令共用的非交互参数
const NON_INTERACTIVE: [&str; 2] = ["--accept-source-agreements", "--disable-interactivity"];

/// NO_APPLICATIONS_FOUND
const NO_MATCH_CODE: i32 = -1978335212;

pub struct Winget {
    runner: Arc<dyn CommandRunner>,
    rules: SkipRules,
}

impl Winget {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            rules: SkipRules::winget(),
        }
    }

    pub fn with_overrides(mut self, extra: Option<&SkipRulesOverride>) -> Self {
        if let Some(extra) = extra {
            self.rules.extend(extra);
        }
        self
    }

    fn args<'a>(head: &[&'a str]) -> Vec<&'a str> {
        head.iter().copied().chain(NON_INTERACTIVE).collect()
    }
}

/// 成功退出却找不到表格时视为输出无法解析，而不是零结果
fn table(output: &CommandOutput) -> Result<Vec<PackageInfo>, InstallerError> {
    parse_winget_table(&output.stdout).ok_or_else(|| InstallerError::UnexpectedOutput {
        program: NAME.to_string(),
        output: output.diagnostic(),
    })
}

impl Backend for Winget {
    fn name(&self) -> &'static str {
        NAME
    }

    fn version(&self) -> Option<String> {
        probe_version(self.runner.as_ref(), NAME)
    }

    fn install(&self, id: &str) -> InstallResult {
        let args = Self::args(&[
            "install",
            "--id",
            id,
            "--exact",
            "--silent",
            "--accept-package-agreements",
        ]);
        run_operation(self.runner.as_ref(), &self.rules, Operation::Install, id, NAME, &args, &[])
    }

    fn uninstall(&self, id: &str) -> InstallResult {
        let args = Self::args(&["uninstall", "--id", id, "--exact", "--silent"]);
        run_operation(self.runner.as_ref(), &self.rules, Operation::Uninstall, id, NAME, &args, &[])
    }

    fn search(&self, query: &str) -> Result<Vec<PackageInfo>, InstallerError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let output = run_query(self.runner.as_ref(), NAME, &Self::args(&["search", query]), &[])?;
        // 无匹配时 winget 以非零退出码结束
        if output.code == Some(NO_MATCH_CODE)
            || output
                .combined_output()
                .contains("No package found matching input criteria")
        {
            return Ok(Vec::new());
        }
        if !output.success() {
            return Err(execution_error(NAME, &output));
        }
        table(&output)
    }

    fn list_installed(&self) -> Result<Vec<PackageInfo>, InstallerError> {
        let output = run_query(self.runner.as_ref(), NAME, &Self::args(&["list"]), &[])?;
        if !output.success() {
            return Err(execution_error(NAME, &output));
        }
        table(&output)
    }

    fn refresh_metadata(&self) -> Result<(), InstallerError> {
        let output = run_query(
            self.runner.as_ref(),
            NAME,
            &["source", "update", "--disable-interactivity"],
            &[],
        )?;
        if output.success() {
            Ok(())
        } else {
            Err(execution_error(NAME, &output))
        }
    }
}
