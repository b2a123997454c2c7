//! "已是目标状态" 的判定规则
//!
//! 各原生工具没有文档化的 "已安装 / 未安装" 约定，只能靠输出文本和退出码推断。
//! 规则以数据形式存在，配置文件可以追加。

use super::types::CommandOutput;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Uninstall,
}

impl Operation {
    pub fn verb(self) -> &'static str {
        match self {
            Operation::Install => "install",
            Operation::Uninstall => "uninstall",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipRules {
    /// 安装时表示 "已安装 / 无可用更新" 的输出片段（小写比较）
    pub already_installed: Vec<String>,
    /// 卸载时表示 "未安装" 的输出片段
    pub not_installed: Vec<String>,
    /// 安装时视为跳过的退出码
    pub install_exit_codes: Vec<i32>,
    /// 卸载时视为跳过的退出码
    pub uninstall_exit_codes: Vec<i32>,
}

/// 配置文件中的追加规则（配置里按后端名分组）
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct SkipRulesOverride {
    #[serde(default)]
    pub already_installed: Vec<String>,
    #[serde(default)]
    pub not_installed: Vec<String>,
    #[serde(default)]
    pub install_exit_codes: Vec<i32>,
    #[serde(default)]
    pub uninstall_exit_codes: Vec<i32>,
}

fn owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_lowercase()).collect()
}

impl SkipRules {
    pub fn winget() -> Self {
        Self {
            already_installed: owned(&[
                "no available upgrade found",
                "no newer package versions are available",
            ]),
            not_installed: owned(&["no installed package found matching input criteria"]),
            // APPINSTALLER_CLI_ERROR_UPDATE_NOT_APPLICABLE / PACKAGE_ALREADY_INSTALLED
            install_exit_codes: vec![-1978335189, -1978335135],
            // NO_APPLICATIONS_FOUND：卸载时即 "未安装"
            uninstall_exit_codes: vec![-1978335212],
        }
    }

    pub fn brew() -> Self {
        Self {
            already_installed: owned(&["is already installed", "already installed and up-to-date"]),
            not_installed: owned(&["no such keg", "is not installed", "no installed keg or cask"]),
            install_exit_codes: Vec::new(),
            uninstall_exit_codes: Vec::new(),
        }
    }

    pub fn apt() -> Self {
        Self {
            already_installed: owned(&["is already the newest version"]),
            not_installed: owned(&["is not installed, so not removed"]),
            install_exit_codes: Vec::new(),
            uninstall_exit_codes: Vec::new(),
        }
    }

    pub fn extend(&mut self, extra: &SkipRulesOverride) {
        self.already_installed
            .extend(extra.already_installed.iter().map(|p| p.to_lowercase()));
        self.not_installed
            .extend(extra.not_installed.iter().map(|p| p.to_lowercase()));
        self.install_exit_codes.extend(&extra.install_exit_codes);
        self.uninstall_exit_codes.extend(&extra.uninstall_exit_codes);
    }

    /// 输出是否表明目标状态已经成立。退出码和文本任一命中即可，与成功与否无关。
    pub fn is_noop(&self, op: Operation, output: &CommandOutput) -> bool {
        let (patterns, codes) = match op {
            Operation::Install => (&self.already_installed, &self.install_exit_codes),
            Operation::Uninstall => (&self.not_installed, &self.uninstall_exit_codes),
        };
        if let Some(code) = output.code {
            if codes.contains(&code) {
                return true;
            }
        }
        let text = output.combined_output().to_lowercase();
        patterns.iter().any(|p| text.contains(p.as_str()))
    }
}
