//! 包管理器相关数据类型定义

use super::error::InstallerError;
use serde::{Deserialize, Serialize};

/// 命令输出结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// 退出码；被信号终止时为 None
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn combined_output(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// 失败时用于错误信息的诊断文本：优先 stderr，没有则退回 stdout
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// 后端报告的包信息（搜索 / 已安装列表）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageInfo {
    pub name: String,
    /// 后端原生标识符，可能为空
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PackageInfo {
    /// 仅凭标识符构造（安装/卸载结果中使用）
    pub fn from_id(id: &str) -> Self {
        Self {
            name: id.to_string(),
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// 展示用名称，名称缺失时使用 id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// 用户声明的目标软件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    /// 旧版配置字段，仅在 id 为空时使用
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package: String,
    #[serde(default)]
    pub category: String,
}

impl InstallRequest {
    /// 命令行直接传入的包名：name 与 id 相同
    pub fn from_id(id: &str) -> Self {
        Self {
            name: id.to_string(),
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// 交给后端的标识符
    pub fn package_id(&self) -> &str {
        if self.id.is_empty() {
            &self.package
        } else {
            &self.id
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InstallStatus {
    Success,
    Failed,
    Skipped,
}

impl InstallStatus {
    pub fn icon(self) -> &'static str {
        match self {
            InstallStatus::Success => "✓",
            InstallStatus::Failed => "✗",
            InstallStatus::Skipped => "⊘",
        }
    }
}

/// 单个包一次操作的归一化结果
///
/// 只能通过 `success` / `skipped` / `failed` 构造，
/// 保证 `error` 存在当且仅当状态为 Failed。
#[derive(Debug, Clone, PartialEq)]
pub struct InstallResult {
    pub package: PackageInfo,
    status: InstallStatus,
    error: Option<InstallerError>,
}

impl InstallResult {
    pub fn success(package: PackageInfo) -> Self {
        Self {
            package,
            status: InstallStatus::Success,
            error: None,
        }
    }

    pub fn skipped(package: PackageInfo) -> Self {
        Self {
            package,
            status: InstallStatus::Skipped,
            error: None,
        }
    }

    pub fn failed(package: PackageInfo, error: InstallerError) -> Self {
        Self {
            package,
            status: InstallStatus::Failed,
            error: Some(error),
        }
    }

    pub fn status(&self) -> InstallStatus {
        self.status
    }

    pub fn error(&self) -> Option<&InstallerError> {
        self.error.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_id_falls_back_to_legacy_field() {
        let req = InstallRequest {
            name: "VS Code".into(),
            id: String::new(),
            package: "Microsoft.VisualStudioCode".into(),
            category: "Dev".into(),
        };
        assert_eq!(req.package_id(), "Microsoft.VisualStudioCode");

        let req = InstallRequest {
            id: "Git.Git".into(),
            package: "ignored".into(),
            ..InstallRequest::default()
        };
        assert_eq!(req.package_id(), "Git.Git");
    }

    #[test]
    fn error_present_only_when_failed() {
        let ok = InstallResult::success(PackageInfo::from_id("a"));
        assert_eq!(ok.status(), InstallStatus::Success);
        assert!(ok.error().is_none());

        let skip = InstallResult::skipped(PackageInfo::from_id("a"));
        assert!(skip.error().is_none());

        let failed = InstallResult::failed(
            PackageInfo::from_id("a"),
            InstallerError::UnexpectedFault("boom".into()),
        );
        assert_eq!(failed.status(), InstallStatus::Failed);
        assert!(failed.error().is_some());
    }

    #[test]
    fn diagnostic_prefers_stderr() {
        let out = CommandOutput {
            stdout: "some progress".into(),
            stderr: "E: Unable to locate package foo\n".into(),
            code: Some(100),
        };
        assert_eq!(out.diagnostic(), "E: Unable to locate package foo");

        let out = CommandOutput {
            stdout: "No package found matching input criteria.".into(),
            stderr: "  ".into(),
            code: Some(1),
        };
        assert_eq!(out.diagnostic(), "No package found matching input criteria.");
    }
}
