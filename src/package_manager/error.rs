//! 安装器错误类型

use thiserror::Error;

/// 平台/环境级错误在批次开始前判定；其余错误作为数据写入 `InstallResult`。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstallerError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("environment not ready: {}", .0.join("; "))]
    EnvironmentNotReady(Vec<String>),

    #[error("{backend} cannot run concurrent operations; use sequential mode")]
    ConcurrencyUnsupported { backend: String },

    #[error("failed to launch {program}: {reason}")]
    Launch { program: String, reason: String },

    #[error("{program} exited with {}: {output}", code_label(.code))]
    Execution {
        program: String,
        code: Option<i32>,
        output: String,
    },

    #[error("unrecognized {program} output: {output}")]
    UnexpectedOutput { program: String, output: String },

    #[error("{program} requires elevated privileges; run as root or configure sudo")]
    PrivilegeRequired { program: String },

    #[error("no package id given for {0:?}")]
    MissingPackageId(String),

    #[error("unexpected fault: {0}")]
    UnexpectedFault(String),
}

fn code_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {}", c),
        None => "signal".to_string(),
    }
}

impl InstallerError {
    pub fn launch(program: &str, err: &std::io::Error) -> Self {
        InstallerError::Launch {
            program: program.to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = InstallerError::UnsupportedPlatform("freebsd".into());
        assert_eq!(err.to_string(), "unsupported platform: freebsd");

        let err = InstallerError::Execution {
            program: "winget".into(),
            code: Some(-1978335212),
            output: "No package found matching input criteria.".into(),
        };
        assert_eq!(
            err.to_string(),
            "winget exited with code -1978335212: No package found matching input criteria."
        );

        let err = InstallerError::EnvironmentNotReady(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "environment not ready: a; b");
    }
}
