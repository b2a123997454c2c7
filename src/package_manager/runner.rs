//! 外部命令执行

use super::types::CommandOutput;
use std::io;
use std::path::PathBuf;

/// 执行外部包管理器命令的抽象，测试中可替换为脚本化实现
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str], env: &[(&str, &str)]) -> io::Result<CommandOutput>;

    /// 在 PATH 中定位可执行文件
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// 真实系统进程执行器
///
/// stdin 置空保证非交互；stdout / stderr 全部捕获，退出码交由调用方判断。
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], env: &[(&str, &str)]) -> io::Result<CommandOutput> {
        log::debug!("exec: {} {}", program, args.join(" "));

        let mut expr = duct::cmd(program, args.iter().copied())
            .stdin_null()
            .stdout_capture()
            .stderr_capture()
            .unchecked();
        for &(key, value) in env {
            expr = expr.env(key, value);
        }

        let output = expr.run()?;
        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            code: output.status.code(),
        };
        if !result.success() {
            log::warn!("{} {} 退出码 {:?}", program, args.join(" "), result.code);
        }
        Ok(result)
    }
}

/// 轻量版本探测：可执行文件存在且 `--version` 成功时返回首行输出
pub fn probe_version(runner: &dyn CommandRunner, program: &str) -> Option<String> {
    runner.locate(program)?;
    let output = runner.run(program, &["--version"], &[]).ok()?;
    if !output.success() {
        return None;
    }
    output
        .stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}
