mod cli;
mod config;
mod environment;
mod orchestrator;
mod package_manager;
mod render;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = cli::Cli::parse();
    let ok = cli::run(cli).await?;

    // 有失败项或环境未就绪时以非零状态退出
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
