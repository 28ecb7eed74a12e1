use cipherscan::cli::Cli;
use cipherscan::engine::Scanner;
use cipherscan::output::write_report;
use cipherscan::transport::TcpConnector;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let (target, cfg) = cli.into_config()?;
    let output = cfg.output.clone();

    let scanner = Scanner::new(Arc::new(TcpConnector), cfg);
    let report = scanner.scan(&target).await?;
    write_report(&output, &report)?;

    Ok(())
}
