use clap::Parser;
use corkrouter::cli::{run_cli, Cli};
use corkrouter::logging::{init_logging_with_config, LogConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_logging_with_config(&LogConfig::from_env())?;
    run_cli(Cli::parse()).await
}
