use anyhow::Result;
use clap::Parser;
use redash_sync::cli::{run, Cli};
use redash_sync::load_config::parse_log_level;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing for the CLI at the requested level.
    let level = parse_log_level(&cli.log_level)?;
    tracing_subscriber::fmt().with_max_level(level).init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let code = run(cli).await?;
    if code == 0 {
        tracing::info!("CLI completed successfully");
    } else {
        tracing::error!(code, "CLI completed with errors");
    }
    std::process::exit(code)
}
