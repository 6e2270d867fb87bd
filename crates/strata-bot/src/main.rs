//! Strata trading bot entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Strategy execution and order event relay engine.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via STRATA_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    strata_telemetry::init_logging()?;

    info!("Starting strata-bot v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args
        .config
        .or_else(|| std::env::var("STRATA_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());
    info!(config_path = %config_path, "Loading configuration");

    let config = strata_bot::AppConfig::load(&config_path)?;

    let app = strata_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
