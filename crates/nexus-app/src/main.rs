//! nexus market pipeline - entry point.

use anyhow::Result;
use clap::Parser;
use nexus_app::{AppConfig, Application};
use tracing::{info, warn};

/// Streaming market data pipeline with a conversational analyst.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via NEXUS_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Publish synthetic market data instead of relying on feeds alone
    #[arg(long)]
    demo: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Must run before any WS connection
    nexus_ws::init_crypto();

    let args = Args::parse();

    let config_path = AppConfig::resolve_path(args.config);
    let (mut config, found) = AppConfig::load_or_default(&config_path)?;
    if args.demo {
        config.demo.enabled = true;
    }

    nexus_telemetry::init_logging(&config.telemetry.log_level)?;

    info!("Starting nexus v{}", env!("CARGO_PKG_VERSION"));
    if found {
        info!(config_path = %config_path, "Configuration loaded");
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
    }

    let app = Application::new(config)?;
    app.run().await?;

    Ok(())
}
