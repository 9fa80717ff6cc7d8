//! api-server binary.
//!
//! Loads a TOML configuration, starts an [`ApiServer`] with no application
//! routes (the generated root and catch-all routes answer), logs every server
//! event and stops gracefully on SIGINT/SIGTERM.

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;

use api_server::config::{load_config, ServerConfig};
use api_server::lifecycle::shutdown_signal;
use api_server::observability::{logging, metrics};
use api_server::ApiServer;

#[derive(Parser)]
#[command(name = "api-server")]
#[command(about = "Embeddable HTTP API server shell", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    logging::init(&config.observability)?;

    tracing::info!(
        path = ?cli.config,
        name = %config.name,
        bind_address = %config.bind_address(),
        default_version = %config.default_version,
        tls = config.tls().is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = ApiServer::new(config);

    let mut events = server.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(event = %event.name(), "Server event"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    server.start().await?;

    shutdown_signal().await;
    server.stop().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
