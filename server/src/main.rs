//! AgroDetect Server
//!
//! HTTP API for plant disease analysis. Loads the classifier once at startup
//! and serves predictions with Grad-CAM heatmap overlays.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use agrodetect::backend::backend_name;
use agrodetect::utils::logging::{init_logging, LogConfig, LogLevel};

use crate::state::{AppState, ServerConfig};

/// AgroDetect Server
#[derive(Parser, Debug)]
#[command(name = "agrodetect-server")]
#[command(version)]
#[command(about = "HTTP API for plant disease analysis with Grad-CAM")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "AGRODETECT_PORT", default_value = "8000")]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "AGRODETECT_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Path to the trained model weights (.mpk)
    #[arg(long, env = "AGRODETECT_MODEL")]
    model: Option<PathBuf>,

    /// Path to the model config JSON
    #[arg(long, env = "AGRODETECT_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the class label JSON array
    #[arg(long, env = "AGRODETECT_LABELS")]
    labels: Option<PathBuf>,

    /// Maximum upload size in megabytes
    #[arg(long, env = "AGRODETECT_MAX_UPLOAD_MB", default_value = "10")]
    max_upload_mb: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "AGRODETECT_LOG", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&LogConfig::production().with_level(LogLevel::parse(&cli.log_level)))?;

    // Build configuration
    let mut config = ServerConfig::default();

    if let Some(model) = cli.model {
        config.model_path = model;
    }

    if let Some(model_config) = cli.config {
        config.config_path = model_config;
    }

    if let Some(labels) = cli.labels {
        config.labels_path = labels;
    }

    info!("AgroDetect Server v{}", agrodetect::VERSION);
    info!("Configuration:");
    info!("  Model:   {:?}", config.model_path);
    info!("  Config:  {:?}", config.config_path);
    info!("  Labels:  {:?}", config.labels_path);
    info!("  Backend: {}", backend_name());

    // Create shared state
    let state = Arc::new(AppState::load(&config)?);
    info!("Grad-CAM layer: {}", state.model_layer);

    let app = routes::router(state, cli.max_upload_mb * 1024 * 1024);

    // Start server
    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
