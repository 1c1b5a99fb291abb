// Forward Customer Value - Prediction Server
// REST API with Axum

use anyhow::{Context, Result};
use clap::Parser;
use forward_clv::api::{router, AppState};
use forward_clv::{
    init_logging, AppConfig, FeatureContract, ForestRegressor, LogFormat, PredictionService, ServiceMetrics,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "clv-server", version, about = "Serve CLV predictions over HTTP")]
struct Args {
    /// JSON config file; flags below override its service section
    #[arg(long, env = "CLV_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "CLV_BIND_ADDR")]
    bind: Option<String>,

    #[arg(long, env = "CLV_MODEL_PATH")]
    model: Option<PathBuf>,

    #[arg(long, env = "CLV_LOG_LEVEL")]
    log_level: Option<String>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn into_config(self) -> Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref())?;
        if let Some(bind) = self.bind {
            config.service.bind_addr = bind;
        }
        if let Some(model) = self.model {
            config.service.model_path = model;
        }
        if let Some(level) = self.log_level {
            config.service.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.service.log_format = format;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;
    let service_config = &config.service;
    init_logging(&service_config.log_level, service_config.log_format)?;

    println!("🌐 Forward Customer Value - Prediction Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Load model once; it is shared read-only by every request
    let contract = FeatureContract::new();
    let model = ForestRegressor::load(&service_config.model_path, &contract)?;
    println!("✓ Model loaded: {:?}", service_config.model_path);

    let state = AppState {
        service: PredictionService::new(Arc::new(model), contract),
        metrics: Arc::new(ServiceMetrics::new().context("Failed to register metrics")?),
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&service_config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", service_config.bind_addr))?;

    info!(addr = %service_config.bind_addr, "Server listening");
    println!("\n🚀 Server running on http://{}", service_config.bind_addr);
    println!("   API:     POST /predict");
    println!("   Form:    GET  /");
    println!("   Metrics: GET  /metrics");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
