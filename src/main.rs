use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

mod api;
mod config;
mod data;
mod engine;
mod models;
mod validation;

use api::AppState;
use config::Config;
use engine::{PredictionContext, PredictionService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Build the immutable prediction context: historical dataset plus one
    // artifact set per model family. Missing artifacts degrade per-player
    // availability; they never stop the service from starting.
    let ctx = Arc::new(PredictionContext::load(&config)?);
    let service = PredictionService::new(ctx);

    let status = service.status();
    info!(
        "Context ready: {:?}, {} players, {} history rows",
        status.status, status.players_available, status.historical_data_rows
    );
    for (kind, availability) in &status.models_availability {
        info!("Model {}: {}", kind, availability);
    }

    // Validation records are optional; the comparator endpoints serve
    // empty sets when the files are absent.
    let validation_records = data::load_validation_records(&config.validation_dir);

    let state = AppState {
        service,
        validation: Arc::new(validation_records),
    };
    let app = api::router(state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
