mod config;
mod errors;
mod features;
mod models;
mod routes;
mod schema;
mod scorer_client;
mod scoring;
mod state;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::routes::build_router;
use crate::schema::registry::ModelSchemaRegistry;
use crate::scorer_client::{HttpScoringBackend, PredictionClient, ShapeCheck};
use crate::scoring::pipeline::ScoringPipeline;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Shortlist API v{}", env!("CARGO_PKG_VERSION"));

    // Load model schemas; an unresolvable default version stops startup here
    let registry = ModelSchemaRegistry::load_dir(&config.schema_dir, &config.model_version)
        .with_context(|| format!("loading schemas from {}", config.schema_dir.display()))?;
    let registry = Arc::new(registry);
    info!(
        "Schema registry loaded: {:?} (default {})",
        registry.versions(),
        config.model_version
    );

    // Initialize scorer client
    let backend = HttpScoringBackend::new(&config.scorer_url, config.scorer_timeout)
        .context("building scorer HTTP client")?;
    let client = PredictionClient::new(Arc::new(backend), config.retry_policy());
    info!(
        "Scorer client initialized ({}, {} attempts, timeout {}ms)",
        config.scorer_url,
        config.scorer_max_attempts,
        config.scorer_timeout.as_millis()
    );

    // Cross-check every schema against the shape the deployed model reports
    if config.verify_schemas_on_startup {
        for schema in registry.schemas() {
            match client.verify_schema(schema).await? {
                ShapeCheck::Verified => {}
                ShapeCheck::Unreachable(reason) => warn!(
                    "Could not verify schema {} against the scorer ({reason}); relying on per-request checks",
                    schema.version
                ),
            }
        }
    }

    let pipeline = ScoringPipeline::new(Arc::clone(&registry), client, config.batch_concurrency);

    // Build app state
    let state = AppState { registry, pipeline };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
