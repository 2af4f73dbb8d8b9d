use std::sync::Arc;

use crate::schema::registry::ModelSchemaRegistry;
use crate::scoring::pipeline::ScoringPipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Immutable after startup; read concurrently without locking.
    pub registry: Arc<ModelSchemaRegistry>,
    pub pipeline: ScoringPipeline,
}
