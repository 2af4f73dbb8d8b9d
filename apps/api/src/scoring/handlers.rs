//! Axum route handlers for the Scoring API.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::prediction::PredictionResult;
use crate::schema::ModelSchema;
use crate::scoring::job_match::JobContext;
use crate::scoring::pipeline::{BatchCandidate, BatchItem};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ScoreProfileRequest {
    pub profile: Value,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    /// When present, the result also carries a job match.
    #[serde(default)]
    pub job_embedding: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
pub struct BatchScoreRequest {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub model_version: Option<String>,
    /// Embedding of the job identified by `job_id`.
    #[serde(default)]
    pub job_embedding: Option<Vec<f64>>,
    pub candidates: Vec<BatchCandidate>,
}

#[derive(Debug, Serialize)]
pub struct BatchScoreResponse {
    pub job_id: String,
    pub results: Vec<BatchItem>,
}

#[derive(Debug, Serialize)]
pub struct SchemaSummary {
    pub model_version: String,
    pub slot_count: usize,
    pub description: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/schemas
pub async fn handle_list_schemas(State(state): State<AppState>) -> Json<Vec<SchemaSummary>> {
    let summaries = state
        .registry
        .schemas()
        .map(|schema| SchemaSummary {
            model_version: schema.version.clone(),
            slot_count: schema.slot_count(),
            description: schema.description.clone(),
        })
        .collect();
    Json(summaries)
}

/// GET /api/v1/schemas/:version
pub async fn handle_get_schema(
    State(state): State<AppState>,
    Path(version): Path<String>,
) -> Result<Json<ModelSchema>, AppError> {
    let schema = state.registry.get(&version)?;
    Ok(Json(ModelSchema::clone(&schema)))
}

/// POST /api/v1/score
///
/// Scores one candidate profile against the requested (or current) model.
pub async fn handle_score(
    State(state): State<AppState>,
    Json(request): Json<ScoreProfileRequest>,
) -> Result<Json<PredictionResult>, AppError> {
    let job = JobContext::from_request(request.job_id, request.job_embedding)?;
    let result = state
        .pipeline
        .score_value(
            request.profile,
            request.model_version.as_deref(),
            None,
            job.as_ref(),
        )
        .await?;
    Ok(Json(result))
}

/// POST /api/v1/score/batch
///
/// Scores every candidate of a job. Per-candidate failures are reported in
/// place. If the caller disconnects, candidates not yet started are cancelled.
pub async fn handle_score_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchScoreRequest>,
) -> Result<Json<BatchScoreResponse>, AppError> {
    let job_id = request
        .job_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let job = JobContext::from_request(Some(job_id.clone()), request.job_embedding)?;

    // Held for the whole call: dropping this request future drops the sender.
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let results = state
        .pipeline
        .score_batch(
            request.candidates,
            request.model_version.as_deref(),
            job,
            cancel_rx,
        )
        .await?;

    Ok(Json(BatchScoreResponse { job_id, results }))
}
