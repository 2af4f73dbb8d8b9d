//! Scoring pipeline: extractor → registry → builder → validator → client → interpreter.
//!
//! Single requests run the stages in order on the caller's task. Batches fan
//! out one task per candidate behind a semaphore; cancelling a batch stops
//! candidates still waiting for a permit and leaves in-flight scorer calls alone.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use crate::errors::AppError;
use crate::features::builder::FeatureVectorBuilder;
use crate::features::extractor::ProfileFeatureExtractor;
use crate::features::validator::SchemaValidator;
use crate::models::prediction::PredictionResult;
use crate::models::profile::CandidateProfile;
use crate::schema::registry::ModelSchemaRegistry;
use crate::scorer_client::PredictionClient;
use crate::scoring::interpreter::{ScoreInterpreter, ScoringContext};
use crate::scoring::job_match::{match_candidate, JobContext};

#[derive(Debug, Clone, Deserialize)]
pub struct BatchCandidate {
    pub candidate_id: String,
    /// Raw so one malformed profile fails alone.
    pub profile: Value,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Scored,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub candidate_id: String,
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PredictionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchError>,
}

impl BatchItem {
    fn scored(candidate_id: String, result: PredictionResult) -> Self {
        Self {
            candidate_id,
            status: BatchStatus::Scored,
            result: Some(result),
            error: None,
        }
    }

    fn failed(candidate_id: String, err: &AppError) -> Self {
        Self {
            candidate_id,
            status: BatchStatus::Failed,
            result: None,
            error: Some(BatchError {
                code: err.code().to_string(),
                message: err.to_string(),
            }),
        }
    }

    fn cancelled(candidate_id: String) -> Self {
        Self {
            candidate_id,
            status: BatchStatus::Cancelled,
            result: None,
            error: None,
        }
    }
}

#[derive(Clone)]
pub struct ScoringPipeline {
    registry: Arc<ModelSchemaRegistry>,
    client: PredictionClient,
    batch_concurrency: usize,
}

impl ScoringPipeline {
    pub fn new(
        registry: Arc<ModelSchemaRegistry>,
        client: PredictionClient,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            client,
            batch_concurrency: batch_concurrency.max(1),
        }
    }

    /// Scores one profile against `version`, or the current schema when `None`.
    pub async fn score(
        &self,
        profile: &CandidateProfile,
        version: Option<&str>,
    ) -> Result<PredictionResult, AppError> {
        self.score_for_job(profile, version, None).await
    }

    /// Like `score`, and also matches the candidate against `job` when given.
    pub async fn score_for_job(
        &self,
        profile: &CandidateProfile,
        version: Option<&str>,
        job: Option<&JobContext>,
    ) -> Result<PredictionResult, AppError> {
        let schema = self.registry.resolve(version)?;

        // A bad embedding fails the candidate before any scorer call.
        let job_score = job
            .map(|job| match_candidate(job, profile.skills_embedding.as_deref()))
            .transpose()?;

        let signals = ProfileFeatureExtractor.extract(profile);
        let built = FeatureVectorBuilder.build(&signals, &schema)?;

        // Nothing leaves the process unless the vector matches the schema.
        if let Err(mismatch) = SchemaValidator.validate(&built.vector, &schema) {
            warn!(
                "Rejected vector for schema {}: {}",
                schema.version,
                mismatch.problems.join("; ")
            );
            return Err(mismatch.into());
        }

        let outcome = self.client.predict(&built.vector).await?;
        let result = ScoreInterpreter.interpret(
            outcome,
            ScoringContext::new(profile.candidate_id.clone(), &built).with_job(job_score),
        )?;

        debug!(
            "Scored candidate {:?} with {}: probability={:?} degraded={}",
            result.candidate_id, result.model_version, result.probability, result.degraded
        );
        Ok(result)
    }

    /// Parses a raw JSON profile and scores it. `candidate_id` fills in an id
    /// the profile itself does not carry.
    pub async fn score_value(
        &self,
        profile: Value,
        version: Option<&str>,
        candidate_id: Option<&str>,
        job: Option<&JobContext>,
    ) -> Result<PredictionResult, AppError> {
        let mut profile = CandidateProfile::from_value(profile)?;
        if profile.candidate_id.is_none() {
            profile.candidate_id = candidate_id.map(str::to_string);
        }
        self.score_for_job(&profile, version, job).await
    }

    /// Scores many candidates with at most `batch_concurrency` scorer calls in
    /// flight. `cancel` flips to `true` (or its sender is dropped) to cancel.
    /// Results come back in input order. Every candidate is matched against `job`
    /// when one is given.
    pub async fn score_batch(
        &self,
        candidates: Vec<BatchCandidate>,
        version: Option<&str>,
        job: Option<JobContext>,
        cancel: watch::Receiver<bool>,
    ) -> Result<Vec<BatchItem>, AppError> {
        if candidates.is_empty() {
            return Err(AppError::Validation(
                "batch must contain at least one candidate".to_string(),
            ));
        }
        let schema = self.registry.resolve(version)?;
        let version = schema.version.clone();
        let total = candidates.len();
        info!(
            "Scoring batch of {total} candidates against {version} (concurrency {})",
            self.batch_concurrency
        );

        let job = job.map(Arc::new);
        let semaphore = Arc::new(Semaphore::new(self.batch_concurrency));
        let mut handles = Vec::with_capacity(total);

        for candidate in candidates {
            let pipeline = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let mut cancel = cancel.clone();
            let version = version.clone();
            let job = job.clone();
            let candidate_id = candidate.candidate_id.clone();

            // Detached: dropping the handle never aborts a call already in flight.
            let handle = tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = wait_cancelled(&mut cancel) => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return BatchItem::cancelled(candidate.candidate_id);
                };
                if is_cancelled(&cancel) {
                    return BatchItem::cancelled(candidate.candidate_id);
                }

                let scored = pipeline
                    .score_value(
                        candidate.profile,
                        Some(&version),
                        Some(&candidate.candidate_id),
                        job.as_deref(),
                    )
                    .await;
                match scored {
                    Ok(result) => BatchItem::scored(candidate.candidate_id, result),
                    Err(e) => {
                        if matches!(e, AppError::Configuration(_)) {
                            error!(
                                "Candidate {} hit a configuration error: {e}",
                                candidate.candidate_id
                            );
                        }
                        BatchItem::failed(candidate.candidate_id, &e)
                    }
                }
            });
            handles.push((candidate_id, handle));
        }

        let mut results = Vec::with_capacity(total);
        for (candidate_id, handle) in handles {
            match handle.await {
                Ok(item) => results.push(item),
                Err(e) => {
                    error!("Scoring task for candidate {candidate_id} failed: {e}");
                    let err = AppError::Internal(anyhow::anyhow!("scoring task failed: {e}"));
                    results.push(BatchItem::failed(candidate_id, &err));
                }
            }
        }

        let count = |status: BatchStatus| results.iter().filter(|r| r.status == status).count();
        info!(
            "Batch against {version} finished: {} scored, {} failed, {} cancelled",
            count(BatchStatus::Scored),
            count(BatchStatus::Failed),
            count(BatchStatus::Cancelled)
        );
        Ok(results)
    }
}

/// Resolves once the batch is cancelled or its sender is gone.
async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow() || cancel.has_changed().is_err()
}
