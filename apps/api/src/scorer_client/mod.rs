//! Scorer Client: the single point of contact with the external scoring boundary.
//!
//! ARCHITECTURAL RULE: no other module talks to the scorer directly.
//! Every request carries the slot names alongside the values and the model
//! version, so the scorer can detect drift instead of silently misaligning.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::errors::AppError;
use crate::features::builder::FeatureVector;
use crate::models::prediction::FeatureContribution;
use crate::schema::ModelSchema;

pub mod http;

pub use http::HttpScoringBackend;

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("scorer did not answer within {0:?}")]
    Timeout(Duration),

    #[error("scorer unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("scorer internal error: {0}")]
    Internal(String),

    #[error("scorer rejected the input shape ({received} features sent): {message}")]
    ShapeMismatch {
        expected: Option<usize>,
        received: usize,
        message: String,
    },

    #[error("model '{0}' is not deployed on the scorer")]
    ModelNotFound(String),

    #[error("scorer rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ScorerError {
    /// Connectivity-class failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ScorerError::Http(e) => !e.is_decode() && !e.is_builder(),
            ScorerError::Timeout(_) | ScorerError::Unavailable { .. } | ScorerError::Internal(_) => {
                true
            }
            _ => false,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub feature_values: Vec<f64>,
    pub feature_names: Vec<String>,
    pub model_version: String,
}

impl From<&FeatureVector> for ScoreRequest {
    fn from(vector: &FeatureVector) -> Self {
        Self {
            feature_values: vector.values.clone(),
            feature_names: vector.names.clone(),
            model_version: vector.schema_version.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub probability: f64,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub contributions: Vec<FeatureContribution>,
}

/// What the deployed model reports about its own input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelShape {
    pub model_version: String,
    pub n_features_in: usize,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
}

// ────────────────────────────────────────────────────────────────────────────
// Backend trait
// ────────────────────────────────────────────────────────────────────────────

/// One attempt against the scoring boundary. Retries and timeouts live in
/// `PredictionClient`, so backends stay single-shot.
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreResponse, ScorerError>;

    async fn describe(&self, model_version: &str) -> Result<ModelShape, ScorerError>;
}

// ────────────────────────────────────────────────────────────────────────────
// PredictionClient
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(5),
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base × 2^(retry-1), capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredictOutcome {
    Scored(ScoreResponse),
    /// Every attempt failed transiently. No probability exists.
    Degraded { attempts: u32, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeCheck {
    Verified,
    /// The scorer could not be reached; the per-request guard still applies.
    Unreachable(String),
}

#[derive(Clone)]
pub struct PredictionClient {
    backend: Arc<dyn ScoringBackend>,
    policy: RetryPolicy,
}

impl PredictionClient {
    pub fn new(backend: Arc<dyn ScoringBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Sends a validated vector. Transient failures are retried with bounded
    /// exponential backoff and end in `Degraded`; a shape disagreement is fatal.
    pub async fn predict(&self, vector: &FeatureVector) -> Result<PredictOutcome, AppError> {
        let request = ScoreRequest::from(vector);
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error: Option<ScorerError> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.policy.backoff(attempt - 1);
                warn!(
                    "Scorer attempt {}/{} for model {} failed, retrying after {}ms...",
                    attempt - 1,
                    attempts,
                    request.model_version,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let result = match tokio::time::timeout(self.policy.timeout, self.backend.score(&request)).await
            {
                Ok(result) => result,
                Err(_) => Err(ScorerError::Timeout(self.policy.timeout)),
            };

            match result {
                Ok(response) => {
                    debug!(
                        "Scorer answered for model {}: probability={}",
                        request.model_version, response.probability
                    );
                    return check_response(response, &request).map(PredictOutcome::Scored);
                }
                Err(e) if e.is_transient() => {
                    last_error = Some(e);
                }
                Err(e) => return Err(fatal(e, &request)),
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt was made".to_string());
        warn!(
            "Scorer unavailable for model {} after {} attempts: {}",
            request.model_version, attempts, message
        );
        Ok(PredictOutcome::Degraded { attempts, message })
    }

    /// Compares a schema with the shape the deployed model reports for itself.
    pub async fn verify_schema(&self, schema: &ModelSchema) -> Result<ShapeCheck, AppError> {
        let described =
            match tokio::time::timeout(self.policy.timeout, self.backend.describe(&schema.version))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ScorerError::Timeout(self.policy.timeout)),
            };

        let shape = match described {
            Ok(shape) => shape,
            Err(e) if e.is_transient() => return Ok(ShapeCheck::Unreachable(e.to_string())),
            Err(ScorerError::ModelNotFound(version)) => {
                return Err(AppError::Configuration(format!(
                    "model '{version}' is registered but not deployed on the scorer"
                )))
            }
            Err(e) => return Err(AppError::ExternalService(e.to_string())),
        };

        if shape.n_features_in != schema.slot_count() {
            return Err(AppError::Configuration(format!(
                "schema '{}' declares {} slots but the deployed model reports {} input features",
                schema.version,
                schema.slot_count(),
                shape.n_features_in
            )));
        }
        if let Some(names) = &shape.feature_names {
            if *names != schema.slot_names() {
                return Err(AppError::Configuration(format!(
                    "schema '{}' slot names differ from the deployed model's feature names",
                    schema.version
                )));
            }
        }

        info!(
            "Schema {} matches deployed model ({} features)",
            schema.version, shape.n_features_in
        );
        Ok(ShapeCheck::Verified)
    }
}

/// Non-transient scorer failures. Shape and model disagreements mean the
/// registry is stale relative to the deployed model.
fn fatal(e: ScorerError, request: &ScoreRequest) -> AppError {
    match e {
        ScorerError::ShapeMismatch {
            expected, message, ..
        } => {
            let expected = expected.map_or_else(|| "a different number of".to_string(), |n| n.to_string());
            error!(
                "Scorer rejected {} features for model {} (expects {}): {}",
                request.feature_values.len(),
                request.model_version,
                expected,
                message
            );
            AppError::Configuration(format!(
                "scorer expects {expected} input features for model '{}' but the registry schema declares {}; the registry is stale relative to the deployed model",
                request.model_version,
                request.feature_values.len()
            ))
        }
        ScorerError::ModelNotFound(version) => {
            error!("Scorer does not know model {version}");
            AppError::Configuration(format!(
                "model '{version}' is registered but not deployed on the scorer"
            ))
        }
        other => AppError::ExternalService(other.to_string()),
    }
}

/// A scorer that reports contributions for features it was never sent has
/// drifted from the schema.
fn check_response(
    mut response: ScoreResponse,
    request: &ScoreRequest,
) -> Result<ScoreResponse, AppError> {
    if let Some(unknown) = response
        .contributions
        .iter()
        .find(|c| !request.feature_names.contains(&c.feature))
    {
        return Err(AppError::Configuration(format!(
            "scorer reported a contribution for '{}', which model '{}' was not sent",
            unknown.feature, request.model_version
        )));
    }

    response
        .contributions
        .sort_by(|a, b| b.impact.abs().total_cmp(&a.impact.abs()));
    Ok(response)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::builder::FeatureVectorBuilder;
    use crate::features::extractor::ProfileFeatureExtractor;
    use crate::test_support::{
        candidate_strength_schema, fast_policy, scenario_a_profile, unavailable, MockBackend,
    };

    fn vector() -> FeatureVector {
        let signals = ProfileFeatureExtractor.extract(&scenario_a_profile());
        FeatureVectorBuilder
            .build(&signals, &candidate_strength_schema())
            .unwrap()
            .vector
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            timeout: Duration::from_secs(1),
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn test_request_carries_names_in_vector_order() {
        let v = vector();
        let request = ScoreRequest::from(&v);
        assert_eq!(request.feature_names, v.names);
        assert_eq!(request.feature_values, v.values);
        assert_eq!(request.model_version, "candidate-strength-v2");
    }

    #[test]
    fn test_transient_classification() {
        assert!(unavailable().is_transient());
        assert!(ScorerError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ScorerError::Internal("boom".into()).is_transient());
        assert!(!ScorerError::ModelNotFound("m".into()).is_transient());
        assert!(!ScorerError::ShapeMismatch {
            expected: Some(13),
            received: 18,
            message: String::new()
        }
        .is_transient());
        assert!(!ScorerError::Rejected {
            status: 400,
            message: String::new()
        }
        .is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_predict_success_first_try() {
        let backend = Arc::new(MockBackend::scoring(0.42));
        let client = PredictionClient::new(backend.clone(), fast_policy());

        let outcome = client.predict(&vector()).await.unwrap();
        match outcome {
            PredictOutcome::Scored(r) => assert_eq!(r.probability, 0.42),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(backend.calls(), 1);
        assert_eq!(backend.last_request().unwrap().feature_names.len(), 18);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predict_retries_transient_then_succeeds() {
        let backend = Arc::new(MockBackend::failing_first(vec![unavailable(), unavailable()], 0.3));
        let client = PredictionClient::new(backend.clone(), fast_policy());

        let outcome = client.predict(&vector()).await.unwrap();
        assert!(matches!(outcome, PredictOutcome::Scored(ref r) if r.probability == 0.3));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predict_exhaustion_is_degraded_not_fabricated() {
        let backend = Arc::new(MockBackend::down());
        let client = PredictionClient::new(backend.clone(), fast_policy());

        let outcome = client.predict(&vector()).await.unwrap();
        match outcome {
            PredictOutcome::Degraded { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("503"));
            }
            other => panic!("expected degraded, got {other:?}"),
        }
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predict_timeout_is_retried_then_degraded() {
        let backend = Arc::new(MockBackend::scoring(0.9).with_delay(Duration::from_secs(60)));
        let client = PredictionClient::new(backend.clone(), fast_policy());

        let outcome = client.predict(&vector()).await.unwrap();
        match outcome {
            PredictOutcome::Degraded { message, .. } => assert!(message.contains("did not answer")),
            other => panic!("expected degraded, got {other:?}"),
        }
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shape_mismatch_is_fatal_and_not_retried() {
        let backend = Arc::new(MockBackend::expecting(13));
        let client = PredictionClient::new(backend.clone(), fast_policy());

        let err = client.predict(&vector()).await.unwrap_err();
        match err {
            AppError::Configuration(msg) => {
                assert!(msg.contains("expects 13"), "{msg}");
                assert!(msg.contains("declares 18"), "{msg}");
            }
            other => panic!("expected configuration error, got {other:?}"),
        }
        assert_eq!(backend.calls(), 1);
        // Sent as built: nothing truncated to fit.
        assert_eq!(backend.last_request().unwrap().feature_values.len(), 18);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_not_found_is_configuration_error() {
        let backend = Arc::new(MockBackend::failing_first(
            vec![ScorerError::ModelNotFound("candidate-strength-v2".into())],
            0.5,
        ));
        let client = PredictionClient::new(backend, fast_policy());
        let err = client.predict(&vector()).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_is_external_error() {
        let backend = Arc::new(MockBackend::failing_first(
            vec![ScorerError::Rejected {
                status: 400,
                message: "bad payload".into(),
            }],
            0.5,
        ));
        let client = PredictionClient::new(backend.clone(), fast_policy());
        let err = client.predict(&vector()).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalService(ref m) if m.contains("bad payload")));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_contributions_sorted_by_absolute_impact() {
        let backend = Arc::new(MockBackend::scoring(0.5).with_contributions(vec![
            ("skill_count", 0.1),
            ("cgpa", -0.4),
            ("project_count", 0.2),
        ]));
        let client = PredictionClient::new(backend, fast_policy());
        let PredictOutcome::Scored(r) = client.predict(&vector()).await.unwrap() else {
            panic!("expected a score");
        };
        let order: Vec<&str> = r.contributions.iter().map(|c| c.feature.as_str()).collect();
        assert_eq!(order, vec!["cgpa", "project_count", "skill_count"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_contribution_for_unsent_feature_is_drift() {
        let backend =
            Arc::new(MockBackend::scoring(0.5).with_contributions(vec![("Gender_Male", 0.1)]));
        let client = PredictionClient::new(backend, fast_policy());
        let err = client.predict(&vector()).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(ref m) if m.contains("Gender_Male")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_schema_matching_shape() {
        let schema = candidate_strength_schema();
        let backend = Arc::new(MockBackend::expecting(18));
        let client = PredictionClient::new(backend, fast_policy());
        assert_eq!(client.verify_schema(&schema).await.unwrap(), ShapeCheck::Verified);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_schema_count_disagreement() {
        let schema = candidate_strength_schema();
        let backend = Arc::new(MockBackend::expecting(13));
        let client = PredictionClient::new(backend, fast_policy());
        let err = client.verify_schema(&schema).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(ref m) if m.contains("reports 13")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_schema_name_disagreement() {
        let schema = candidate_strength_schema();
        let mut names = schema.slot_names();
        names.swap(0, 1);
        let backend = Arc::new(MockBackend::expecting(18).with_reported_names(names));
        let client = PredictionClient::new(backend, fast_policy());
        let err = client.verify_schema(&schema).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(ref m) if m.contains("slot names differ")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_schema_unreachable_is_deferred() {
        let schema = candidate_strength_schema();
        let client = PredictionClient::new(Arc::new(MockBackend::down()), fast_policy());
        let check = client.verify_schema(&schema).await.unwrap();
        assert!(matches!(check, ShapeCheck::Unreachable(_)));
    }
}
