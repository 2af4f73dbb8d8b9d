//! HTTP transport to the out-of-process scorer.
//!
//! `POST {base}/v1/predict` scores one vector; `GET {base}/v1/models/{version}`
//! reports the deployed model's input shape. Errors come back as
//! `{"error": {"kind", "message", "expected_features"?}}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ModelShape, ScoreRequest, ScoreResponse, ScorerError, ScoringBackend};

const PREDICT_PATH: &str = "/v1/predict";
const MODELS_PATH: &str = "/v1/models";

#[derive(Debug, Deserialize)]
struct ScorerErrorEnvelope {
    error: ScorerErrorBody,
}

#[derive(Debug, Deserialize)]
struct ScorerErrorBody {
    kind: ScorerErrorKind,
    #[serde(default)]
    message: String,
    #[serde(default)]
    expected_features: Option<usize>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
enum ScorerErrorKind {
    ShapeMismatch,
    ModelNotFound,
    InternalError,
    #[serde(other)]
    Unknown,
}

#[derive(Clone)]
pub struct HttpScoringBackend {
    client: Client,
    base_url: String,
}

impl HttpScoringBackend {
    /// `timeout` bounds each HTTP exchange; the client applies its own
    /// per-attempt deadline on top.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ScorerError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ScoringBackend for HttpScoringBackend {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreResponse, ScorerError> {
        let response = self
            .client
            .post(format!("{}{PREDICT_PATH}", self.base_url))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_error(
                status,
                &body,
                request.feature_values.len(),
                &request.model_version,
            ));
        }

        let parsed: ScoreResponse = serde_json::from_str(&body)?;
        debug!(
            "Scorer {} answered {} for model {}",
            self.base_url, parsed.probability, request.model_version
        );
        Ok(parsed)
    }

    async fn describe(&self, model_version: &str) -> Result<ModelShape, ScorerError> {
        let response = self
            .client
            .get(format!("{}{MODELS_PATH}/{model_version}", self.base_url))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status == StatusCode::NOT_FOUND {
            return Err(ScorerError::ModelNotFound(model_version.to_string()));
        }
        if !status.is_success() {
            return Err(classify_error(status, &body, 0, model_version));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Maps a non-success scorer reply onto a `ScorerError`.
fn classify_error(status: StatusCode, body: &str, sent: usize, model_version: &str) -> ScorerError {
    let envelope = serde_json::from_str::<ScorerErrorEnvelope>(body).ok();

    if let Some(ScorerErrorEnvelope { error }) = envelope {
        match error.kind {
            ScorerErrorKind::ShapeMismatch => {
                return ScorerError::ShapeMismatch {
                    expected: error.expected_features,
                    received: sent,
                    message: error.message,
                }
            }
            ScorerErrorKind::ModelNotFound => {
                return ScorerError::ModelNotFound(model_version.to_string())
            }
            ScorerErrorKind::InternalError => {
                warn!("Scorer internal error ({status}): {}", error.message);
                return ScorerError::Internal(error.message);
            }
            ScorerErrorKind::Unknown => {
                return split_by_status(status, error.message);
            }
        }
    }

    split_by_status(status, body.to_string())
}

fn split_by_status(status: StatusCode, message: String) -> ScorerError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        warn!("Scorer returned {status}: {message}");
        ScorerError::Unavailable {
            status: status.as_u16(),
            message,
        }
    } else {
        ScorerError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}
