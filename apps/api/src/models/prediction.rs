use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse band over the shortlist probability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreLabel {
    High,
    Medium,
    Low,
}

/// Why a result is flagged `degraded`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradationReason {
    /// Required slots had no signal and were filled from the default table.
    RequiredSlotsDefaulted { slots: Vec<String> },
    /// The scorer stayed unreachable after every retry. No probability was produced.
    ScorerUnavailable { attempts: u32, message: String },
    /// The scorer returned a probability outside [0, 1].
    ScoreClamped { raw: f64 },
}

/// Per-feature impact as reported by the scorer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureContribution {
    pub feature: String,
    pub impact: f64,
}

/// How well the candidate fits a specific job, reported next to the raw probability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Cosine similarity of skills and job embeddings, clamped to [0, 1].
    pub job_match_score: f64,
    /// True when the candidate had no embedding and the neutral score was used.
    pub neutral: bool,
    /// `probability × job_match_score`; absent when there is no probability.
    pub shortlist_probability: Option<f64>,
}

/// Final, caller-visible outcome of scoring one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub request_id: Uuid,
    pub candidate_id: Option<String>,
    /// `None` only when the scorer could not be reached.
    pub probability: Option<f64>,
    pub label: Option<ScoreLabel>,
    pub model_version: String,
    pub degraded: bool,
    pub degradation_reasons: Vec<DegradationReason>,
    pub clamped: bool,
    /// Slot names in the exact order they were sent.
    pub features_used: Vec<String>,
    pub defaulted_features: Vec<String>,
    pub contributions: Vec<FeatureContribution>,
    /// Present only when the request carried a job embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_match: Option<JobMatch>,
    pub scored_at: DateTime<Utc>,
}
