//! Score Interpreter: turns a scorer outcome into a caller-visible `PredictionResult`.

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::features::builder::BuiltVector;
use crate::models::prediction::{DegradationReason, PredictionResult, ScoreLabel};
use crate::scorer_client::PredictOutcome;
use crate::scoring::job_match::JobScore;

/// Raw probabilities this close outside [0, 1] are float noise, clamped silently.
pub const NOISE_TOLERANCE: f64 = 1e-6;

/// Confidence bands over the shortlist probability.
pub const LABEL_BANDS: &[(f64, ScoreLabel)] = &[(0.65, ScoreLabel::High), (0.40, ScoreLabel::Medium)];

/// Everything the interpreter needs about how the vector was built.
#[derive(Debug, Clone)]
pub struct ScoringContext {
    pub candidate_id: Option<String>,
    pub model_version: String,
    pub features_used: Vec<String>,
    pub defaulted: Vec<String>,
    /// Subset of `defaulted` whose slots are marked required.
    pub required_defaulted: Vec<String>,
    pub job: Option<JobScore>,
}

impl ScoringContext {
    pub fn new(candidate_id: Option<String>, built: &BuiltVector) -> Self {
        Self {
            candidate_id,
            model_version: built.vector.schema_version.clone(),
            features_used: built.vector.names.clone(),
            defaulted: built.defaulted_names(),
            required_defaulted: built.required_defaulted(),
            job: None,
        }
    }

    pub fn with_job(mut self, job: Option<JobScore>) -> Self {
        self.job = job;
        self
    }
}

pub fn label_for(probability: f64) -> ScoreLabel {
    LABEL_BANDS
        .iter()
        .find(|(floor, _)| probability >= *floor)
        .map(|(_, label)| *label)
        .unwrap_or(ScoreLabel::Low)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInterpreter;

impl ScoreInterpreter {
    /// A non-finite probability is an error, never a score. Out-of-range
    /// values are clamped and flagged.
    pub fn interpret(
        &self,
        outcome: PredictOutcome,
        context: ScoringContext,
    ) -> Result<PredictionResult, AppError> {
        let mut reasons = Vec::new();

        if !context.required_defaulted.is_empty() {
            reasons.push(DegradationReason::RequiredSlotsDefaulted {
                slots: context.required_defaulted,
            });
        }

        let (probability, clamped, contributions) = match outcome {
            PredictOutcome::Scored(response) => {
                let raw = response.probability;
                if !raw.is_finite() {
                    return Err(AppError::ExternalService(format!(
                        "scorer returned a non-finite probability ({raw}) for model '{}'",
                        context.model_version
                    )));
                }

                let probability = raw.clamp(0.0, 1.0);
                let noise = (-NOISE_TOLERANCE..=1.0 + NOISE_TOLERANCE).contains(&raw);
                let clamped = probability != raw && !noise;
                if clamped {
                    warn!(
                        "Scorer returned {raw} for model {}, clamped to {probability}",
                        context.model_version
                    );
                    reasons.push(DegradationReason::ScoreClamped { raw });
                }
                (Some(probability), clamped, response.contributions)
            }
            PredictOutcome::Degraded { attempts, message } => {
                reasons.push(DegradationReason::ScorerUnavailable { attempts, message });
                (None, false, Vec::new())
            }
        };

        Ok(PredictionResult {
            request_id: Uuid::new_v4(),
            candidate_id: context.candidate_id,
            probability,
            label: probability.map(label_for),
            model_version: context.model_version,
            degraded: !reasons.is_empty(),
            degradation_reasons: reasons,
            clamped,
            features_used: context.features_used,
            defaulted_features: context.defaulted,
            contributions,
            job_match: context.job.map(|job| job.into_job_match(probability)),
            scored_at: Utc::now(),
        })
    }
}
