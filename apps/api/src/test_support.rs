//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::models::prediction::FeatureContribution;
use crate::models::profile::{
    AggregateScores, CandidateProfile, ComplexityTier, EducationEntry, ExperienceEntry,
    ProficiencyTier, ProjectEntry, RoleCategory, Skill,
};
use crate::schema::registry::{schema_from_manifest, ModelSchemaRegistry};
use crate::schema::{DefaultPolicy, FeatureSlot, ModelManifest, ModelSchema, SlotRange, SlotSource};
use crate::scorer_client::{
    ModelShape, PredictionClient, RetryPolicy, ScoreRequest, ScoreResponse, ScorerError,
    ScoringBackend,
};
use crate::scoring::pipeline::ScoringPipeline;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Profiles
// ────────────────────────────────────────────────────────────────────────────

pub fn empty_profile() -> CandidateProfile {
    CandidateProfile::default()
}

/// Complete profile: 26 skills, one internship, a B.Tech in Computer Science
/// at 0.7, three projects and an aggregate strength of 0.65.
pub fn scenario_a_profile() -> CandidateProfile {
    let categories = ["language", "framework", "database", "cloud"];
    let skills = (0..26)
        .map(|i| Skill {
            name: format!("skill-{i}"),
            category: Some(categories[i % categories.len()].to_string()),
            proficiency: Some(match i % 4 {
                0 => ProficiencyTier::Advanced,
                1 => ProficiencyTier::Intermediate,
                2 => ProficiencyTier::Beginner,
                _ => ProficiencyTier::Expert,
            }),
        })
        .collect();

    CandidateProfile {
        candidate_id: Some("cand-a".to_string()),
        skills,
        education: vec![EducationEntry {
            degree: Some("B.Tech".to_string()),
            institution: Some("State Institute of Technology".to_string()),
            field: Some("Computer Science".to_string()),
            level: Some(2),
            score: Some(0.7),
            scale: None,
        }],
        experience: vec![ExperienceEntry {
            title: Some("Backend Intern".to_string()),
            duration_months: Some(6),
            role_category: Some(RoleCategory::Internship),
            relevant: Some(true),
        }],
        projects: vec![
            ProjectEntry {
                name: Some("scheduler".to_string()),
                complexity: Some(ComplexityTier::High),
            },
            ProjectEntry {
                name: Some("chat".to_string()),
                complexity: Some(ComplexityTier::Medium),
            },
            ProjectEntry {
                name: Some("todo".to_string()),
                complexity: Some(ComplexityTier::Low),
            },
        ],
        aggregate: Some(AggregateScores {
            overall_strength: Some(0.65),
            resume_completeness: Some(0.8),
        }),
        skills_embedding: None,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Schemas
// ────────────────────────────────────────────────────────────────────────────

fn shipped(manifest: &str) -> ModelSchema {
    let manifest: ModelManifest = serde_json::from_str(manifest).unwrap();
    schema_from_manifest(manifest).unwrap()
}

pub fn candidate_strength_schema() -> ModelSchema {
    shipped(include_str!("../schemas/candidate-strength-v2.json"))
}

pub fn placement_schema() -> ModelSchema {
    shipped(include_str!("../schemas/placement-rf-v1.json"))
}

/// Older 13-slot candidate model.
pub fn strength_13_schema() -> ModelSchema {
    const DROPPED: &[&str] = &[
        "intermediate_skill_count",
        "beginner_skill_count",
        "avg_experience_duration",
        "medium_complexity_projects",
        "project_complexity_score",
    ];
    let base = candidate_strength_schema();
    ModelSchema {
        version: "candidate-strength-v1".to_string(),
        description: "13-feature candidate strength model".to_string(),
        slots: base
            .slots
            .into_iter()
            .filter(|s| !DROPPED.contains(&s.name.as_str()))
            .collect(),
    }
}

pub fn numeric_slot(name: &str, min: f64, max: f64, required: bool) -> FeatureSlot {
    FeatureSlot {
        name: name.to_string(),
        source: SlotSource::Signal {
            signal: name.to_string(),
            scale: 1.0,
        },
        range: SlotRange { min, max },
        default: DefaultPolicy::SignalTable,
        required,
    }
}

pub fn indicator_slot(name: &str, signal: &str, category: &str) -> FeatureSlot {
    FeatureSlot {
        name: name.to_string(),
        source: SlotSource::Indicator {
            signal: signal.to_string(),
            category: category.to_string(),
        },
        range: SlotRange { min: 0.0, max: 1.0 },
        default: DefaultPolicy::Constant { value: 0.0 },
        required: false,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scorer
// ────────────────────────────────────────────────────────────────────────────

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        timeout: Duration::from_millis(500),
        base_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
    }
}

pub fn unavailable() -> ScorerError {
    ScorerError::Unavailable {
        status: 503,
        message: "scorer warming up".to_string(),
    }
}

/// Scripted in-process scorer.
pub struct MockBackend {
    probability: f64,
    expected_features: Option<usize>,
    reported_names: Option<Vec<String>>,
    down: bool,
    delay: Option<Duration>,
    contributions: Vec<FeatureContribution>,
    script: Mutex<VecDeque<ScorerError>>,
    requests: Mutex<Vec<ScoreRequest>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockBackend {
    pub fn scoring(probability: f64) -> Self {
        Self {
            probability,
            expected_features: None,
            reported_names: None,
            down: false,
            delay: None,
            contributions: Vec::new(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Returns the scripted errors in order, then scores normally.
    pub fn failing_first(errors: Vec<ScorerError>, probability: f64) -> Self {
        let mock = Self::scoring(probability);
        *mock.script.lock().unwrap() = errors.into();
        mock
    }

    /// Unreachable for every call.
    pub fn down() -> Self {
        Self {
            down: true,
            ..Self::scoring(0.0)
        }
    }

    /// A deployed model with a fixed input width.
    pub fn expecting(n_features: usize) -> Self {
        Self {
            expected_features: Some(n_features),
            ..Self::scoring(0.5)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_contributions(mut self, contributions: Vec<(&str, f64)>) -> Self {
        self.contributions = contributions
            .into_iter()
            .map(|(feature, impact)| FeatureContribution {
                feature: feature.to_string(),
                impact,
            })
            .collect();
        self
    }

    pub fn with_reported_names(mut self, names: Vec<String>) -> Self {
        self.reported_names = Some(names);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ScoreRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScoringBackend for MockBackend {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreResponse, ScorerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.script.lock().unwrap().pop_front() {
            return Err(err);
        }
        if self.down {
            return Err(unavailable());
        }
        if let Some(expected) = self.expected_features {
            if request.feature_values.len() != expected {
                return Err(ScorerError::ShapeMismatch {
                    expected: Some(expected),
                    received: request.feature_values.len(),
                    message: format!(
                        "X has {} features, but the model is expecting {expected} features as input",
                        request.feature_values.len()
                    ),
                });
            }
        }

        Ok(ScoreResponse {
            probability: self.probability,
            model_type: Some("mock".to_string()),
            contributions: self.contributions.clone(),
        })
    }

    async fn describe(&self, model_version: &str) -> Result<ModelShape, ScorerError> {
        if self.down {
            return Err(unavailable());
        }
        Ok(ModelShape {
            model_version: model_version.to_string(),
            n_features_in: self.expected_features.unwrap_or(18),
            feature_names: self.reported_names.clone(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// App state
// ────────────────────────────────────────────────────────────────────────────

/// Both shipped schemas, `candidate-strength-v2` as the default.
pub fn test_state(backend: Arc<MockBackend>) -> AppState {
    let registry = Arc::new(
        ModelSchemaRegistry::from_schemas(
            vec![candidate_strength_schema(), placement_schema()],
            "candidate-strength-v2",
        )
        .unwrap(),
    );
    let client = PredictionClient::new(backend, fast_policy());
    AppState {
        registry: Arc::clone(&registry),
        pipeline: ScoringPipeline::new(registry, client, 4),
    }
}
