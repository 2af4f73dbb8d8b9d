use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::AppError;

/// Candidate profile as supplied by the upstream profile service.
///
/// Every section is optional: the pipeline only reads it, and an absent
/// section is a missing signal, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateProfile {
    #[serde(default)]
    pub candidate_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub skills: Vec<Skill>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub education: Vec<EducationEntry>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub projects: Vec<ProjectEntry>,
    #[serde(default)]
    pub aggregate: Option<AggregateScores>,
    /// Skills embedding from the upstream profile service, compared against a job embedding.
    #[serde(default)]
    pub skills_embedding: Option<Vec<f64>>,
}

impl CandidateProfile {
    /// Reads a profile from raw JSON.
    ///
    /// Fails with `DataError` when the payload is not an object or a present
    /// field has the wrong shape. Missing fields are fine.
    pub fn from_value(value: Value) -> Result<Self, AppError> {
        if !value.is_object() {
            return Err(AppError::Data(format!(
                "profile must be a JSON object, got {}",
                json_kind(&value)
            )));
        }
        serde_json::from_value(value).map_err(|e| AppError::Data(format!("invalid profile: {e}")))
    }
}

/// Upstream sends `null` for sections it never filled; read those as empty.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProficiencyTier {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub proficiency: Option<ProficiencyTier>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EducationEntry {
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    /// Ordinal level: 0 none, 1 school/diploma, 2 bachelor, 3 master, 4 doctorate.
    #[serde(default)]
    pub level: Option<u8>,
    /// CGPA-like score, on `scale` when given.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub scale: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoleCategory {
    Internship,
    FullTime,
    PartTime,
    Contract,
    Freelance,
    Research,
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperienceEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration_months: Option<u32>,
    #[serde(default)]
    pub role_category: Option<RoleCategory>,
    /// Upstream relevance judgement; inferred from the role category when absent.
    #[serde(default)]
    pub relevant: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub complexity: Option<ComplexityTier>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateScores {
    #[serde(default)]
    pub overall_strength: Option<f64>,
    #[serde(default)]
    pub resume_completeness: Option<f64>,
}
