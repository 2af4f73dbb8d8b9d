//! Profile Feature Extractor: derives named numeric and categorical signals from a
//! `CandidateProfile`.
//!
//! A signal is emitted only when the profile section it comes from is present.
//! Absent signals are resolved later against `SIGNAL_DEFAULTS` (or a slot's own
//! constant) by the builder, which records every fallback.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use crate::errors::AppError;
use crate::models::profile::{
    CandidateProfile, ComplexityTier, EducationEntry, ExperienceEntry, ProficiencyTier,
    ProjectEntry, RoleCategory, Skill,
};

// ────────────────────────────────────────────────────────────────────────────
// Signal names
// ────────────────────────────────────────────────────────────────────────────

pub const SKILL_COUNT: &str = "skill_count";
pub const ADVANCED_SKILL_COUNT: &str = "advanced_skill_count";
pub const INTERMEDIATE_SKILL_COUNT: &str = "intermediate_skill_count";
pub const BEGINNER_SKILL_COUNT: &str = "beginner_skill_count";
pub const SKILL_DIVERSITY: &str = "skill_diversity";
pub const TOTAL_EXPERIENCE_MONTHS: &str = "total_experience_months";
pub const INTERNSHIP_COUNT: &str = "internship_count";
pub const JOB_COUNT: &str = "job_count";
pub const HAS_RELEVANT_EXPERIENCE: &str = "has_relevant_experience";
pub const AVG_EXPERIENCE_DURATION: &str = "avg_experience_duration";
pub const EDUCATION_LEVEL: &str = "education_level";
pub const HAS_QUALIFYING_EDUCATION: &str = "has_qualifying_education";
pub const CGPA: &str = "cgpa";
pub const PROJECT_COUNT: &str = "project_count";
pub const HIGH_COMPLEXITY_PROJECTS: &str = "high_complexity_projects";
pub const MEDIUM_COMPLEXITY_PROJECTS: &str = "medium_complexity_projects";
pub const PROJECT_COMPLEXITY_SCORE: &str = "project_complexity_score";
pub const OVERALL_STRENGTH_SCORE: &str = "overall_strength_score";
pub const RESUME_COMPLETENESS_SCORE: &str = "resume_completeness_score";
pub const DEGREE_TYPE: &str = "degree_type";
pub const FIELD_CATEGORY: &str = "field_category";

// ────────────────────────────────────────────────────────────────────────────
// Tables
// ────────────────────────────────────────────────────────────────────────────

/// Documented fallback for every numeric signal: 0 for counts and flags,
/// the neutral midpoint for ordinal and score-like fields.
pub const SIGNAL_DEFAULTS: &[(&str, f64)] = &[
    (SKILL_COUNT, 0.0),
    (ADVANCED_SKILL_COUNT, 0.0),
    (INTERMEDIATE_SKILL_COUNT, 0.0),
    (BEGINNER_SKILL_COUNT, 0.0),
    (SKILL_DIVERSITY, 0.0),
    (TOTAL_EXPERIENCE_MONTHS, 0.0),
    (INTERNSHIP_COUNT, 0.0),
    (JOB_COUNT, 0.0),
    (HAS_RELEVANT_EXPERIENCE, 0.0),
    (AVG_EXPERIENCE_DURATION, 0.0),
    (EDUCATION_LEVEL, 2.0),
    (HAS_QUALIFYING_EDUCATION, 0.0),
    (CGPA, 0.5),
    (PROJECT_COUNT, 0.0),
    (HIGH_COMPLEXITY_PROJECTS, 0.0),
    (MEDIUM_COMPLEXITY_PROJECTS, 0.0),
    (PROJECT_COMPLEXITY_SCORE, 0.0),
    (OVERALL_STRENGTH_SCORE, 0.5),
    (RESUME_COMPLETENESS_SCORE, 0.5),
];

/// Categorical signals. Their indicator slots default to 0.
pub const CATEGORICAL_SIGNALS: &[&str] = &[DEGREE_TYPE, FIELD_CATEGORY];

/// Skills at or above this tier count as advanced.
const ADVANCED_THRESHOLD: ProficiencyTier = ProficiencyTier::Advanced;

/// Bachelor's level and up qualifies.
const QUALIFYING_EDUCATION_LEVEL: u8 = 2;

const COMPLEXITY_WEIGHTS: &[(ComplexityTier, f64)] = &[
    (ComplexityTier::Low, 1.0 / 3.0),
    (ComplexityTier::Medium, 2.0 / 3.0),
    (ComplexityTier::High, 1.0),
];

/// (alias, canonical degree). Aliases are compared after squashing to lowercase
/// alphanumerics, so "B.Tech", "BTech" and "b tech" are the same key.
const DEGREE_ALIASES: &[(&str, &str)] = &[
    ("b.tech", "b.tech"),
    ("bachelor of technology", "b.tech"),
    ("b.e", "b.e"),
    ("bachelor of engineering", "b.e"),
    ("bca", "bca"),
    ("bachelor of computer applications", "bca"),
    ("b.sc", "b.sc"),
    ("bachelor of science", "b.sc"),
    ("b.com", "b.com"),
    ("bachelor of commerce", "b.com"),
    ("b.a", "ba"),
    ("bachelor of arts", "ba"),
    ("bachelor", "bachelor"),
    ("bachelors", "bachelor"),
    ("m.tech", "m.tech"),
    ("master of technology", "m.tech"),
    ("m.e", "m.e"),
    ("master of engineering", "m.e"),
    ("mca", "mca"),
    ("master of computer applications", "mca"),
    ("m.sc", "m.sc"),
    ("master of science", "m.sc"),
    ("mba", "mba"),
    ("master of business administration", "mba"),
    ("m.a", "ma"),
    ("master of arts", "ma"),
    ("master", "master"),
    ("masters", "master"),
    ("ph.d", "phd"),
    ("doctorate", "phd"),
    ("doctor of philosophy", "phd"),
    ("diploma", "diploma"),
    ("high school", "high school"),
    ("hsc", "high school"),
    ("12th", "high school"),
];

const DEGREE_LEVELS: &[(&str, u8)] = &[
    ("high school", 1),
    ("diploma", 1),
    ("b.tech", 2),
    ("b.e", 2),
    ("bca", 2),
    ("b.sc", 2),
    ("b.com", 2),
    ("ba", 2),
    ("bachelor", 2),
    ("m.tech", 3),
    ("m.e", 3),
    ("mca", 3),
    ("m.sc", 3),
    ("mba", 3),
    ("ma", 3),
    ("master", 3),
    ("phd", 4),
];

const FIELD_ALIASES: &[(&str, &str)] = &[
    ("computer science", "it"),
    ("computer science and engineering", "it"),
    ("cse", "it"),
    ("cs", "it"),
    ("computer engineering", "it"),
    ("software engineering", "it"),
    ("information technology", "it"),
    ("it", "it"),
    ("electronics and communication", "ece"),
    ("electronics and communication engineering", "ece"),
    ("ece", "ece"),
    ("electronics", "ece"),
    ("electrical and electronics", "eee"),
    ("electrical", "eee"),
    ("eee", "eee"),
    ("civil", "civil"),
    ("civil engineering", "civil"),
    ("mechanical", "me"),
    ("mechanical engineering", "me"),
    ("me", "me"),
];

/// Aliases shorter than this only match exactly, never as a prefix.
const MIN_PREFIX_ALIAS_LEN: usize = 3;

/// Table default for a numeric signal.
pub fn signal_default(name: &str) -> Option<f64> {
    SIGNAL_DEFAULTS
        .iter()
        .find(|(signal, _)| *signal == name)
        .map(|(_, value)| *value)
}

pub fn is_categorical_signal(name: &str) -> bool {
    CATEGORICAL_SIGNALS.contains(&name)
}

// ────────────────────────────────────────────────────────────────────────────
// Signals
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SignalValue {
    Numeric(f64),
    Categorical(String),
}

/// Name → value mapping produced by the extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Signals(BTreeMap<String, SignalValue>);

impl Signals {
    pub fn insert_numeric(&mut self, name: &str, value: f64) {
        self.0.insert(name.to_string(), SignalValue::Numeric(value));
    }

    pub fn insert_categorical(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .insert(name.to_string(), SignalValue::Categorical(value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&SignalValue> {
        self.0.get(name)
    }

    pub fn numeric(&self, name: &str) -> Option<f64> {
        match self.0.get(name) {
            Some(SignalValue::Numeric(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn categorical(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(SignalValue::Categorical(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Extractor
// ────────────────────────────────────────────────────────────────────────────

/// Pure function of the profile. No I/O, no clamping: out-of-range inputs are
/// passed through so the validator can reject them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileFeatureExtractor;

impl ProfileFeatureExtractor {
    /// Extracts signals from a raw JSON profile. `DataError` if it is not a profile.
    pub fn extract_value(&self, value: Value) -> Result<Signals, AppError> {
        let profile = CandidateProfile::from_value(value)?;
        Ok(self.extract(&profile))
    }

    pub fn extract(&self, profile: &CandidateProfile) -> Signals {
        let mut signals = Signals::default();

        if !profile.skills.is_empty() {
            extract_skills(&profile.skills, &mut signals);
        }
        if !profile.experience.is_empty() {
            extract_experience(&profile.experience, &mut signals);
        }
        if !profile.education.is_empty() {
            extract_education(&profile.education, &mut signals);
        }
        if !profile.projects.is_empty() {
            extract_projects(&profile.projects, &mut signals);
        }
        if let Some(aggregate) = &profile.aggregate {
            if let Some(strength) = aggregate.overall_strength {
                signals.insert_numeric(OVERALL_STRENGTH_SCORE, strength);
            }
            if let Some(completeness) = aggregate.resume_completeness {
                signals.insert_numeric(RESUME_COMPLETENESS_SCORE, completeness);
            }
        }

        signals
    }
}

fn extract_skills(skills: &[Skill], signals: &mut Signals) {
    let total = skills.len();
    let count_tier = |tier: ProficiencyTier| {
        skills
            .iter()
            .filter(|s| s.proficiency == Some(tier))
            .count() as f64
    };
    let advanced = skills
        .iter()
        .filter(|s| s.proficiency.is_some_and(|p| p >= ADVANCED_THRESHOLD))
        .count();

    // Skills without a category share the `None` bucket.
    let categories: BTreeSet<Option<String>> = skills
        .iter()
        .map(|s| {
            s.category
                .as_deref()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
        })
        .collect();

    signals.insert_numeric(SKILL_COUNT, total as f64);
    signals.insert_numeric(ADVANCED_SKILL_COUNT, advanced as f64);
    signals.insert_numeric(
        INTERMEDIATE_SKILL_COUNT,
        count_tier(ProficiencyTier::Intermediate),
    );
    signals.insert_numeric(BEGINNER_SKILL_COUNT, count_tier(ProficiencyTier::Beginner));
    signals.insert_numeric(SKILL_DIVERSITY, categories.len() as f64 / total as f64);
}

fn extract_experience(entries: &[ExperienceEntry], signals: &mut Signals) {
    let total_months: u64 = entries
        .iter()
        .map(|e| u64::from(e.duration_months.unwrap_or(0)))
        .sum();

    let internships = entries
        .iter()
        .filter(|e| e.role_category == Some(RoleCategory::Internship))
        .count();
    let jobs = entries.len() - internships;

    let has_relevant = entries.iter().any(|e| {
        let relevant = e
            .relevant
            .unwrap_or(e.role_category != Some(RoleCategory::Other));
        relevant && e.duration_months.is_some_and(|m| m > 0)
    });

    signals.insert_numeric(TOTAL_EXPERIENCE_MONTHS, total_months as f64);
    signals.insert_numeric(INTERNSHIP_COUNT, internships as f64);
    signals.insert_numeric(JOB_COUNT, jobs as f64);
    signals.insert_numeric(HAS_RELEVANT_EXPERIENCE, flag(has_relevant));

    let known: Vec<f64> = entries
        .iter()
        .filter_map(|e| e.duration_months.map(f64::from))
        .collect();
    if !known.is_empty() {
        signals.insert_numeric(
            AVG_EXPERIENCE_DURATION,
            known.iter().sum::<f64>() / known.len() as f64,
        );
    }
}

fn extract_education(entries: &[EducationEntry], signals: &mut Signals) {
    let mut highest: Option<(u8, &EducationEntry)> = None;
    for entry in entries {
        if let Some(level) = education_level(entry) {
            if highest.map_or(true, |(best, _)| level > best) {
                highest = Some((level, entry));
            }
        }
    }

    if let Some((level, _)) = highest {
        signals.insert_numeric(EDUCATION_LEVEL, f64::from(level));
        signals.insert_numeric(
            HAS_QUALIFYING_EDUCATION,
            flag(level >= QUALIFYING_EDUCATION_LEVEL),
        );
    }

    let cgpa = entries
        .iter()
        .filter_map(normalized_score)
        .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v))));
    if let Some(cgpa) = cgpa {
        signals.insert_numeric(CGPA, cgpa);
    }

    // Categorical signals come from the highest entry, else the first one.
    let source = highest.map(|(_, e)| e).unwrap_or(&entries[0]);
    if let Some(degree) = source.degree.as_deref().filter(|d| !d.trim().is_empty()) {
        signals.insert_categorical(DEGREE_TYPE, canonical_degree(degree));
    }
    if let Some(field) = source.field.as_deref().filter(|f| !f.trim().is_empty()) {
        signals.insert_categorical(FIELD_CATEGORY, canonical_field(field));
    }
}

fn extract_projects(projects: &[ProjectEntry], signals: &mut Signals) {
    let tier = |p: &ProjectEntry| p.complexity.unwrap_or_default();
    let high = projects
        .iter()
        .filter(|p| tier(p) == ComplexityTier::High)
        .count();
    let medium = projects
        .iter()
        .filter(|p| tier(p) == ComplexityTier::Medium)
        .count();
    let weight_sum: f64 = projects.iter().map(|p| complexity_weight(tier(p))).sum();

    signals.insert_numeric(PROJECT_COUNT, projects.len() as f64);
    signals.insert_numeric(HIGH_COMPLEXITY_PROJECTS, high as f64);
    signals.insert_numeric(MEDIUM_COMPLEXITY_PROJECTS, medium as f64);
    signals.insert_numeric(
        PROJECT_COMPLEXITY_SCORE,
        weight_sum / projects.len() as f64,
    );
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn complexity_weight(tier: ComplexityTier) -> f64 {
    COMPLEXITY_WEIGHTS
        .iter()
        .find(|(t, _)| *t == tier)
        .map(|(_, w)| *w)
        .unwrap_or(0.0)
}

/// Explicit level wins; otherwise inferred from the degree text.
fn education_level(entry: &EducationEntry) -> Option<u8> {
    entry.level.or_else(|| {
        let degree = canonical_degree(entry.degree.as_deref()?);
        DEGREE_LEVELS
            .iter()
            .find(|(d, _)| *d == degree)
            .map(|(_, level)| *level)
    })
}

/// Score mapped onto [0, 1]. With no explicit scale the scale is inferred
/// (≤1 as-is, ≤10 out of 10, otherwise out of 100). Not clamped.
fn normalized_score(entry: &EducationEntry) -> Option<f64> {
    let score = entry.score?;
    let scale = match entry.scale {
        Some(scale) if scale > 0.0 => scale,
        _ if score <= 1.0 => 1.0,
        _ if score <= 10.0 => 10.0,
        _ => 100.0,
    };
    Some(score / scale)
}

fn squash(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Exact alias match, else the longest alias that prefixes the text.
fn lookup_alias(text: &str, aliases: &[(&str, &'static str)]) -> Option<&'static str> {
    let key = squash(text);
    let mut best: Option<(usize, &'static str)> = None;
    for (alias, canonical) in aliases {
        let alias = squash(alias);
        let hit = key == alias || (alias.len() >= MIN_PREFIX_ALIAS_LEN && key.starts_with(&alias));
        if hit && best.map_or(true, |(len, _)| alias.len() > len) {
            best = Some((alias.len(), *canonical));
        }
    }
    best.map(|(_, canonical)| canonical)
}

/// Canonical degree name; unknown degrees pass through lowercased.
pub fn canonical_degree(degree: &str) -> String {
    lookup_alias(degree, DEGREE_ALIASES)
        .map(str::to_string)
        .unwrap_or_else(|| degree.trim().to_lowercase())
}

/// Canonical branch/field name; unknown fields pass through lowercased.
pub fn canonical_field(field: &str) -> String {
    lookup_alias(field, FIELD_ALIASES)
        .map(str::to_string)
        .unwrap_or_else(|| field.trim().to_lowercase())
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
