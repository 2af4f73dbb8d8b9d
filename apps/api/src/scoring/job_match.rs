//! Job match: compares a candidate's skills embedding with a job embedding.
//!
//! The result sits beside the model probability, never in place of it.
//! `shortlist_probability` is the product of the two.

use crate::errors::AppError;
use crate::models::prediction::JobMatch;

/// Score used when the candidate has no embedding to compare.
pub const NEUTRAL_JOB_MATCH: f64 = 0.5;

/// A job to match candidates against.
#[derive(Debug, Clone, PartialEq)]
pub struct JobContext {
    pub job_id: Option<String>,
    pub embedding: Vec<f64>,
}

impl JobContext {
    /// Fails with `ValidationError` on an empty or non-finite embedding.
    pub fn new(job_id: Option<String>, embedding: Vec<f64>) -> Result<Self, AppError> {
        if embedding.is_empty() {
            return Err(AppError::Validation(
                "job_embedding must not be empty".to_string(),
            ));
        }
        if let Some(i) = embedding.iter().position(|v| !v.is_finite()) {
            return Err(AppError::Validation(format!(
                "job_embedding[{i}] is not a finite number"
            )));
        }
        Ok(Self { job_id, embedding })
    }

    /// Builds a context only when an embedding was supplied.
    pub fn from_request(
        job_id: Option<String>,
        embedding: Option<Vec<f64>>,
    ) -> Result<Option<Self>, AppError> {
        embedding.map(|e| Self::new(job_id, e)).transpose()
    }
}

/// Match of one candidate against one job, before the scorer is called.
#[derive(Debug, Clone, PartialEq)]
pub struct JobScore {
    pub job_id: Option<String>,
    pub score: f64,
    pub neutral: bool,
}

impl JobScore {
    /// Combines the match with the model probability.
    pub fn into_job_match(self, probability: Option<f64>) -> JobMatch {
        JobMatch {
            job_id: self.job_id,
            job_match_score: self.score,
            neutral: self.neutral,
            shortlist_probability: probability.map(|p| p * self.score),
        }
    }
}

/// Scores `candidate` against `job`.
///
/// A missing candidate embedding is neutral. One of the wrong length, or with
/// non-finite values, is a `DataError` for that candidate.
pub fn match_candidate(job: &JobContext, candidate: Option<&[f64]>) -> Result<JobScore, AppError> {
    let Some(candidate) = candidate.filter(|c| !c.is_empty()) else {
        return Ok(JobScore {
            job_id: job.job_id.clone(),
            score: NEUTRAL_JOB_MATCH,
            neutral: true,
        });
    };

    if candidate.len() != job.embedding.len() {
        return Err(AppError::Data(format!(
            "skills_embedding has {} dimensions, job embedding has {}",
            candidate.len(),
            job.embedding.len()
        )));
    }
    if let Some(i) = candidate.iter().position(|v| !v.is_finite()) {
        return Err(AppError::Data(format!(
            "skills_embedding[{i}] is not a finite number"
        )));
    }

    Ok(JobScore {
        job_id: job.job_id.clone(),
        score: cosine_similarity(candidate, &job.embedding),
        neutral: false,
    })
}

/// Cosine similarity clamped to [0, 1]. Zero-norm input scores 0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let norm = |v: &[f64]| v.iter().map(|x| x * x).sum::<f64>().sqrt();
    let (na, nb) = (norm(a), norm(b));
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    (dot / (na * nb)).clamp(0.0, 1.0)
}
