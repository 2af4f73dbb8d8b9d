use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::scorer_client::RetryPolicy;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub scorer_url: String,
    /// Schema used when a request names no model version.
    pub model_version: String,
    pub schema_dir: PathBuf,
    pub scorer_timeout: Duration,
    pub scorer_max_attempts: u32,
    pub scorer_backoff: Duration,
    pub scorer_max_backoff: Duration,
    pub batch_concurrency: usize,
    pub verify_schemas_on_startup: bool,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let config = Config {
            scorer_url: require_env("SCORER_URL")?,
            model_version: require_env("MODEL_VERSION")?,
            schema_dir: PathBuf::from(
                std::env::var("SCHEMA_DIR").unwrap_or_else(|_| "schemas".to_string()),
            ),
            scorer_timeout: Duration::from_millis(parse_env("SCORER_TIMEOUT_MS", 5000)?),
            scorer_max_attempts: parse_env("SCORER_MAX_ATTEMPTS", 3)?,
            scorer_backoff: Duration::from_millis(parse_env("SCORER_BACKOFF_MS", 250)?),
            scorer_max_backoff: Duration::from_millis(parse_env("SCORER_MAX_BACKOFF_MS", 2000)?),
            batch_concurrency: parse_env("BATCH_CONCURRENCY", 8)?,
            verify_schemas_on_startup: parse_env("VERIFY_SCHEMAS_ON_STARTUP", true)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.batch_concurrency == 0 {
            bail!("BATCH_CONCURRENCY must be at least 1");
        }
        if self.scorer_max_attempts == 0 {
            bail!("SCORER_MAX_ATTEMPTS must be at least 1");
        }
        if self.scorer_timeout.is_zero() {
            bail!("SCORER_TIMEOUT_MS must be greater than 0");
        }
        if self.scorer_backoff > self.scorer_max_backoff {
            bail!("SCORER_BACKOFF_MS must not exceed SCORER_MAX_BACKOFF_MS");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.scorer_max_attempts,
            timeout: self.scorer_timeout,
            base_backoff: self.scorer_backoff,
            max_backoff: self.scorer_max_backoff,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} has an invalid value '{raw}'"))
}
