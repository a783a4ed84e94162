//! Engine configuration.
//!
//! Configuration is resolved once at process startup and passed into the
//! engine. Nothing below the host surfaces reads environment variables.

use std::time::Duration as StdDuration;

use thiserror::Error;

use crate::engine::{ClassifierConfig, ModifierConfig, RemoteConfig, DEFAULT_CACHE_TTL_DAYS};

/// Default number of semantic alternatives attached to a bundle.
pub const DEFAULT_SEMANTIC_ALTERNATIVES: usize = 3;

/// Environment variable naming the SQLite database file.
pub const DB_PATH_VAR: &str = "RAMQ_DB_PATH";
/// Environment variable holding the remote provider API key.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
/// Environment variable naming the remote model.
pub const REMOTE_MODEL_VAR: &str = "RAMQ_REMOTE_MODEL";
/// Environment variable with the daily remote budget in USD.
pub const DAILY_BUDGET_VAR: &str = "DAILY_API_BUDGET";
/// Environment variable with the remote timeout in seconds.
pub const REMOTE_TIMEOUT_VAR: &str = "RAMQ_REMOTE_TIMEOUT_SECS";

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{var} must be a number, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must be positive, got '{value}'")]
    NotPositive { var: &'static str, value: String },

    #[error("{var} must be finite, got '{value}'")]
    NotFinite { var: &'static str, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Everything the suggestion engine needs besides its storage.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    pub modifiers: ModifierConfig,
    /// Lifetime of cached bundles
    pub cache_ttl: chrono::Duration,
    /// Semantic matches kept on each bundle
    pub semantic_alternatives: usize,
    /// Build the lexical semantic index when no other embedder is supplied
    pub semantic_enabled: bool,
    pub remote: RemoteConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            modifiers: ModifierConfig::default(),
            cache_ttl: chrono::Duration::days(DEFAULT_CACHE_TTL_DAYS),
            semantic_alternatives: DEFAULT_SEMANTIC_ALTERNATIVES,
            semantic_enabled: true,
            remote: RemoteConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults with remote limits parsed from optional string values.
    ///
    /// Blank or missing values keep the defaults.
    pub fn from_env_values(
        daily_budget: Option<String>,
        timeout_secs: Option<String>,
    ) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(budget) = parse_positive::<f64>(DAILY_BUDGET_VAR, daily_budget)? {
            if !budget.is_finite() {
                return Err(ConfigError::NotFinite {
                    var: DAILY_BUDGET_VAR,
                    value: budget.to_string(),
                });
            }
            config.remote.daily_budget_usd = budget;
        }
        if let Some(secs) = parse_positive::<u64>(REMOTE_TIMEOUT_VAR, timeout_secs)? {
            config.remote.timeout = StdDuration::from_secs(secs);
        }

        Ok(config)
    }

    /// Read the remote limits from the process environment.
    ///
    /// Call once at startup, after loading any `.env` file.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_env_values(
            std::env::var(DAILY_BUDGET_VAR).ok(),
            std::env::var(REMOTE_TIMEOUT_VAR).ok(),
        )
    }
}

fn parse_positive<T>(var: &'static str, value: Option<String>) -> ConfigResult<Option<T>>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Some(raw) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let parsed: T = raw.parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: raw.clone(),
    })?;
    // NaN compares as None
    if parsed.partial_cmp(&T::default()) != Some(std::cmp::Ordering::Greater) {
        return Err(ConfigError::NotPositive { var, value: raw });
    }
    Ok(Some(parsed))
}
