use std::str::FromStr;
use std::time::Duration;

use scout_core::AppError;
use scout_core::throttle::ThrottleConfig;
use scout_core::workflow::WorkflowConfig;

use crate::llm::DEFAULT_BASE_URL;

pub const DEFAULT_FILTER_MODEL: &str = "gpt-5-mini";
pub const DEFAULT_VALIDATION_MODEL: &str = "gpt-5.1";
pub const DEFAULT_SEARCH_MODEL: &str = "gpt-5-mini";

/// Credentials, model choices and run limits for a live orchestrator.
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: String,
    pub serpapi_key: String,
    pub base_url: String,
    pub filter_model: String,
    pub validation_model: String,
    pub search_model: String,
    pub max_retries: u32,
    pub step_ceiling: u32,
    pub call_timeout: Duration,
    pub throttle_delay: Duration,
}

impl Settings {
    /// Read settings from environment variables.
    ///
    /// - `OPENAI_API_KEY`, `SERPAPI_KEY` (required)
    /// - `SCOUT_BASE_URL` (defaults to the OpenAI API)
    /// - `SCOUT_FILTER_MODEL`, `SCOUT_VALIDATION_MODEL`, `SCOUT_SEARCH_MODEL`
    /// - `SCOUT_MAX_RETRIES` (3), `SCOUT_STEP_CEILING` (100),
    ///   `SCOUT_CALL_TIMEOUT_SECS` (90), `SCOUT_THROTTLE_MS` (1000)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::ConfigError(format!("{key} not set")))
        };
        let text = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let defaults = WorkflowConfig::default();

        let max_retries = parse_number(&lookup, "SCOUT_MAX_RETRIES", defaults.max_retries)?;
        let step_ceiling = parse_number(&lookup, "SCOUT_STEP_CEILING", defaults.step_ceiling)?;
        if step_ceiling == 0 {
            return Err(AppError::ConfigError(
                "SCOUT_STEP_CEILING must be at least 1".into(),
            ));
        }
        let timeout_secs = parse_number(
            &lookup,
            "SCOUT_CALL_TIMEOUT_SECS",
            defaults.call_timeout.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(AppError::ConfigError(
                "SCOUT_CALL_TIMEOUT_SECS must be at least 1".into(),
            ));
        }
        let throttle_ms = parse_number(&lookup, "SCOUT_THROTTLE_MS", 1000u64)?;

        Ok(Self {
            openai_api_key: required("OPENAI_API_KEY")?,
            serpapi_key: required("SERPAPI_KEY")?,
            base_url: text("SCOUT_BASE_URL", DEFAULT_BASE_URL),
            filter_model: text("SCOUT_FILTER_MODEL", DEFAULT_FILTER_MODEL),
            validation_model: text("SCOUT_VALIDATION_MODEL", DEFAULT_VALIDATION_MODEL),
            search_model: text("SCOUT_SEARCH_MODEL", DEFAULT_SEARCH_MODEL),
            max_retries,
            step_ceiling,
            call_timeout: Duration::from_secs(timeout_secs),
            throttle_delay: Duration::from_millis(throttle_ms),
        })
    }

    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig::default()
            .with_max_retries(self.max_retries)
            .with_step_ceiling(self.step_ceiling)
            .with_call_timeout(self.call_timeout)
    }

    /// Per-lane spacing with half the delay as jitter.
    pub fn throttle_config(&self) -> ThrottleConfig {
        ThrottleConfig::new(self.throttle_delay).with_jitter(self.throttle_delay / 2)
    }
}

fn parse_number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigError(format!(
                "Invalid {key} '{raw}': must be a non-negative integer"
            ))
        }),
    }
}
