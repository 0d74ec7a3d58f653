use thiserror::Error;

use crate::models::Provider;

/// Application-wide error types for Scout.
#[derive(Error, Debug)]
pub enum AppError {
    /// The product input has no usable identifier.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Search provider failed in a way worth retrying (timeout, rate limit, 5xx).
    #[error("Transient error from {provider} provider: {message}")]
    TransientProvider { provider: Provider, message: String },

    /// Search provider rejected the request (bad query, auth failure).
    #[error("Fatal error from {provider} provider: {message}")]
    FatalProvider { provider: Provider, message: String },

    /// Language-model call failed or returned an unusable answer.
    #[error("Model error (HTTP {status_code}): {message}")]
    Model {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// Candidate page could not be fetched.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// A validation-phase call (fetch or judgment) exceeded its time budget.
    #[error("Validation timed out after {0} seconds")]
    ValidationTimeout(u64),

    /// The run hit its step ceiling or deadline and was aborted.
    #[error("Recursion limit exceeded after {steps} steps (ceiling {ceiling})")]
    RecursionLimitExceeded { steps: u32, ceiling: u32 },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// HTML-to-Markdown conversion failed.
    #[error("Cleaner error: {0}")]
    CleanerError(String),

    /// A structured response does not match its expected schema.
    #[error("Schema validation error: {0}")]
    SchemaValidationError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded
            | AppError::TransientProvider { .. }
            | AppError::ValidationTimeout(_) => true,
            AppError::Model { retryable, .. } => *retryable,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Fold any adapter error into the two-way provider classification.
    ///
    /// Errors that are already provider errors pass through unchanged.
    pub fn into_provider_error(self, provider: Provider) -> AppError {
        match self {
            AppError::TransientProvider { .. } | AppError::FatalProvider { .. } => self,
            other if other.is_retryable() => AppError::TransientProvider {
                provider,
                message: other.to_string(),
            },
            other => AppError::FatalProvider {
                provider,
                message: other.to_string(),
            },
        }
    }

    /// A model answered, but the answer is unusable.
    pub fn malformed_response(message: impl Into<String>) -> Self {
        AppError::Model {
            message: message.into(),
            status_code: 200,
            retryable: false,
        }
    }

    /// Returns true for errors that end a run abnormally.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            AppError::InvalidInput(_) | AppError::RecursionLimitExceeded { .. }
        )
    }
}
