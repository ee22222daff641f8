// Humanizer Errors
// Failures surfaced by the orchestration engine and its collaborators

use crate::models::TextFingerprint;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum HumanizeError {
    #[error("Invalid input: {0}")]
    InputError(String),
    #[error("Generation failed: {message}")]
    GenerationFailure {
        message: String,
        /// Last fingerprint computed before the failure, for diagnostics
        last_fingerprint: Option<Arc<TextFingerprint>>,
    },
    #[error("Request cancelled")]
    Cancelled,
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HumanizeError {
    pub fn generation(message: impl Into<String>) -> Self {
        HumanizeError::GenerationFailure {
            message: message.into(),
            last_fingerprint: None,
        }
    }

    /// Attach a diagnostic fingerprint to a generation failure; other variants pass through
    pub fn with_fingerprint(self, fingerprint: Arc<TextFingerprint>) -> Self {
        match self {
            HumanizeError::GenerationFailure { message, last_fingerprint } => {
                HumanizeError::GenerationFailure {
                    message,
                    last_fingerprint: last_fingerprint.or(Some(fingerprint)),
                }
            }
            other => other,
        }
    }
}

/// One back end's failure for one call. Recovered by the pipeline unless every back end fails.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("returned no usable output")]
    EmptyOutput,
    #[error("malformed output: {0}")]
    Malformed(String),
    #[error("provider failure: {0}")]
    Provider(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("text could not be scored: {0}")]
    Unscorable(String),
}
