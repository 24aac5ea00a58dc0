//! Cloud orchestration error types

use thiserror::Error;

/// Errors surfaced by providers, the state store and the orchestrators.
///
/// "Already exists" during `ensure` and "not found" during `teardown` are
/// never represented here: providers fold them into success.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Provider error on {resource}: {message}")]
    Provider { resource: String, message: String },

    #[error("State record is corrupt: {0}")]
    StateCorrupt(String),

    #[error("Timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: String, attempts: u32 },

    #[error("Step {step} requires attribute '{key}' which is not present in state")]
    MissingInput { step: String, key: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn provider(resource: impl Into<String>, message: impl Into<String>) -> Self {
        CloudError::Provider {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
