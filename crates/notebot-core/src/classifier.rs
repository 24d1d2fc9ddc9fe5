//! Note classification seam.

use std::collections::BTreeSet;

use async_trait::async_trait;
use notebot_models::ClassificationResult;
use thiserror::Error;

/// Assigns a category to a note.
///
/// Implementations never fail: when the primary source is unavailable they
/// degrade to a deterministic answer and tag it through
/// [`ClassificationResult::source`].
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classifies `text`, biased towards the categories in `existing`.
    async fn classify(&self, text: &str, existing: &BTreeSet<String>) -> ClassificationResult;
}

/// Reasons a model classification attempt failed. Recovered locally by the
/// fallback rules and only ever logged.
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// HTTP client could not be built.
    #[error("failed to build classifier client: {0}")]
    Setup(String),

    /// Transport failure or timeout.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status.
    #[error("endpoint returned status {0}")]
    Status(reqwest::StatusCode),

    /// Response body is not the expected JSON.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Response parsed but carries unusable values.
    #[error("invalid classification: {0}")]
    InvalidResponse(String),
}
