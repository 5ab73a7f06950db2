//! Error types for deckhand-jenkins

use thiserror::Error;

/// Errors that can occur while talking to the Jenkins remote API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CiError {
    /// Jenkins answered the trigger request with something other than 201
    #[error("job {job} was not accepted (HTTP {status}): {body}")]
    SubmissionRejected {
        job: String,
        status: u16,
        body: String,
    },

    /// Trigger accepted but no queue item location came back
    #[error("job {job} was accepted but Jenkins returned no queue location")]
    MissingLocation { job: String },

    /// Queue item exists but no executor has been assigned yet
    #[error("queue item {path} has no build number yet")]
    NotYetAvailable { path: String },

    /// Non-success HTTP status on a read endpoint
    #[error("GET {url} returned HTTP {status}")]
    UnexpectedStatus { url: String, status: u16 },

    /// Transport-level failure (connect, timeout, TLS, body read)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Response body did not match the expected JSON shape
    #[error("JSON decoding error: {0}")]
    Decode(String),

    /// Base URL or job name could not form a valid request URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Required configuration is missing
    #[error("configuration error: {0}")]
    Config(String),
}

impl CiError {
    /// Whether the condition is expected to clear up by itself on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, CiError::NotYetAvailable { .. })
    }
}

impl From<reqwest::Error> for CiError {
    fn from(err: reqwest::Error) -> Self {
        CiError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for CiError {
    fn from(err: serde_json::Error) -> Self {
        CiError::Decode(err.to_string())
    }
}

/// Result type for Jenkins client operations
pub type CiResult<T> = std::result::Result<T, CiError>;
