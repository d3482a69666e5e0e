//! Failure taxonomy for backend traffic and configuration.
//!
//! Every backend failure is recovered locally by the component that
//! issued the request: the poller degrades its connection state and the
//! chat session degrades to a single error bubble.

use serde::Serialize;

/// Coarse classification used for status text and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Request rejected, refused or timed out.
    Network,
    /// Non-2xx status or a body that is not the expected encoding.
    Protocol,
    /// Well-formed body missing expected fields or with the wrong structure.
    DataShape,
}

/// Errors returned by calls to the greenhouse backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("backend returned HTTP {status}")]
    Status { status: u16 },
    #[error("malformed response body: {0}")]
    Malformed(String),
    #[error("unexpected response shape: {0}")]
    DataShape(String),
}

impl BackendError {
    pub fn kind(&self) -> FailureKind {
        match self {
            BackendError::Network(_) => FailureKind::Network,
            BackendError::Status { .. } | BackendError::Malformed(_) => FailureKind::Protocol,
            BackendError::DataShape(_) => FailureKind::DataShape,
        }
    }

    pub fn shape<S: Into<String>>(msg: S) -> Self {
        BackendError::DataShape(msg.into())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return BackendError::Status { status: status.as_u16() };
        }
        if e.is_decode() {
            return BackendError::Malformed(e.to_string());
        }
        // timeouts, refused connections, DNS, builder errors
        BackendError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match e.classify() {
            // valid JSON, wrong structure
            Category::Data => BackendError::DataShape(e.to_string()),
            Category::Io | Category::Syntax | Category::Eof => {
                BackendError::Malformed(e.to_string())
            }
        }
    }
}

/// Invalid dashboard configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid backend base url '{url}': {reason}")]
    BaseUrl { url: String, reason: String },
    #[error("invalid listen address '{0}'")]
    ListenAddr(String),
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("batch limit {0} outside 1..=1000")]
    BatchLimit(usize),
}
