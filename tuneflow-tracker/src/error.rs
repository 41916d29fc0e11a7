//! Error types for tuneflow-tracker
//!
//! The two I/O seams get their own enums so callers can tell a transient
//! poll failure (leave state alone, retry next tick) from a delivery failure
//! (event already derived, surface and move on).

use std::time::Duration;
use thiserror::Error;

/// Main error type for the tracker crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be turned into runtime components
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream poll failed
    #[error(transparent)]
    Poll(#[from] PollError),

    /// Event delivery failed
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// tuneflow-common error
    #[error("Common error: {0}")]
    Common(#[from] tuneflow_common::Error),
}

/// Convenience Result type using the tracker Error
pub type Result<T> = std::result::Result<T, Error>;

/// Upstream "now playing" poll failure
///
/// Every variant means "no new information": the poller must not transition
/// session state on any of them.
#[derive(Error, Debug)]
pub enum PollError {
    /// Request never produced a response (DNS, connect, timeout)
    #[error("Upstream transport error: {0}")]
    Transport(String),

    /// Upstream asked us to slow down
    #[error("Upstream rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Token rejected (expired or lacking scope)
    #[error("Upstream rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    /// Any other non-success status
    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Identity lookup returned a body without a usable user id
    #[error("Upstream response missing field: {0}")]
    MissingField(String),
}

impl PollError {
    /// Minimum wait before the next poll, if the upstream specified one
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PollError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Event delivery failure
#[derive(Error, Debug)]
pub enum PublishError {
    /// Request never produced a response
    #[error("Publish transport error: {0}")]
    Transport(String),

    /// Ingestion endpoint returned a non-success status
    #[error("Ingestion endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The record was rejected by the transport
    #[error("Record rejected: {0}")]
    Rejected(String),

    /// Local sink I/O failure
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Event could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PublishError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            PublishError::Transport(_) => true,
            PublishError::Status { status, .. } => *status == 429 || *status >= 500,
            PublishError::Rejected(_) => true,
            PublishError::Io(_) | PublishError::Serialization(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_only_for_rate_limit() {
        let limited = PollError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(PollError::Transport("reset".into()).retry_after(), None);
    }

    #[test]
    fn test_publish_retryability() {
        let server = PublishError::Status { status: 503, body: String::new() };
        let throttled = PublishError::Status { status: 429, body: String::new() };
        let bad_request = PublishError::Status { status: 400, body: String::new() };
        assert!(server.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(PublishError::Transport("timeout".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::from(PollError::Unauthorized { status: 401 });
        assert_eq!(err.to_string(), "Upstream rejected credentials (HTTP 401)");
    }
}
