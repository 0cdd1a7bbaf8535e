//! Error types for the tracker SDK

use std::time::Duration;
use thiserror::Error;

/// Main error type for tracker and stream operations
#[derive(Error, Debug)]
pub enum BybitError {
    // === Connection Errors ===
    /// Failed to establish WebSocket connection
    #[error("Failed to connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Connection attempt timed out
    #[error("Connection timeout after {timeout:?} to {url}")]
    ConnectionTimeout { url: String, timeout: Duration },

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    // === Protocol Errors ===
    /// Failed to parse a JSON message
    #[error("Invalid JSON: {message}")]
    InvalidJson {
        message: String,
        raw: Option<String>,
    },

    /// Subscription was rejected by the server
    #[error("Subscription rejected for {topic}: {reason}")]
    SubscriptionRejected { topic: String, reason: String },

    // === Tracker Errors ===
    /// REST snapshot could not be loaded after the configured retries
    #[error("Snapshot unavailable for {resource} after {attempts} attempts: {reason}")]
    SnapshotUnavailable {
        resource: String,
        attempts: u32,
        reason: String,
    },

    /// Requested resource is not supported by the underlying category
    #[error("Unsupported resource: {detail}")]
    UnsupportedResource { detail: String },

    /// Tracker reached the terminal faulted state
    #[error("Tracker faulted: {reason}")]
    Faulted { reason: String },

    /// Tracker was disposed
    #[error("Tracker disposed")]
    Disposed,

    // === Internal Errors ===
    /// Internal channel was closed unexpectedly
    #[error("Internal channel closed unexpectedly")]
    ChannelClosed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BybitError {
    /// Returns true if this error is potentially recoverable via retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::ConnectionTimeout { .. } | Self::WebSocket(_)
        )
    }
}

/// Convenience result alias
pub type BybitResult<T> = Result<T, BybitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BybitError::WebSocket("reset".into()).is_retryable());
        assert!(!BybitError::UnsupportedResource {
            detail: "spot positions".into()
        }
        .is_retryable());
        assert!(!BybitError::Disposed.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = BybitError::SnapshotUnavailable {
            resource: "kline(BTCUSDT, linear, 5)".into(),
            attempts: 3,
            reason: "timeout".into(),
        };
        let text = err.to_string();
        assert!(text.contains("3 attempts"));
        assert!(text.contains("timeout"));
    }
}
