//! Error types for ripc-client.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all RIPC operations.
#[derive(Debug, Error)]
pub enum RipcError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (legacy codec only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CBOR serialization error.
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// Protocol error (malformed frame, short write, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The remote host did not resolve to any IPv4 address.
    #[error("No IPv4 address found for {0}")]
    AddressResolution(String),

    /// Send or stop issued before `start`.
    #[error("Transport not started")]
    NotStarted,

    /// `start` issued on a transport that is already running.
    #[error("Transport already started")]
    AlreadyStarted,

    /// Destination buffer cannot hold a header.
    #[error("Buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    /// Encoded frame does not fit in a single datagram.
    #[error("Datagram of {size} bytes exceeds maximum {max}")]
    OversizedDatagram { size: usize, max: usize },

    /// A correlation ID was handed out while still pending. Not retryable.
    #[error("Correlation ID {0} is already pending")]
    CorrelationCollision(u32),

    /// No response arrived before the deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The request was cancelled by its token or by client teardown.
    #[error("Request cancelled")]
    Cancelled,

    /// The client has been closed.
    #[error("Client closed")]
    Closed,

    /// The agent answered with `ok = false`.
    #[error("Agent rejected {}: {}", .action.as_deref().unwrap_or("request"), .err.as_deref().unwrap_or("no error message"))]
    Rejected {
        action: Option<String>,
        err: Option<String>,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RipcError {
    /// Whether the error is a timeout or a cancellation rather than a fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, RipcError::Timeout(_) | RipcError::Cancelled)
    }
}

/// Result type alias using RipcError.
pub type Result<T> = std::result::Result<T, RipcError>;
