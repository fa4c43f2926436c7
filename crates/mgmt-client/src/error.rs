//! Error types for the bridge transport

use mgmt_core::MgmtError;
use thiserror::Error;

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Failures below the wire protocol.
///
/// Every variant reaches connection callers as [`MgmtError::Transport`];
/// none of them is ever reported as a protocol error.
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP request failed (refused, timed out, reset)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The bridge endpoint answered with a non-success HTTP status
    #[error("Bridge returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Body could not be decoded as wire responses
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// A batch came back with a different number of responses
    #[error("Sent {sent} requests but received {received} responses")]
    BatchMismatch { sent: usize, received: usize },
}

impl From<TransportError> for MgmtError {
    fn from(err: TransportError) -> Self {
        MgmtError::Transport(err.to_string())
    }
}
