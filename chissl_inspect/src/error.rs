//! Error taxonomy for the inspector core

use chissl_common::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the stream client, history loader and scheduler
#[derive(Debug, Error)]
pub enum InspectError {
    /// Live stream could not be opened or dropped unexpectedly
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request to the capture service failed before a response arrived
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Capture service answered with a non-success status
    #[error("Capture service returned HTTP {0}")]
    Status(u16),

    /// An event or body could not be decoded
    #[error("Parse error: {0}")]
    Parse(#[from] ProtocolError),

    /// A periodic refresh callback failed or panicked
    #[error("Refresh task '{key}' failed: {reason}")]
    SchedulerTask { key: String, reason: String },
}

impl From<serde_json::Error> for InspectError {
    fn from(err: serde_json::Error) -> Self {
        InspectError::Parse(ProtocolError::Decode(err))
    }
}

pub type Result<T> = std::result::Result<T, InspectError>;
