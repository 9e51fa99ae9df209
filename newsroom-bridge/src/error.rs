//! Error types for the broadcast bridge

use crate::decoder::DecodeError;
use thiserror::Error;

/// Errors raised by the broadcast client
///
/// Every variant is caught at the boundary where it occurs (message handler,
/// fetch, storage write) and logged. Nothing here is allowed to take the
/// client down.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Clip resolution failed: {0}")]
    ResolutionFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No tokio runtime available")]
    NoRuntime,
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::MalformedMessage(e.to_string())
    }
}

impl From<figment::Error> for BridgeError {
    fn from(e: figment::Error) -> Self {
        BridgeError::Config(e.to_string())
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
