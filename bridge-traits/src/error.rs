use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The client-side deadline elapsed before a response arrived.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller's cancellation token fired while the operation was pending.
    #[error("Operation cancelled")]
    Cancelled,

    /// A response arrived with a status the caller treats as a failure.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            BridgeError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
