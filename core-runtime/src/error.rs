use thiserror::Error;

/// Errors raised while assembling the runtime (settings, capabilities, logging).
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A host capability is required but was not injected and has no default.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
