//! Runtime handles.
//!
//! Re-exported so downstream crates can detect an ambient runtime (for example
//! the logging sink layer) without depending on Tokio directly.

pub use tokio::runtime::{Builder, Handle, Runtime, TryCurrentError};
