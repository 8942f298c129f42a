//! # Core Runtime Module
//!
//! Ambient infrastructure for the authentication core:
//! - Logging and tracing setup with credential redaction
//! - Settings and capability configuration
//! - Auth lifecycle event bus
//!
//! `core-auth` depends on this crate for its configuration and events; hosts
//! use it to initialise logging and assemble a [`config::CoreConfig`].

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{AuthMode, AuthSettings, CoreConfig};
pub use error::{Error, Result};
pub use events::{AuthEvent, CoreEvent, EventBus};
