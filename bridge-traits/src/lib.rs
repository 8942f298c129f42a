//! # Host Bridge Traits
//!
//! Capability contracts the authentication core needs from its host.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - One-shot async HTTP execution with cancellation
//! - [`BrowserLauncher`](browser::BrowserLauncher) - Open the authorize URL in the default browser
//! - [`Clock`](time::Clock) - Time source for token expiry
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! Desktop implementations live in `bridge-desktop`. Other hosts inject their
//! own adapters through `core_runtime::config::CoreConfig`.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should report client-side deadlines as `BridgeError::Timeout` so the retry
//! layer can classify them, and must not turn HTTP error statuses into errors
//! themselves.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so one adapter can be shared across
//! concurrent authentication attempts.

pub mod browser;
pub mod error;
pub mod http;
pub mod time;

pub use error::{BridgeError, Result};

pub use browser::{BrowserLauncher, BrowserProcess};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
