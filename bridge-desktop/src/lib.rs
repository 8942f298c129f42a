//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux):
//! - `HttpClient` using `reqwest`
//! - `BrowserLauncher` spawning the platform's URL opener with `tokio::process`
//!
//! These are injected automatically when `core-runtime` is built with the
//! `desktop-shims` feature.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SystemBrowserLauncher};
//! use std::sync::Arc;
//!
//! let http = Arc::new(ReqwestHttpClient::try_new()?);
//! let browser = Arc::new(SystemBrowserLauncher::new());
//! ```

mod browser;
mod http;

pub use browser::{ChildBrowserProcess, SystemBrowserLauncher};
pub use http::ReqwestHttpClient;
