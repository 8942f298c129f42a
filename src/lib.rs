//! Workspace facade crate.
//!
//! Host applications can depend on `authsession-workspace` and get the
//! authentication core together with the desktop bridge defaults through the
//! `desktop-shims` feature, without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_auth as auth;
#[cfg(feature = "desktop-shims")]
pub use core_runtime as runtime;
