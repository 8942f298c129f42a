//! Browser Launch Abstraction
//!
//! The interactive sign-in opens the authorize URL in the user's default
//! browser. Hosts decide how that happens (desktop spawns a helper command,
//! mobile hands off to a system sheet); the core only needs a handle it can
//! release when the flow ends.

use crate::error::Result;

/// Opens URLs in the host's default browser.
pub trait BrowserLauncher: Send + Sync {
    /// Launch the browser pointed at `url`.
    ///
    /// The returned handle is owned by the caller and must be terminated on
    /// every exit path of the sign-in attempt.
    fn launch(&self, url: &str) -> Result<Box<dyn BrowserProcess>>;
}

/// Handle to a spawned browser (or browser helper) process.
pub trait BrowserProcess: Send {
    /// Best-effort termination. Must not panic if the process already exited.
    fn terminate(&mut self);

    /// Whether the process is still alive.
    fn is_running(&mut self) -> bool;
}
