//! System browser launcher
//!
//! Opens URLs with the platform's URL handler (`xdg-open`, `open`, or the
//! Windows URL protocol handler) as a child process. The child is killed on
//! release and when dropped.

use bridge_traits::{
    browser::{BrowserLauncher, BrowserProcess},
    error::{BridgeError, Result},
};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Launches the user's default browser.
#[derive(Debug, Clone)]
pub struct SystemBrowserLauncher {
    program: String,
    args: Vec<String>,
}

impl SystemBrowserLauncher {
    /// Use the platform's default URL opener.
    pub fn new() -> Self {
        let (program, args): (&str, &[&str]) = if cfg!(target_os = "windows") {
            ("rundll32", &["url.dll,FileProtocolHandler"])
        } else if cfg!(target_os = "macos") {
            ("open", &[])
        } else {
            ("xdg-open", &[])
        };

        Self::with_command(program, args.iter().copied())
    }

    /// Use a custom opener; the URL is appended as the final argument.
    pub fn with_command<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for SystemBrowserLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserLauncher for SystemBrowserLauncher {
    fn launch(&self, url: &str) -> Result<Box<dyn BrowserProcess>> {
        debug!(program = %self.program, "Launching browser");

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BridgeError::OperationFailed(format!(
                    "Failed to launch browser via '{}': {}",
                    self.program, e
                ))
            })?;

        Ok(Box::new(ChildBrowserProcess { child }))
    }
}

/// Spawned opener process.
#[derive(Debug)]
pub struct ChildBrowserProcess {
    child: Child,
}

impl BrowserProcess for ChildBrowserProcess {
    fn terminate(&mut self) {
        if !self.is_running() {
            return;
        }
        if let Err(e) = self.child.start_kill() {
            warn!(error = %e, "Failed to terminate browser process");
        }
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_terminate_stops_process() {
        // `sh -c 'sleep 30' <url>` keeps running until killed.
        let launcher = SystemBrowserLauncher::with_command("sh", ["-c", "sleep 30"]);
        let mut process = launcher.launch("http://127.0.0.1/authorize").unwrap();
        assert!(process.is_running());

        process.terminate();

        let mut stopped = false;
        for _ in 0..50 {
            if !process.is_running() {
                stopped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(stopped);
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let launcher = SystemBrowserLauncher::with_command("definitely-not-a-browser-xyz", Vec::<String>::new());
        let result = launcher.launch("http://127.0.0.1/");
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }
}
