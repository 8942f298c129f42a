//! Cancellation helpers.
//!
//! Every suspension point in an authentication attempt (waiting for the
//! loopback redirect, awaiting an HTTP call, sleeping between retries) must
//! give up promptly once the caller cancels. These helpers race a future
//! against a [`CancellationToken`] and report [`Cancelled`] instead of hanging.

use crate::sync::CancellationToken;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Marker error returned when the cancellation token fired first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Runs `future` unless `token` is cancelled first.
///
/// Cancellation is checked before polling the future, so an already-cancelled
/// token never starts the work.
pub async fn cancellable<F>(token: &CancellationToken, future: F) -> Result<F::Output, Cancelled>
where
    F: Future,
{
    if token.is_cancelled() {
        return Err(Cancelled);
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Cancelled),
        output = future => Ok(output),
    }
}

/// Sleeps for `duration`, waking early with [`Cancelled`] if `token` fires.
pub async fn cancellable_sleep(token: &CancellationToken, duration: Duration) -> Result<(), Cancelled> {
    cancellable(token, tokio::time::sleep(duration)).await
}
