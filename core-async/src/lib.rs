//! Async facade for the authentication session core.
//!
//! All `core-*` and `bridge-*` crates depend on this crate instead of reaching
//! for Tokio directly, so the runtime choice and the cancellation vocabulary
//! live in one place.
//!
//! # Modules
//!
//! - `task`: Task spawning
//! - `time`: Sleep, timeout, instants
//! - `sync`: Locks, channels and [`CancellationToken`](sync::CancellationToken)
//! - `cancel`: Racing futures against a cancellation signal
//!
//! # Examples
//!
//! ```rust
//! use core_async::cancel::{cancellable, Cancelled};
//! use core_async::sync::CancellationToken;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() -> Result<(), Cancelled> {
//!     let token = CancellationToken::new();
//!     cancellable(&token, sleep(Duration::from_millis(10))).await
//! }
//! ```

pub mod cancel;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use cancel::{cancellable, cancellable_sleep, Cancelled};
pub use sync::CancellationToken;
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
