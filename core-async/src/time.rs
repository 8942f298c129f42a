//! Time-related re-exports.
//!
//! Tokio's timer is used for every sleep and timeout so tests can freeze and
//! advance time with `tokio::time::pause`.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, timeout, Duration};
//!
//! async fn example() {
//!     let fast = timeout(Duration::from_secs(1), async { 42 }).await;
//!     assert_eq!(fast.ok(), Some(42));
//!     sleep(Duration::from_millis(1)).await;
//! }
//! ```

pub use tokio::time::{error::Elapsed, sleep, sleep_until, timeout, Instant, Sleep, Timeout};

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};
