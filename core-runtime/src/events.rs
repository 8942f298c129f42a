//! # Event Bus System
//!
//! Broadcasts authentication lifecycle events to interested observers (UI,
//! telemetry, tests) over `tokio::sync::broadcast`.
//!
//! ```text
//! ┌───────────────┐   emit    ┌──────────┐  subscribe  ┌────────────┐
//! │ Authenticator ├──────────>│ EventBus ├────────────>│ Subscriber │
//! └───────────────┘           └──────────┘             └────────────┘
//! ```
//!
//! Emission never blocks and never fails the operation that emitted; a bus
//! without subscribers simply drops the event.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::config::AuthMode;
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut stream = bus.subscribe();
//!
//! bus.emit(CoreEvent::Auth(AuthEvent::SigningIn {
//!     mode: AuthMode::AuthorizationCode,
//! }))
//! .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Auth(AuthEvent::SigningIn { .. })));
//! # }
//! ```

use crate::config::AuthMode;
use chrono::{DateTime, Utc};
use core_async::sync::broadcast::{self, error::RecvError, error::SendError, Receiver};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default buffer size for event bus channels.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

/// Root event type for all events emitted by the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Authentication-related events
    Auth(AuthEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError {
                recoverable: false, ..
            }) => EventSeverity::Error,
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. }) => EventSeverity::Info,
            CoreEvent::Auth(AuthEvent::SignedOut) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Authentication lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// A full sign-in flow started (browser or client credentials).
    SigningIn { mode: AuthMode },
    /// A full sign-in flow produced a token.
    SignedIn {
        mode: AuthMode,
        /// When the cached access token stops being handed out.
        expires_at: DateTime<Utc>,
    },
    /// The cached refresh token is being exchanged.
    TokenRefreshing,
    TokenRefreshed { expires_at: DateTime<Utc> },
    /// Cached credentials were discarded on request.
    SignedOut,
    /// Token acquisition failed.
    AuthError {
        message: String,
        /// Whether retrying the same call may succeed.
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SigningIn { .. } => "Authentication in progress",
            AuthEvent::SignedIn { .. } => "Signed in successfully",
            AuthEvent::TokenRefreshing => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::SignedOut => "Signed out",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

/// Central event bus for publishing and subscribing to events.
///
/// Cloning shares the underlying channel. Each `subscribe()` creates an
/// independent receiver that sees events emitted after it subscribed; slow
/// receivers get `RecvError::Lagged`.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers, or an error when nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` that skips events not matching a predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Ok(event),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
