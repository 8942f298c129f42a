//! In-memory token cache shared by every authentication attempt.

use crate::types::{TokenRecord, TokenResponse};
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_async::sync::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Holds at most one [`TokenRecord`] and answers expiry questions against an
/// injected [`Clock`].
///
/// Reads never touch the network. Writes happen only after a successful
/// token-endpoint exchange, or on explicit sign-out.
pub struct TokenCache {
    record: RwLock<Option<TokenRecord>>,
    clock: Arc<dyn Clock>,
}

impl TokenCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            record: RwLock::new(None),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The cached access token, only while `now < access_expires_at`.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        let now = self.now();
        self.record
            .read()
            .await
            .as_ref()
            .filter(|record| record.access_token_valid_at(now))
            .map(|record| record.access_token.clone())
    }

    /// The cached refresh token, only while its local window is open.
    pub async fn valid_refresh_token(&self) -> Option<String> {
        let now = self.now();
        self.record
            .read()
            .await
            .as_ref()
            .and_then(|record| record.refresh_token_valid_at(now))
            .map(str::to_string)
    }

    /// Replace the cached record.
    pub async fn store(&self, record: TokenRecord) {
        debug!(
            expires_at = %record.access_expires_at,
            has_refresh_token = record.refresh_token.is_some(),
            "Caching token"
        );
        *self.record.write().await = Some(record);
    }

    /// Build a record from a fresh grant response, cache it and return it.
    pub async fn store_response(&self, response: &TokenResponse, refresh_window: Duration) -> TokenRecord {
        let record = TokenRecord::from_response(response, self.now(), refresh_window);
        self.store(record.clone()).await;
        record
    }

    /// Merge a refresh-grant response into the cached record.
    ///
    /// The existing refresh token survives unless the response rotates it.
    pub async fn store_refreshed(&self, response: &TokenResponse, refresh_window: Duration) -> TokenRecord {
        let now = self.now();
        let mut guard = self.record.write().await;
        let record = match guard.as_ref() {
            Some(existing) => existing.refreshed(response, now, refresh_window),
            None => TokenRecord::from_response(response, now, refresh_window),
        };
        *guard = Some(record.clone());
        debug!(expires_at = %record.access_expires_at, "Cached refreshed token");
        record
    }

    pub async fn snapshot(&self) -> Option<TokenRecord> {
        self.record.read().await.clone()
    }

    /// Forget the refresh token after the provider rejected it.
    pub async fn discard_refresh_token(&self) {
        let mut guard = self.record.write().await;
        if let Some(record) = guard.take() {
            *guard = Some(record.without_refresh_token());
        }
    }

    pub async fn clear(&self) {
        *self.record.write().await = None;
    }
}
