//! Machine-to-machine client-credentials flow.

use crate::error::Result;
use crate::token_cache::TokenCache;
use crate::token_endpoint::TokenEndpoint;
use crate::types::TokenRecord;
use core_async::sync::CancellationToken;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// No browser, no nonce and no refresh token: every expiry repeats the grant.
pub struct ClientCredentialsFlow {
    endpoint: TokenEndpoint,
    cache: Arc<TokenCache>,
    scope: String,
}

impl ClientCredentialsFlow {
    pub fn new(endpoint: TokenEndpoint, cache: Arc<TokenCache>, scopes: &[String]) -> Self {
        Self {
            endpoint,
            cache,
            scope: scopes.join(" "),
        }
    }

    #[instrument(skip(self, cancel))]
    pub async fn authenticate(&self, cancel: &CancellationToken) -> Result<TokenRecord> {
        let response = self.endpoint.client_credentials(&self.scope, cancel).await?;

        let record = TokenRecord::from_response(&response, self.cache.now(), Duration::ZERO)
            .without_refresh_token();
        self.cache.store(record.clone()).await;

        info!(expires_at = %record.access_expires_at, "Client-credentials token acquired");
        Ok(record)
    }
}
