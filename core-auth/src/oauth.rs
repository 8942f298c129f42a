//! Interactive OAuth 2.0 authorization-code flow.
//!
//! # Overview
//!
//! One call to [`AuthorizationCodeFlow::authenticate`] runs one attempt:
//!
//! 1. Generate a fresh [`Nonce`](crate::types::Nonce) and build the authorize URL
//! 2. Open it in the browser and capture the loopback redirect
//! 3. Validate `state`, then the provider `error`, then the `code`
//! 4. Exchange the code at the token endpoint (with retries)
//! 5. Cache the resulting access and refresh tokens
//!
//! Progress is published as [`FlowState`] through a watch channel:
//!
//! ```text
//! Idle -> AwaitingCallback -> ExchangingCode -> Authenticated
//!              |                    |
//!              +-> StateMismatch    +-> ExchangeFailure
//!              +-> CallbackError
//!              +-> MissingCode
//!              +-> Failed           (bind, browser, timeout)
//!
//! Cancelled is reachable from AwaitingCallback and ExchangingCode.
//! ```
//!
//! # Security
//!
//! - The nonce is single-use and compared in constant time
//! - A mismatched `state` never reaches the token endpoint
//! - Codes, tokens and the nonce are never logged; the authorize URL is
//!   logged with sensitive query values masked

use crate::callback::CallbackListener;
use crate::error::Result;
use crate::token_cache::TokenCache;
use crate::token_endpoint::TokenEndpoint;
use crate::types::{AuthorizationAttempt, FlowState, TokenRecord};
use core_async::sync::{watch, CancellationToken};
use core_runtime::config::AuthSettings;
use core_runtime::logging::redact_query;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub struct AuthorizationCodeFlow {
    authorize_endpoint: Url,
    client_id: String,
    /// Sent verbatim; providers compare it byte-for-byte with the registration.
    redirect_uri: String,
    redirect_url: Url,
    scopes: Vec<String>,
    show_dialog: bool,
    refresh_window: Duration,
    listener: CallbackListener,
    endpoint: TokenEndpoint,
    cache: Arc<TokenCache>,
    state_tx: watch::Sender<FlowState>,
}

impl AuthorizationCodeFlow {
    pub fn new(
        settings: &AuthSettings,
        listener: CallbackListener,
        endpoint: TokenEndpoint,
        cache: Arc<TokenCache>,
    ) -> Result<Self> {
        let (state_tx, _) = watch::channel(FlowState::Idle);
        Ok(Self {
            authorize_endpoint: settings.authorize_url()?,
            client_id: settings.client_id.clone(),
            redirect_uri: settings.redirect_uri.clone(),
            redirect_url: settings.redirect_url()?,
            scopes: settings.scopes.clone(),
            show_dialog: settings.show_dialog,
            refresh_window: settings.refresh_token_window,
            listener,
            endpoint,
            cache,
            state_tx,
        })
    }

    pub fn state(&self) -> FlowState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions of current and future attempts.
    pub fn subscribe_state(&self) -> watch::Receiver<FlowState> {
        self.state_tx.subscribe()
    }

    /// Start a new attempt bound to this flow's redirect URI and scopes.
    pub fn new_attempt(&self) -> AuthorizationAttempt {
        AuthorizationAttempt::new(self.redirect_url.clone(), self.scopes.clone())
    }

    /// Authorize URL carrying `client_id`, `redirect_uri`, `scope`,
    /// `state`, `response_type=code` and `show_dialog`.
    pub fn build_authorize_url(&self, attempt: &AuthorizationAttempt) -> Url {
        let mut url = self.authorize_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &attempt.scopes.join(" "))
            .append_pair("state", attempt.nonce.as_str())
            .append_pair("response_type", "code")
            .append_pair("show_dialog", if self.show_dialog { "true" } else { "false" });
        url
    }

    /// Run one interactive attempt and cache its tokens.
    ///
    /// # Errors
    ///
    /// Every terminal failure is reported as a distinct [`AuthError`](crate::AuthError)
    /// variant; the cache is untouched unless the exchange succeeded.
    #[instrument(skip(self, cancel))]
    pub async fn authenticate(&self, cancel: &CancellationToken) -> Result<TokenRecord> {
        let attempt = self.new_attempt();
        debug!(attempt_id = %attempt.id, "Starting authorization-code attempt");

        let outcome = self.run(&attempt, cancel).await;
        match &outcome {
            Ok(_) => {
                self.transition(FlowState::Authenticated);
                info!(attempt_id = %attempt.id, "Authorization-code flow completed");
            }
            Err(e) => {
                let state = FlowState::from_error(e);
                self.transition(state);
                warn!(attempt_id = %attempt.id, ?state, error = %e, "Authorization-code flow failed");
            }
        }
        outcome
    }

    async fn run(&self, attempt: &AuthorizationAttempt, cancel: &CancellationToken) -> Result<TokenRecord> {
        self.transition(FlowState::AwaitingCallback);
        let authorize_url = self.build_authorize_url(attempt);
        info!(url = %redact_query(authorize_url.as_str()), "Waiting for user consent");

        let callback = self
            .listener
            .capture(&authorize_url, &self.redirect_url, cancel)
            .await?;
        let code = attempt.validate(callback)?;

        self.transition(FlowState::ExchangingCode);
        let response = self
            .endpoint
            .exchange_code(&code, &self.redirect_uri, cancel)
            .await?;

        if response.refresh_token.is_none() {
            warn!("Token endpoint did not issue a refresh token");
        }
        Ok(self.cache.store_response(&response, self.refresh_window).await)
    }

    fn transition(&self, next: FlowState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            debug!(?previous, ?next, "Flow state changed");
        }
    }
}
