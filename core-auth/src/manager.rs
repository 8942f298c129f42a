//! # Authentication Manager
//!
//! Single entry point for obtaining a bearer token.
//!
//! ## Overview
//!
//! [`Authenticator::authenticate`] resolves a token in three steps:
//!
//! 1. A cached access token that has not passed its expiry is returned
//!    without any network call
//! 2. Otherwise a cached refresh token inside its local window is redeemed
//! 3. Otherwise the configured full flow runs (browser authorization-code or
//!    client credentials)
//!
//! Acquisitions are single-flight: concurrent callers on a cold cache wait
//! for the one in-flight acquisition and then read its result from the
//! cache, so the browser opens once and a refresh token is redeemed once.
//!
//! ## Failed refresh
//!
//! When the provider rejects a refresh, the refresh token is discarded and
//! the full flow runs. With
//! [`AuthSettings::retain_refresh_token_on_failure`] the token is kept and
//! [`AuthError::RefreshFailure`] is returned instead. Cancellation never
//! discards it.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::Authenticator;
//! use core_runtime::config::{AuthSettings, CoreConfig};
//! use core_async::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = AuthSettings::from_env()?;
//! let authenticator = Authenticator::new(CoreConfig::builder().settings(settings).build()?)?;
//!
//! let token = authenticator.authenticate(&CancellationToken::new()).await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

use crate::callback::CallbackListener;
use crate::client_credentials::ClientCredentialsFlow;
use crate::error::{AuthError, Result};
use crate::oauth::AuthorizationCodeFlow;
use crate::request::AuthenticatedRequestBuilder;
use crate::retry::{RetryPolicy, RetryingHttpClient};
use crate::token_cache::TokenCache;
use crate::token_endpoint::TokenEndpoint;
use crate::types::{FlowState, TokenRecord};
use async_trait::async_trait;
use bridge_traits::http::HttpClient;
use core_async::sync::{watch, CancellationToken, Mutex};
use core_runtime::config::{AuthMode, AuthSettings, CoreConfig};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Anything that can hand out a currently valid bearer token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self, cancel: &CancellationToken) -> Result<String>;
}

enum Flow {
    AuthorizationCode(AuthorizationCodeFlow),
    ClientCredentials(ClientCredentialsFlow),
}

/// Token cache plus the flow that refills it.
pub struct Authenticator {
    settings: AuthSettings,
    cache: Arc<TokenCache>,
    endpoint: TokenEndpoint,
    flow: Flow,
    /// Transport with the retry policy applied
    http: Arc<dyn HttpClient>,
    event_bus: Option<EventBus>,
    /// Held for the duration of any network acquisition
    acquisition: Mutex<()>,
}

impl Authenticator {
    /// Build from a validated [`CoreConfig`].
    ///
    /// The configured `HttpClient` is wrapped in a [`RetryingHttpClient`] so
    /// every token-endpoint and resource call shares one retry policy.
    pub fn new(config: CoreConfig) -> Result<Self> {
        let CoreConfig {
            settings,
            http_client,
            browser_launcher,
            clock,
            event_bus,
        } = config;
        settings.validate()?;

        let http: Arc<dyn HttpClient> = Arc::new(RetryingHttpClient::new(
            http_client,
            RetryPolicy::new(settings.max_retries),
        ));
        let cache = Arc::new(TokenCache::new(clock));
        let endpoint = TokenEndpoint::new(
            http.clone(),
            settings.token_url()?,
            settings.client_id.clone(),
            settings.client_secret.clone(),
            settings.request_timeout,
        );

        let flow = match settings.mode {
            AuthMode::AuthorizationCode => {
                let launcher = browser_launcher.ok_or_else(|| {
                    AuthError::Configuration(
                        "Authorization-code mode requires a BrowserLauncher".to_string(),
                    )
                })?;
                Flow::AuthorizationCode(AuthorizationCodeFlow::new(
                    &settings,
                    CallbackListener::new(launcher, settings.callback_timeout),
                    endpoint.clone(),
                    cache.clone(),
                )?)
            }
            AuthMode::ClientCredentials => Flow::ClientCredentials(ClientCredentialsFlow::new(
                endpoint.clone(),
                cache.clone(),
                &settings.scopes,
            )),
        };

        Ok(Self {
            settings,
            cache,
            endpoint,
            flow,
            http,
            event_bus,
            acquisition: Mutex::new(()),
        })
    }

    pub fn mode(&self) -> AuthMode {
        self.settings.mode
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// Flow-state updates; `None` in client-credentials mode.
    pub fn subscribe_flow_state(&self) -> Option<watch::Receiver<FlowState>> {
        match &self.flow {
            Flow::AuthorizationCode(flow) => Some(flow.subscribe_state()),
            Flow::ClientCredentials(_) => None,
        }
    }

    /// Return a valid access token, refreshing or signing in as needed.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Cancelled`] if `cancel` fires at any suspension point
    /// - [`AuthError::RefreshFailure`] only with
    ///   `retain_refresh_token_on_failure`
    /// - any failure of the configured full flow
    #[instrument(skip(self, cancel), fields(mode = %self.settings.mode))]
    pub async fn authenticate(&self, cancel: &CancellationToken) -> Result<String> {
        if let Some(token) = self.cache.get_valid_access_token().await {
            debug!("Using cached access token");
            return Ok(token);
        }

        let _guard = core_async::cancellable(cancel, self.acquisition.lock())
            .await
            .map_err(|_| AuthError::Cancelled)?;

        // Another caller may have filled the cache while we waited.
        if let Some(token) = self.cache.get_valid_access_token().await {
            debug!("Access token acquired by concurrent caller");
            return Ok(token);
        }

        if let Some(refresh_token) = self.cache.valid_refresh_token().await {
            match self.refresh(&refresh_token, cancel).await {
                Ok(token) => return Ok(token),
                Err(AuthError::Cancelled) => return Err(AuthError::Cancelled),
                Err(e) if self.settings.retain_refresh_token_on_failure => {
                    self.emit_error(&e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "Refresh failed, discarding refresh token and signing in again");
                    self.cache.discard_refresh_token().await;
                }
            }
        }

        self.sign_in(cancel).await
    }

    /// Discard all cached credentials.
    pub async fn sign_out(&self) {
        self.cache.clear().await;
        info!("Signed out");
        self.emit(AuthEvent::SignedOut);
    }

    /// Helper for authenticated calls against `api_base_url`.
    pub fn request_builder(self: &Arc<Self>) -> Result<AuthenticatedRequestBuilder> {
        AuthenticatedRequestBuilder::from_settings(self.clone(), self.http.clone(), &self.settings)
    }

    async fn refresh(&self, refresh_token: &str, cancel: &CancellationToken) -> Result<String> {
        info!("Refreshing access token");
        self.emit(AuthEvent::TokenRefreshing);

        let response = self.endpoint.refresh(refresh_token, cancel).await?;
        let record = self
            .cache
            .store_refreshed(&response, self.settings.refresh_token_window)
            .await;

        self.emit(AuthEvent::TokenRefreshed {
            expires_at: record.access_expires_at,
        });
        Ok(record.access_token)
    }

    async fn sign_in(&self, cancel: &CancellationToken) -> Result<String> {
        let mode = self.settings.mode;
        info!(%mode, "Starting sign-in");
        self.emit(AuthEvent::SigningIn { mode });

        let outcome: Result<TokenRecord> = match &self.flow {
            Flow::AuthorizationCode(flow) => flow.authenticate(cancel).await,
            Flow::ClientCredentials(flow) => flow.authenticate(cancel).await,
        };

        match outcome {
            Ok(record) => {
                self.emit(AuthEvent::SignedIn {
                    mode,
                    expires_at: record.access_expires_at,
                });
                Ok(record.access_token)
            }
            Err(e) => {
                self.emit_error(&e);
                Err(e)
            }
        }
    }

    fn emit_error(&self, error: &AuthError) {
        self.emit(AuthEvent::AuthError {
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        });
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is not an error.
            let _ = bus.emit(CoreEvent::Auth(event));
        }
    }
}

#[async_trait]
impl TokenProvider for Authenticator {
    async fn access_token(&self, cancel: &CancellationToken) -> Result<String> {
        self.authenticate(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use mockall::mock;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn machine_settings() -> AuthSettings {
        AuthSettings::builder()
            .client_id("client")
            .client_secret("secret")
            .mode(AuthMode::ClientCredentials)
            .build()
            .unwrap()
    }

    fn authenticator(http: MockHttp, bus: Option<EventBus>) -> Authenticator {
        let mut builder = CoreConfig::builder()
            .settings(machine_settings())
            .http_client(Arc::new(http));
        if let Some(bus) = bus {
            builder = builder.event_bus(bus);
        }
        Authenticator::new(builder.build().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_second_call_served_from_cache() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, r#"{"access_token":"m2m","expires_in":3600}"#)));
        let auth = authenticator(http, None);
        let cancel = CancellationToken::new();

        assert_eq!(auth.authenticate(&cancel).await.unwrap(), "m2m");
        assert_eq!(auth.authenticate(&cancel).await.unwrap(), "m2m");
        assert!(auth.subscribe_flow_state().is_none());
    }

    #[tokio::test]
    async fn test_events_for_sign_in_and_sign_out() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, r#"{"access_token":"m2m","expires_in":3600}"#)));
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let auth = authenticator(http, Some(bus));

        auth.authenticate(&CancellationToken::new()).await.unwrap();
        auth.sign_out().await;

        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::SigningIn { mode: AuthMode::ClientCredentials })
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::SignedIn { mode: AuthMode::ClientCredentials, .. })
        ));
        assert_eq!(events.recv().await.unwrap(), CoreEvent::Auth(AuthEvent::SignedOut));
        assert!(auth.cache().snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_failure_emits_error_event() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(401, r#"{"error":"invalid_client"}"#)));
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let auth = authenticator(http, Some(bus));

        let result = auth.authenticate(&CancellationToken::new()).await;

        assert!(matches!(result, Err(AuthError::ExchangeFailure { status: Some(401), .. })));
        let _signing_in = events.recv().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::AuthError {
                message: "Token exchange failed (HTTP 401): invalid_client".to_string(),
                recoverable: false,
            })
        );
    }

    #[tokio::test]
    async fn test_cancelled_caller_makes_no_request() {
        let mut http = MockHttp::new();
        http.expect_execute().never();
        let auth = authenticator(http, None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = auth.authenticate(&cancel).await;

        assert!(matches!(result, Err(AuthError::Cancelled)));
    }
}
