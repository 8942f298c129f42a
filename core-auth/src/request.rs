//! Authenticated requests against the resource API.
//!
//! Callers supply path segments, query parameters and an optional JSON body;
//! the builder obtains a valid token from its [`TokenProvider`] and attaches
//! `Authorization: Bearer <token>` before sending through the retrying
//! transport.

use crate::error::{AuthError, Result};
use crate::manager::TokenProvider;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_async::sync::CancellationToken;
use core_runtime::config::AuthSettings;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Clone)]
pub struct AuthenticatedRequestBuilder {
    provider: Arc<dyn TokenProvider>,
    http: Arc<dyn HttpClient>,
    base_url: Url,
    timeout: Duration,
}

impl AuthenticatedRequestBuilder {
    pub fn new(
        provider: Arc<dyn TokenProvider>,
        http: Arc<dyn HttpClient>,
        base_url: Url,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            http,
            base_url,
            timeout,
        }
    }

    /// Uses `api_base_url` and `request_timeout` from `settings`.
    pub fn from_settings(
        provider: Arc<dyn TokenProvider>,
        http: Arc<dyn HttpClient>,
        settings: &AuthSettings,
    ) -> Result<Self> {
        let base_url = Url::parse(&settings.api_base_url).map_err(|e| {
            AuthError::Configuration(format!("Invalid API base URL '{}': {}", settings.api_base_url, e))
        })?;
        Ok(Self::new(provider, http, base_url, settings.request_timeout))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `base_url` extended with percent-encoded `segments` and `query`.
    ///
    /// ```
    /// # use core_auth::request::AuthenticatedRequestBuilder;
    /// # fn example(builder: &AuthenticatedRequestBuilder) -> core_auth::Result<()> {
    /// let url = builder.url(&["users", "alice smith", "playlists"], &[("limit", "50")])?;
    /// // https://api.spotify.com/v1/users/alice%20smith/playlists?limit=50
    /// # let _ = url;
    /// # Ok(())
    /// # }
    /// ```
    pub fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                AuthError::Configuration(format!("API base URL '{}' cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Request with a fresh bearer token and no body.
    pub async fn request(
        &self,
        method: HttpMethod,
        segments: &[&str],
        query: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<HttpRequest> {
        let url = self.url(segments, query)?;
        let token = self.provider.access_token(cancel).await?;
        Ok(HttpRequest::new(method, url.as_str())
            .header("Accept", "application/json")
            .bearer_token(token)
            .timeout(self.timeout))
    }

    /// Request with a fresh bearer token and a JSON body.
    pub async fn json_request<T>(
        &self,
        method: HttpMethod,
        segments: &[&str],
        query: &[(&str, &str)],
        body: &T,
        cancel: &CancellationToken,
    ) -> Result<HttpRequest>
    where
        T: Serialize + Sync,
    {
        let request = self.request(method, segments, query, cancel).await?;
        request.json(body).map_err(|e| AuthError::RequestFailed {
            status: None,
            message: e.to_string(),
        })
    }

    /// Send a request built by this helper.
    ///
    /// Non-2xx responses become [`AuthError::RequestFailed`].
    #[instrument(skip(self, request, cancel), fields(method = request.method.as_str()))]
    pub async fn send(&self, request: HttpRequest, cancel: &CancellationToken) -> Result<HttpResponse> {
        let response = match self.http.execute_cancellable(request, cancel).await {
            Ok(response) => response,
            Err(BridgeError::Cancelled) => return Err(AuthError::Cancelled),
            Err(e) => {
                warn!(error = %e, "Resource request failed");
                return Err(AuthError::RequestFailed {
                    status: e.status(),
                    message: e.to_string(),
                });
            }
        };

        if !response.is_success() {
            let text = response.text().unwrap_or_default();
            warn!(status = response.status, "Resource request rejected");
            return Err(AuthError::RequestFailed {
                status: Some(response.status),
                message: text.trim().chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        debug!(status = response.status, bytes = response.body.len(), "Resource request succeeded");
        Ok(response)
    }

    /// GET and deserialize a JSON response.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<T> {
        let request = self.request(HttpMethod::Get, segments, query, cancel).await?;
        let response = self.send(request, cancel).await?;
        response.json().map_err(|e| AuthError::RequestFailed {
            status: Some(response.status),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use mockall::mock;
    use serde::Deserialize;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    mock! {
        Provider {}

        #[async_trait]
        impl TokenProvider for Provider {
            async fn access_token(&self, cancel: &CancellationToken) -> Result<String>;
        }
    }

    fn provider(token: &'static str) -> MockProvider {
        let mut provider = MockProvider::new();
        provider
            .expect_access_token()
            .returning(move |_| Ok(token.to_string()));
        provider
    }

    fn builder(provider: MockProvider, http: MockHttp) -> AuthenticatedRequestBuilder {
        AuthenticatedRequestBuilder::new(
            Arc::new(provider),
            Arc::new(http),
            Url::parse("https://api.example.com/v1").unwrap(),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_url_building() {
        let builder = builder(MockProvider::new(), MockHttp::new());

        let url = builder
            .url(&["users", "alice smith", "playlists"], &[("limit", "50"), ("offset", "0")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/users/alice%20smith/playlists?limit=50&offset=0"
        );

        let bare = builder.url(&["me"], &[]).unwrap();
        assert_eq!(bare.as_str(), "https://api.example.com/v1/me");
    }

    #[tokio::test]
    async fn test_request_carries_bearer_token() {
        let builder = builder(provider("at-1"), MockHttp::new());

        let request = builder
            .request(HttpMethod::Get, &["me"], &[], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(request.headers.get("Authorization").map(String::as_str), Some("Bearer at-1"));
        assert_eq!(request.timeout, Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_json_request_body() {
        let builder = builder(provider("at"), MockHttp::new());

        let request = builder
            .json_request(
                HttpMethod::Post,
                &["users", "u1", "playlists"],
                &[],
                &serde_json::json!({"name": "Mix", "public": false}),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(request.body_text(), Some(r#"{"name":"Mix","public":false}"#));
        assert_eq!(
            request.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn test_get_json_and_rejection() {
        #[derive(Deserialize)]
        struct Profile {
            id: String,
        }

        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|request| request.url.ends_with("/v1/me"))
            .returning(|_| Ok(HttpResponse::new(200, r#"{"id":"u1"}"#)));
        http.expect_execute()
            .withf(|request| request.url.ends_with("/v1/missing"))
            .returning(|_| Ok(HttpResponse::new(404, "not found")));
        let builder = builder(provider("at"), http);
        let cancel = CancellationToken::new();

        let profile: Profile = builder.get_json(&["me"], &[], &cancel).await.unwrap();
        assert_eq!(profile.id, "u1");

        let missing = builder.get_json::<Profile>(&["missing"], &[], &cancel).await;
        match missing {
            Err(AuthError::RequestFailed { status, message }) => {
                assert_eq!(status, Some(404));
                assert_eq!(message, "not found");
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_token_failure_propagates() {
        let mut provider = MockProvider::new();
        provider
            .expect_access_token()
            .returning(|_| Err(AuthError::Cancelled));
        let builder = builder(provider, MockHttp::new());

        let result = builder
            .request(HttpMethod::Get, &["me"], &[], &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(AuthError::Cancelled)));
    }
}
