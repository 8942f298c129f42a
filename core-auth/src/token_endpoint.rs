//! Token endpoint client for the three grant types.
//!
//! All requests are `application/x-www-form-urlencoded` POSTs sent through
//! the retry decorator. Failures are mapped onto the caller's failure kind:
//! [`AuthError::ExchangeFailure`] for the code and client-credentials grants,
//! [`AuthError::RefreshFailure`] for the refresh grant.

use crate::error::{AuthError, Result};
use crate::types::TokenResponse;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_async::sync::CancellationToken;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Longest error body echoed into an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
}

impl Grant {
    fn as_str(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode => "authorization_code",
            Grant::RefreshToken => "refresh_token",
            Grant::ClientCredentials => "client_credentials",
        }
    }

    /// A 2xx body that is not a usable token. A failed refresh must surface as
    /// [`AuthError::RefreshFailure`] whatever the reason.
    fn malformed(&self, message: String) -> AuthError {
        match self {
            Grant::RefreshToken => AuthError::RefreshFailure { status: None, message },
            Grant::AuthorizationCode | Grant::ClientCredentials => AuthError::InvalidResponse(message),
        }
    }

    fn failure(&self, status: Option<u16>, message: String) -> AuthError {
        match self {
            Grant::RefreshToken => AuthError::RefreshFailure { status, message },
            Grant::AuthorizationCode | Grant::ClientCredentials => {
                AuthError::ExchangeFailure { status, message }
            }
        }
    }
}

/// OAuth error body (`{"error": "...", "error_description": "..."}`).
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn describe_error_body(response: &HttpResponse) -> String {
    if let Ok(body) = response.json::<ErrorBody>() {
        return match body.error_description {
            Some(description) => format!("{}: {}", body.error, description),
            None => body.error,
        };
    }
    let text = response.text().unwrap_or_default();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
    }
}

/// Client for the provider's token endpoint.
#[derive(Clone)]
pub struct TokenEndpoint {
    http: Arc<dyn HttpClient>,
    token_url: Url,
    client_id: String,
    client_secret: String,
    request_timeout: Duration,
}

impl TokenEndpoint {
    /// `http` is expected to already apply the retry policy.
    pub fn new(
        http: Arc<dyn HttpClient>,
        token_url: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http,
            token_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            request_timeout,
        }
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Exchange an authorization code. Client credentials travel in the body.
    #[instrument(skip(self, code, redirect_uri, cancel))]
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenResponse> {
        let request = self.request(Grant::AuthorizationCode, &[
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", Grant::AuthorizationCode.as_str()),
        ])?;
        self.send(Grant::AuthorizationCode, request, cancel).await
    }

    /// Redeem a refresh token with basic client authentication.
    #[instrument(skip(self, refresh_token, cancel))]
    pub async fn refresh(&self, refresh_token: &str, cancel: &CancellationToken) -> Result<TokenResponse> {
        let request = self
            .request(Grant::RefreshToken, &[
                ("grant_type", Grant::RefreshToken.as_str()),
                ("refresh_token", refresh_token),
            ])?
            .basic_auth(&self.client_id, &self.client_secret);
        self.send(Grant::RefreshToken, request, cancel).await
    }

    /// Machine-to-machine grant with basic client authentication.
    #[instrument(skip(self, cancel))]
    pub async fn client_credentials(&self, scope: &str, cancel: &CancellationToken) -> Result<TokenResponse> {
        let mut params = vec![("grant_type", Grant::ClientCredentials.as_str())];
        if !scope.is_empty() {
            params.push(("scope", scope));
        }
        let request = self
            .request(Grant::ClientCredentials, &params)?
            .basic_auth(&self.client_id, &self.client_secret);
        self.send(Grant::ClientCredentials, request, cancel).await
    }

    fn request(&self, grant: Grant, params: &[(&str, &str)]) -> Result<HttpRequest> {
        HttpRequest::new(HttpMethod::Post, self.token_url.as_str())
            .header("Accept", "application/json")
            .timeout(self.request_timeout)
            .form(params)
            .map_err(|e| grant.failure(None, format!("Failed to encode token request: {}", e)))
    }

    async fn send(&self, grant: Grant, request: HttpRequest, cancel: &CancellationToken) -> Result<TokenResponse> {
        debug!(grant = grant.as_str(), "Calling token endpoint");

        let response = match self.http.execute_cancellable(request, cancel).await {
            Ok(response) => response,
            Err(BridgeError::Cancelled) => return Err(AuthError::Cancelled),
            Err(e) => {
                warn!(grant = grant.as_str(), status = ?e.status(), error = %e, "Token request failed");
                return Err(grant.failure(e.status(), e.to_string()));
            }
        };

        if !response.is_success() {
            let message = describe_error_body(&response);
            warn!(
                grant = grant.as_str(),
                status = response.status,
                error = %message,
                "Token endpoint rejected request"
            );
            return Err(grant.failure(Some(response.status), message));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| grant.malformed(format!("Malformed token response: {}", e)))?;
        if token.access_token.is_empty() {
            return Err(grant.malformed("access_token is empty".to_string()));
        }
        if token.expires_in <= 0 {
            return Err(grant.malformed(format!(
                "expires_in must be positive, got {}",
                token.expires_in
            )));
        }

        info!(
            grant = grant.as_str(),
            expires_in = token.expires_in,
            has_refresh_token = token.refresh_token.is_some(),
            "Token endpoint issued token"
        );
        Ok(token)
    }
}
