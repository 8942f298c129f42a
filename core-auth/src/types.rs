use crate::error::{AuthError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Share of the server-declared lifetime during which a cached access token
/// is handed out, in per-mille.
pub const ACCESS_TOKEN_LIFETIME_PER_MILLE: i64 = 800;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// JSON body returned by the token endpoint for every grant type.
///
/// # Examples
///
/// ```
/// use core_auth::TokenResponse;
///
/// let response: TokenResponse = serde_json::from_str(
///     r#"{"access_token":"at","token_type":"Bearer","expires_in":3600}"#,
/// ).unwrap();
/// assert_eq!(response.expires_in, 3600);
/// assert!(response.refresh_token.is_none());
/// ```
#[derive(Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Seconds until the access token expires
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_expires_in() -> i64 {
    DEFAULT_EXPIRES_IN_SECS
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scope", &self.scope)
            .finish()
    }
}

/// Cached credential with locally derived expiry.
///
/// `access_expires_at` is issue time plus 80% of the declared lifetime;
/// `refresh_expires_at` is a local window because providers do not declare
/// refresh-token lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: Option<String>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

fn offset(at: DateTime<Utc>, delta: chrono::Duration) -> DateTime<Utc> {
    at.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn offset_std(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    match chrono::Duration::from_std(duration) {
        Ok(delta) => offset(at, delta),
        Err(_) => DateTime::<Utc>::MAX_UTC,
    }
}

impl TokenRecord {
    /// Build a record from a fresh token response issued at `issued_at`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use core_auth::{TokenRecord, TokenResponse};
    ///
    /// let response: TokenResponse =
    ///     serde_json::from_str(r#"{"access_token":"at","expires_in":3600}"#).unwrap();
    /// let now = Utc::now();
    /// let record = TokenRecord::from_response(&response, now, std::time::Duration::from_secs(3600));
    /// assert_eq!(record.access_expires_at, now + Duration::seconds(2880));
    /// ```
    pub fn from_response(
        response: &TokenResponse,
        issued_at: DateTime<Utc>,
        refresh_window: Duration,
    ) -> Self {
        let lifetime_ms = response
            .expires_in
            .max(0)
            .saturating_mul(ACCESS_TOKEN_LIFETIME_PER_MILLE);
        let refresh_token = response
            .refresh_token
            .clone()
            .filter(|token| !token.is_empty());
        let refresh_expires_at = refresh_token
            .as_ref()
            .map(|_| offset_std(issued_at, refresh_window));

        Self {
            access_token: response.access_token.clone(),
            access_expires_at: offset(issued_at, chrono::Duration::milliseconds(lifetime_ms)),
            refresh_token,
            refresh_expires_at,
            scope: response.scope.clone(),
        }
    }

    /// Merge a refresh-grant response into this record.
    ///
    /// A rotated refresh token replaces the old one with a fresh window;
    /// otherwise the existing refresh token and its window are kept.
    pub fn refreshed(
        &self,
        response: &TokenResponse,
        issued_at: DateTime<Utc>,
        refresh_window: Duration,
    ) -> Self {
        let mut next = Self::from_response(response, issued_at, refresh_window);
        if next.refresh_token.is_none() {
            next.refresh_token = self.refresh_token.clone();
            next.refresh_expires_at = self.refresh_expires_at;
        }
        if next.scope.is_none() {
            next.scope = self.scope.clone();
        }
        next
    }

    /// Drop the refresh token, keeping the access token.
    pub fn without_refresh_token(mut self) -> Self {
        self.refresh_token = None;
        self.refresh_expires_at = None;
        self
    }

    pub fn access_token_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.access_expires_at
    }

    /// The refresh token, if one exists and its window has not passed.
    pub fn refresh_token_valid_at(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.refresh_token, self.refresh_expires_at) {
            (Some(token), Some(expires_at)) if now < expires_at => Some(token.as_str()),
            _ => None,
        }
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"[REDACTED]")
            .field("access_expires_at", &self.access_expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("refresh_expires_at", &self.refresh_expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Single-use CSRF state value.
#[derive(Clone)]
pub struct Nonce(String);

impl Nonce {
    /// 16 random bytes, base64url without padding.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against a received value.
    pub fn matches(&self, received: &str) -> bool {
        constant_time_eq(self.0.as_bytes(), received.as_bytes())
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Nonce([REDACTED])")
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Parsed query parameters of the one captured redirect request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CallbackResult {
    pub code: Option<String>,
    pub error: Option<String>,
    pub state: Option<String>,
}

impl CallbackResult {
    /// Parse an HTTP request target such as `/callback/?code=abc&state=xyz`.
    pub fn from_request_target(target: &str) -> Result<Self> {
        if !target.starts_with('/') {
            return Err(AuthError::InvalidResponse(
                "callback request target must be origin-form".to_string(),
            ));
        }
        let url = Url::parse(&format!("http://127.0.0.1{}", target)).map_err(|e| {
            AuthError::InvalidResponse(format!("invalid callback request target: {}", e))
        })?;

        let mut result = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => result.code = Some(value.into_owned()),
                "error" => result.error = Some(value.into_owned()),
                "state" => result.state = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(result)
    }
}

impl fmt::Debug for CallbackResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackResult")
            .field("code", &self.code.as_ref().map(|_| "[REDACTED]"))
            .field("error", &self.error)
            .field("state", &self.state.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// One interactive sign-in attempt: the nonce binds the authorize request to
/// its redirect and is discarded with the attempt.
#[derive(Debug, Clone)]
pub struct AuthorizationAttempt {
    pub id: Uuid,
    pub nonce: Nonce,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
}

impl AuthorizationAttempt {
    pub fn new(redirect_uri: Url, scopes: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            nonce: Nonce::generate(),
            redirect_uri,
            scopes,
        }
    }

    /// Classify the captured redirect and return the authorization code.
    ///
    /// State is checked first so nothing from a forged redirect is acted on,
    /// then the provider error, then the presence of a code.
    pub fn validate(&self, callback: CallbackResult) -> Result<String> {
        let state_ok = callback
            .state
            .as_deref()
            .is_some_and(|state| self.nonce.matches(state));
        if !state_ok {
            return Err(AuthError::StateMismatch {
                expected: self.nonce.as_str().to_string(),
                actual: callback.state,
            });
        }

        if let Some(error) = callback.error {
            return Err(AuthError::CallbackError { error });
        }

        callback
            .code
            .filter(|code| !code.is_empty())
            .ok_or(AuthError::MissingAuthorizationCode)
    }
}

/// Observable progress of the authorization-code flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowState {
    Idle,
    AwaitingCallback,
    ExchangingCode,
    Authenticated,
    StateMismatch,
    CallbackError,
    MissingCode,
    ExchangeFailure,
    Cancelled,
    /// Listener, browser or timeout failure before a redirect was classified.
    Failed,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            FlowState::Idle | FlowState::AwaitingCallback | FlowState::ExchangingCode
        )
    }

    /// Terminal state reached when a flow exits with `error`.
    pub fn from_error(error: &AuthError) -> Self {
        match error {
            AuthError::StateMismatch { .. } => FlowState::StateMismatch,
            AuthError::CallbackError { .. } => FlowState::CallbackError,
            AuthError::MissingAuthorizationCode => FlowState::MissingCode,
            AuthError::ExchangeFailure { .. } | AuthError::InvalidResponse(_) => {
                FlowState::ExchangeFailure
            }
            AuthError::Cancelled => FlowState::Cancelled,
            _ => FlowState::Failed,
        }
    }
}
