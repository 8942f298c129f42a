//! # Core Configuration Module
//!
//! Settings and injected capabilities for the authentication core.
//!
//! ## Overview
//!
//! [`AuthSettings`] describes *what* to talk to: provider endpoints, client
//! credentials, redirect URI, scopes, grant mode and timing policy.
//! [`CoreConfig`] pairs those settings with the host capabilities the core
//! needs (`HttpClient`, `BrowserLauncher`, `Clock`) and an optional
//! [`EventBus`].
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - always (desktop default: reqwest)
//! - `BrowserLauncher` - only in [`AuthMode::AuthorizationCode`] (desktop default: system opener)
//!
//! With the `desktop-shims` feature, missing capabilities are filled with
//! `bridge-desktop` implementations. Without it, the builder fails fast with
//! [`Error::CapabilityMissing`] and an actionable message.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{AuthSettings, CoreConfig};
//!
//! let settings = AuthSettings::builder()
//!     .client_id("my-client")
//!     .client_secret("my-secret")
//!     .redirect_uri("http://localhost:8888/callback/")
//!     .build()?;
//!
//! let config = CoreConfig::builder().settings(settings).build()?;
//! ```
//!
//! Settings can also be loaded from an `appsettings.json`-style document
//! ([`AuthSettings::from_json_file`]) or from `AUTH_*` environment variables
//! ([`AuthSettings::from_env`]).

use crate::error::{Error, Result};
use crate::events::EventBus;
use bridge_traits::{BrowserLauncher, Clock, HttpClient, SystemClock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use url::{Host, Url};

pub const DEFAULT_AUTH_BASE_URL: &str = "https://accounts.spotify.com";
pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8888/callback/";
pub const DEFAULT_JSON_SECTION: &str = "SpotifyAuthenticationConfiguration";
pub const DEFAULT_SCOPES: &[&str] = &[
    "user-read-private",
    "user-read-email",
    "user-top-read",
    "playlist-modify-public",
    "playlist-modify-private",
];

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_REFRESH_TOKEN_WINDOW: Duration = Duration::from_secs(3600);
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Backoff grows as `2^n - 1` seconds; beyond this the delays stop being useful.
const MAX_RETRIES_LIMIT: u32 = 10;

/// Which grant produces tokens when the cache cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Interactive: browser consent plus loopback redirect capture.
    #[default]
    AuthorizationCode,
    /// Machine-to-machine: client id/secret only, no refresh token.
    ClientCredentials,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::AuthorizationCode => "authorization_code",
            AuthMode::ClientCredentials => "client_credentials",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "authorization_code" | "interactive" => Ok(AuthMode::AuthorizationCode),
            "client_credentials" | "machine" => Ok(AuthMode::ClientCredentials),
            other => Err(Error::Config(format!("Unknown auth mode '{}'", other))),
        }
    }
}

/// Provider endpoints, client credentials and timing policy.
#[derive(Clone)]
pub struct AuthSettings {
    pub auth_base_url: String,
    /// Relative to `auth_base_url`
    pub authorize_path: String,
    /// Relative to `auth_base_url`
    pub token_path: String,
    /// Base for authenticated resource requests
    pub api_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Loopback URI the provider redirects the browser to
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub mode: AuthMode,
    /// Force the consent dialog even when previously granted
    pub show_dialog: bool,
    /// Upper bound on waiting for the browser redirect
    pub callback_timeout: Duration,
    /// Client-side deadline per HTTP request
    pub request_timeout: Duration,
    /// Local lifetime imposed on refresh tokens
    pub refresh_token_window: Duration,
    pub max_retries: u32,
    /// Keep a refresh token the provider rejected and report the failure
    /// instead of falling back to a full sign-in.
    pub retain_refresh_token_on_failure: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            authorize_path: "authorize".to_string(),
            token_path: "api/token".to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            mode: AuthMode::default(),
            show_dialog: false,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            refresh_token_window: DEFAULT_REFRESH_TOKEN_WINDOW,
            max_retries: DEFAULT_MAX_RETRIES,
            retain_refresh_token_on_failure: false,
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("auth_base_url", &self.auth_base_url)
            .field("api_base_url", &self.api_base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("mode", &self.mode)
            .field("callback_timeout", &self.callback_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

fn join_url(base: &str, path: &str) -> Result<Url> {
    let base = Url::parse(&format!("{}/", base.trim_end_matches('/')))
        .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", base, e)))?;
    base.join(path.trim_start_matches('/'))
        .map_err(|e| Error::Config(format!("Invalid endpoint path '{}': {}", path, e)))
}

impl AuthSettings {
    pub fn builder() -> AuthSettingsBuilder {
        AuthSettingsBuilder::default()
    }

    /// Absolute authorize endpoint.
    pub fn authorize_url(&self) -> Result<Url> {
        join_url(&self.auth_base_url, &self.authorize_path)
    }

    /// Absolute token endpoint.
    pub fn token_url(&self) -> Result<Url> {
        join_url(&self.auth_base_url, &self.token_path)
    }

    pub fn redirect_url(&self) -> Result<Url> {
        Url::parse(&self.redirect_uri)
            .map_err(|e| Error::Config(format!("Invalid redirect URI '{}': {}", self.redirect_uri, e)))
    }

    /// Scopes joined with spaces, as sent on the wire.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("Client id cannot be empty".to_string()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(Error::Config("Client secret cannot be empty".to_string()));
        }

        self.authorize_url()?;
        self.token_url()?;
        Url::parse(&self.api_base_url).map_err(|e| {
            Error::Config(format!("Invalid API base URL '{}': {}", self.api_base_url, e))
        })?;

        if self.mode == AuthMode::AuthorizationCode {
            let redirect = self.redirect_url()?;
            if redirect.scheme() != "http" {
                return Err(Error::Config(format!(
                    "Redirect URI must use http for loopback capture, got '{}'",
                    redirect.scheme()
                )));
            }
            if !is_loopback_host(&redirect) {
                return Err(Error::Config(format!(
                    "Redirect URI host must be a loopback address, got '{}'",
                    redirect.host_str().unwrap_or_default()
                )));
            }
        }

        if self.callback_timeout.is_zero() {
            return Err(Error::Config("Callback timeout must be greater than 0".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("Request timeout must be greater than 0".to_string()));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(Error::Config(format!(
                "Max retries {} exceeds limit of {}",
                self.max_retries, MAX_RETRIES_LIMIT
            )));
        }

        Ok(())
    }

    /// Load settings from a JSON document section with PascalCase keys.
    ///
    /// ```json
    /// {
    ///   "SpotifyAuthenticationConfiguration": {
    ///     "AuthBaseUrl": "https://accounts.spotify.com",
    ///     "ClientId": "...",
    ///     "ClientSecret": "...",
    ///     "RedirectUri": "http://localhost:8888/callback/",
    ///     "Scope": "user-read-private user-read-email"
    ///   }
    /// }
    /// ```
    pub fn from_json_file(path: impl AsRef<Path>, section: &str) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read settings file {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&contents, section)
    }

    pub fn from_json_str(json: &str, section: &str) -> Result<Self> {
        let mut document: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid settings JSON: {}", e)))?;
        let section_value = document
            .get_mut(section)
            .map(serde_json::Value::take)
            .ok_or_else(|| Error::Config(format!("Settings section '{}' not found", section)))?;
        let file: SettingsFileSection = serde_json::from_value(section_value)
            .map_err(|e| Error::Config(format!("Invalid settings section '{}': {}", section, e)))?;

        let mut builder = Self::builder()
            .client_id(file.client_id)
            .client_secret(file.client_secret);
        if let Some(url) = file.auth_base_url {
            builder = builder.auth_base_url(url);
        }
        if let Some(url) = file.api_base_url {
            builder = builder.api_base_url(url);
        }
        if let Some(uri) = file.redirect_uri {
            builder = builder.redirect_uri(uri);
        }
        if let Some(scope) = file.scope {
            builder = builder.scopes(scope.split_whitespace());
        }
        if let Some(mode) = file.mode {
            builder = builder.mode(mode.parse()?);
        }
        builder.build()
    }

    /// Load settings from `AUTH_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| {
                Error::Config(format!("Environment variable {} is required", key))
            })
        };

        let mut builder = Self::builder()
            .client_id(required("AUTH_CLIENT_ID")?)
            .client_secret(required("AUTH_CLIENT_SECRET")?);

        if let Some(uri) = lookup("AUTH_REDIRECT_URI") {
            builder = builder.redirect_uri(uri);
        }
        if let Some(url) = lookup("AUTH_BASE_URL") {
            builder = builder.auth_base_url(url);
        }
        if let Some(scopes) = lookup("AUTH_SCOPES") {
            builder = builder.scopes(scopes.split_whitespace());
        }
        if let Some(mode) = lookup("AUTH_MODE") {
            builder = builder.mode(mode.parse()?);
        }
        builder.build()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SettingsFileSection {
    auth_base_url: Option<String>,
    api_base_url: Option<String>,
    client_id: String,
    client_secret: String,
    redirect_uri: Option<String>,
    scope: Option<String>,
    mode: Option<String>,
}

/// Builder for [`AuthSettings`]; unset fields keep their defaults.
#[derive(Debug, Default)]
pub struct AuthSettingsBuilder {
    settings: AuthSettings,
}

impl AuthSettingsBuilder {
    pub fn auth_base_url(mut self, url: impl Into<String>) -> Self {
        self.settings.auth_base_url = url.into();
        self
    }

    pub fn authorize_path(mut self, path: impl Into<String>) -> Self {
        self.settings.authorize_path = path.into();
        self
    }

    pub fn token_path(mut self, path: impl Into<String>) -> Self {
        self.settings.token_path = path.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.settings.api_base_url = url.into();
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.settings.client_id = id.into();
        self
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.settings.client_secret = secret.into();
        self
    }

    pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.settings.redirect_uri = uri.into();
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn mode(mut self, mode: AuthMode) -> Self {
        self.settings.mode = mode;
        self
    }

    pub fn show_dialog(mut self, show: bool) -> Self {
        self.settings.show_dialog = show;
        self
    }

    pub fn callback_timeout(mut self, timeout: Duration) -> Self {
        self.settings.callback_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.settings.request_timeout = timeout;
        self
    }

    pub fn refresh_token_window(mut self, window: Duration) -> Self {
        self.settings.refresh_token_window = window;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.settings.max_retries = retries;
        self
    }

    pub fn retain_refresh_token_on_failure(mut self, retain: bool) -> Self {
        self.settings.retain_refresh_token_on_failure = retain;
        self
    }

    /// Validates and returns the settings.
    pub fn build(self) -> Result<AuthSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

/// Settings plus injected host capabilities.
#[derive(Clone)]
pub struct CoreConfig {
    pub settings: AuthSettings,
    pub http_client: Arc<dyn HttpClient>,
    /// Present whenever `settings.mode` is `AuthorizationCode`
    pub browser_launcher: Option<Arc<dyn BrowserLauncher>>,
    pub clock: Arc<dyn Clock>,
    pub event_bus: Option<EventBus>,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("settings", &self.settings)
            .field("http_client", &"<dyn HttpClient>")
            .field("has_browser_launcher", &self.browser_launcher.is_some())
            .field("has_event_bus", &self.event_bus.is_some())
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Other hosts: inject a platform-native adapter with .http_client()."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn browser_launcher_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "BrowserLauncher".to_string(),
        message: "Authorization-code mode needs a BrowserLauncher to open the consent page. \
                 Desktop: enable the 'desktop-shims' feature to use the default SystemBrowserLauncher. \
                 Other hosts: inject one with .browser_launcher(), or switch to client-credentials mode."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(settings: &AuthSettings) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(settings.request_timeout).map_err(|e| {
        Error::Internal(format!("Failed to create default HttpClient: {}", e))
    })?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_settings: &AuthSettings) -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_browser_launcher() -> Result<Arc<dyn BrowserLauncher>> {
    Ok(Arc::new(bridge_desktop::SystemBrowserLauncher::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_browser_launcher() -> Result<Arc<dyn BrowserLauncher>> {
    Err(browser_launcher_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    settings: Option<AuthSettings>,
    http_client: Option<Arc<dyn HttpClient>>,
    browser_launcher: Option<Arc<dyn BrowserLauncher>>,
    clock: Option<Arc<dyn Clock>>,
    event_bus: Option<EventBus>,
}

impl CoreConfigBuilder {
    pub fn settings(mut self, settings: AuthSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn browser_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.browser_launcher = Some(launcher);
        self
    }

    /// Time source for token expiry (default: [`SystemClock`]).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Builds the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when settings are missing or invalid
    /// - [`Error::CapabilityMissing`] when a required capability is absent and
    ///   no desktop default is available
    pub fn build(self) -> Result<CoreConfig> {
        let settings = self.settings.ok_or_else(|| {
            Error::Config("Auth settings are required. Use .settings() to set them.".to_string())
        })?;
        settings.validate()?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(&settings)?,
        };

        let browser_launcher = match (settings.mode, self.browser_launcher) {
            (_, Some(launcher)) => Some(launcher),
            (AuthMode::AuthorizationCode, None) => Some(provide_default_browser_launcher()?),
            (AuthMode::ClientCredentials, None) => None,
        };

        Ok(CoreConfig {
            settings,
            http_client,
            browser_launcher,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_bus: self.event_bus,
        })
    }
}

/// Whether `url` names this machine: `localhost` or any loopback IP.
pub fn is_loopback_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{BrowserProcess, HttpRequest, HttpResponse};
    use mockall::mock;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    struct NoopLauncher;

    impl BrowserLauncher for NoopLauncher {
        fn launch(&self, _url: &str) -> BridgeResult<Box<dyn BrowserProcess>> {
            Err(bridge_traits::BridgeError::NotAvailable("test".into()))
        }
    }

    fn valid_settings() -> AuthSettingsBuilder {
        AuthSettings::builder().client_id("id").client_secret("secret")
    }

    #[test]
    fn test_defaults() {
        let settings = valid_settings().build().unwrap();
        assert_eq!(settings.redirect_uri, DEFAULT_REDIRECT_URI);
        assert_eq!(settings.callback_timeout, Duration::from_secs(300));
        assert_eq!(settings.request_timeout, Duration::from_secs(60));
        assert_eq!(settings.refresh_token_window, Duration::from_secs(3600));
        assert_eq!(settings.max_retries, 5);
        assert!(!settings.show_dialog);
        assert!(!settings.retain_refresh_token_on_failure);
        assert_eq!(settings.mode, AuthMode::AuthorizationCode);
    }

    #[test]
    fn test_endpoint_urls() {
        let settings = valid_settings().build().unwrap();
        assert_eq!(
            settings.authorize_url().unwrap().as_str(),
            "https://accounts.spotify.com/authorize"
        );
        assert_eq!(
            settings.token_url().unwrap().as_str(),
            "https://accounts.spotify.com/api/token"
        );

        let nested = valid_settings()
            .auth_base_url("http://127.0.0.1:9000/oauth/")
            .token_path("/token")
            .build()
            .unwrap();
        assert_eq!(
            nested.token_url().unwrap().as_str(),
            "http://127.0.0.1:9000/oauth/token"
        );
    }

    #[test]
    fn test_validate_rejects_missing_credentials() {
        let err = AuthSettings::builder().client_secret("s").build().unwrap_err();
        assert!(err.to_string().contains("Client id"));

        let err = AuthSettings::builder().client_id("i").build().unwrap_err();
        assert!(err.to_string().contains("Client secret"));
    }

    #[test]
    fn test_validate_rejects_non_loopback_redirect() {
        let err = valid_settings()
            .redirect_uri("http://example.com/callback")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("loopback"));

        let err = valid_settings()
            .redirect_uri("https://localhost:8888/callback")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("http"));
    }

    #[test]
    fn test_any_loopback_ip_accepted() {
        for uri in [
            "http://localhost:8888/callback/",
            "http://127.0.0.1:8888/callback/",
            "http://127.0.0.2:8888/callback/",
            "http://[::1]:8888/callback/",
        ] {
            assert!(valid_settings().redirect_uri(uri).build().is_ok(), "{}", uri);
        }
        assert!(valid_settings()
            .redirect_uri("http://10.0.0.1:8888/callback/")
            .build()
            .is_err());
    }

    #[test]
    fn test_client_credentials_ignores_redirect() {
        let settings = valid_settings()
            .mode(AuthMode::ClientCredentials)
            .redirect_uri("https://example.com/unused")
            .build();
        assert!(settings.is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        assert!(valid_settings().callback_timeout(Duration::ZERO).build().is_err());
        assert!(valid_settings().request_timeout(Duration::ZERO).build().is_err());
        assert!(valid_settings().max_retries(11).build().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let settings = valid_settings().client_secret("hunter2").build().unwrap();
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_auth_mode_parsing() {
        assert_eq!("client_credentials".parse::<AuthMode>().unwrap(), AuthMode::ClientCredentials);
        assert_eq!("Authorization-Code".parse::<AuthMode>().unwrap(), AuthMode::AuthorizationCode);
        assert!("implicit".parse::<AuthMode>().is_err());
    }

    #[test]
    fn test_from_json_str_reads_pascal_case_section() {
        let json = r#"{
            "SpotifyAuthenticationConfiguration": {
                "AuthBaseUrl": "http://127.0.0.1:9000",
                "ClientId": "abc",
                "ClientSecret": "def",
                "RedirectUri": "http://127.0.0.1:8890/callback/",
                "Scope": "user-read-private playlist-modify-public"
            },
            "SpotifyClientConfiguration": { "BaseUrl": "https://api.spotify.com/v1" }
        }"#;

        let settings = AuthSettings::from_json_str(json, DEFAULT_JSON_SECTION).unwrap();
        assert_eq!(settings.client_id, "abc");
        assert_eq!(settings.auth_base_url, "http://127.0.0.1:9000");
        assert_eq!(settings.redirect_uri, "http://127.0.0.1:8890/callback/");
        assert_eq!(settings.scopes, vec!["user-read-private", "playlist-modify-public"]);
    }

    #[test]
    fn test_from_json_file_missing_section() {
        let path = std::env::temp_dir().join(format!("authsettings-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"Other": {}}"#).unwrap();

        let err = AuthSettings::from_json_file(&path, DEFAULT_JSON_SECTION).unwrap_err();
        assert!(err.to_string().contains("not found"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_from_lookup() {
        let vars = std::collections::HashMap::from([
            ("AUTH_CLIENT_ID", "env-id"),
            ("AUTH_CLIENT_SECRET", "env-secret"),
            ("AUTH_MODE", "client_credentials"),
            ("AUTH_SCOPES", "a b"),
        ]);
        let settings = AuthSettings::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(settings.client_id, "env-id");
        assert_eq!(settings.mode, AuthMode::ClientCredentials);
        assert_eq!(settings.scope_string(), "a b");

        let missing = AuthSettings::from_lookup(|_| None).unwrap_err();
        assert!(missing.to_string().contains("AUTH_CLIENT_ID"));
    }

    #[test]
    fn test_builder_requires_settings() {
        let err = CoreConfig::builder()
            .http_client(Arc::new(MockHttp::new()))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("settings are required"));
    }

    #[test]
    fn test_builder_with_injected_capabilities() {
        let bus = EventBus::new(8);
        let config = CoreConfig::builder()
            .settings(valid_settings().build().unwrap())
            .http_client(Arc::new(MockHttp::new()))
            .browser_launcher(Arc::new(NoopLauncher))
            .event_bus(bus)
            .build()
            .unwrap();

        assert!(config.browser_launcher.is_some());
        assert!(config.event_bus.is_some());
    }

    #[test]
    fn test_client_credentials_needs_no_browser() {
        let config = CoreConfig::builder()
            .settings(valid_settings().mode(AuthMode::ClientCredentials).build().unwrap())
            .http_client(Arc::new(MockHttp::new()))
            .build()
            .unwrap();

        assert!(config.browser_launcher.is_none());
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_http_client_fails_fast() {
        let err = CoreConfig::builder()
            .settings(valid_settings().build().unwrap())
            .browser_launcher(Arc::new(NoopLauncher))
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::CapabilityMissing { ref capability, .. } if capability == "HttpClient"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_browser_launcher_fails_fast() {
        let err = CoreConfig::builder()
            .settings(valid_settings().build().unwrap())
            .http_client(Arc::new(MockHttp::new()))
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::CapabilityMissing { ref capability, .. } if capability == "BrowserLauncher"));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_defaults_fill_capabilities() {
        let config = CoreConfig::builder()
            .settings(valid_settings().build().unwrap())
            .build()
            .unwrap();

        assert!(config.browser_launcher.is_some());
    }
}
