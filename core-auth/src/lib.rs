//! # Authentication Module
//!
//! OAuth 2.0 session core: obtains and maintains a bearer token for a remote
//! resource API.
//!
//! ## Overview
//!
//! - [`Authenticator`] - cache-first entry point with single-flight acquisition
//! - [`oauth::AuthorizationCodeFlow`] - browser consent plus loopback redirect capture
//! - [`client_credentials::ClientCredentialsFlow`] - machine-to-machine grant
//! - [`token_cache::TokenCache`] - access/refresh tokens with derived expiry
//! - [`retry::RetryingHttpClient`] - exponential backoff on transient HTTP failures
//! - [`request::AuthenticatedRequestBuilder`] - bearer-authenticated resource calls
//!
//! Every suspension point (redirect wait, HTTP call, backoff sleep) honours a
//! `CancellationToken`, and every failure is a named [`AuthError`] variant.

pub mod callback;
pub mod client_credentials;
pub mod error;
pub mod manager;
pub mod oauth;
pub mod request;
pub mod retry;
pub mod token_cache;
pub mod token_endpoint;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::{Authenticator, TokenProvider};
pub use request::AuthenticatedRequestBuilder;
pub use types::{AuthorizationAttempt, CallbackResult, FlowState, Nonce, TokenRecord, TokenResponse};
