//! Loopback redirect capture.
//!
//! [`CallbackListener::capture`] binds the redirect URI's port, opens the
//! authorize URL in the browser, waits for exactly one redirect request and
//! returns its query parameters. The listener sockets, the port claim and the
//! browser process are owned by a [`CaptureSession`] whose `Drop` releases
//! them, so every exit path (success, failure, timeout, cancellation or the
//! caller dropping the future) cleans up.

use crate::error::{AuthError, Result};
use crate::types::CallbackResult;
use bridge_traits::browser::{BrowserLauncher, BrowserProcess};
use core_async::sync::CancellationToken;
use core_async::time::{sleep, timeout};
use core_runtime::config::is_loopback_host;
use futures::future::select_all;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use std::io::ErrorKind;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, instrument, warn};
use url::{Host, Url};

const SUCCESS_HTML: &str = "<html><body><h1>Authentication complete</h1><p>You can close this window and return to the application.</p></body></html>";
const ERROR_HTML: &str = "<html><body><h1>Authentication failed</h1><p>You can close this window and try again.</p></body></html>";

const REQUEST_BUFFER_SIZE: usize = 8192;

/// How long a connected client gets to send its request line.
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(5);

static CLAIMED_PORTS: OnceLock<Mutex<HashSet<u16>>> = OnceLock::new();

fn claimed_ports() -> &'static Mutex<HashSet<u16>> {
    CLAIMED_PORTS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// In-process reservation of a loopback port for one capture.
#[derive(Debug)]
struct PortClaim {
    port: u16,
}

impl PortClaim {
    fn acquire(port: u16) -> Option<Self> {
        let mut ports = claimed_ports()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        ports.insert(port).then(|| Self { port })
    }
}

impl Drop for PortClaim {
    fn drop(&mut self) {
        let mut ports = claimed_ports()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        ports.remove(&self.port);
    }
}

/// Everything one capture holds open.
struct CaptureSession {
    listeners: Vec<TcpListener>,
    browser: Option<Box<dyn BrowserProcess>>,
    _claim: PortClaim,
}

impl CaptureSession {
    async fn bind(redirect_uri: &Url) -> Result<Self> {
        let port = redirect_uri.port_or_known_default().ok_or_else(|| {
            AuthError::Configuration(format!("Redirect URI '{}' has no port", redirect_uri))
        })?;
        let addresses = loopback_addresses(redirect_uri)?;
        let display = format!("{}:{}", redirect_uri.host_str().unwrap_or("localhost"), port);

        let claim = PortClaim::acquire(port).ok_or_else(|| AuthError::ListenerBindFailure {
            address: display.clone(),
            reason: "another sign-in attempt is already listening on this port".to_string(),
        })?;

        let mut listeners = Vec::with_capacity(addresses.len());
        let mut unavailable = Vec::new();
        for ip in addresses {
            let address = SocketAddr::new(ip, port);
            match TcpListener::bind(address).await {
                Ok(listener) => listeners.push(listener),
                Err(e) if address_family_unavailable(&e) => {
                    unavailable.push(format!("{} ({})", address, e))
                }
                // Someone else holds one of the addresses the browser may
                // resolve to, so the redirect could land on their socket.
                Err(e) => {
                    return Err(AuthError::ListenerBindFailure {
                        address: address.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }

        if listeners.is_empty() {
            return Err(AuthError::ListenerBindFailure {
                address: display,
                reason: unavailable.join("; "),
            });
        }
        if !unavailable.is_empty() {
            debug!(errors = %unavailable.join("; "), "Some loopback addresses are unavailable");
        }

        Ok(Self {
            listeners,
            browser: None,
            _claim: claim,
        })
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            browser.terminate();
        }
    }
}

async fn accept(listeners: &[TcpListener]) -> std::io::Result<(TcpStream, SocketAddr)> {
    let accepts = listeners.iter().map(|listener| Box::pin(listener.accept()));
    let (result, _, _) = select_all(accepts).await;
    result
}

/// Accept connections until one carries a parseable request line.
///
/// Each connection is read on its own, so an idle socket (a browser
/// preconnect, say) does not hold up the redirect behind it.
async fn next_callback(listeners: &[TcpListener]) -> Result<CallbackResult> {
    let mut pending = FuturesUnordered::new();
    loop {
        tokio::select! {
            accepted = accept(listeners) => match accepted {
                Ok((stream, peer)) => pending.push(read_connection(stream, peer)),
                Err(e) => warn!(error = %e, "Failed to accept redirect connection"),
            },
            Some((mut stream, peer, target)) = pending.next() => match target {
                Some(target) => match CallbackResult::from_request_target(&target) {
                    Ok(result) => {
                        debug!(%peer, "Captured redirect request");
                        respond(&mut stream, &result).await;
                        return Ok(result);
                    }
                    Err(e) => {
                        debug!(%peer, error = %e, "Ignoring malformed redirect request");
                        respond_bad_request(&mut stream).await;
                    }
                },
                None => debug!(%peer, "Connection closed without a request"),
            },
        }
    }
}

async fn read_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
) -> (TcpStream, SocketAddr, Option<String>) {
    let target = read_request_target(&mut stream).await;
    (stream, peer, target)
}

fn address_family_unavailable(error: &std::io::Error) -> bool {
    !matches!(error.kind(), ErrorKind::AddrInUse | ErrorKind::PermissionDenied)
}

fn loopback_addresses(redirect_uri: &Url) -> Result<Vec<IpAddr>> {
    if !is_loopback_host(redirect_uri) {
        return Err(AuthError::Configuration(format!(
            "Redirect URI '{}' is not a loopback address",
            redirect_uri
        )));
    }
    Ok(match redirect_uri.host() {
        Some(Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
        Some(Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
        _ => vec![IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V6(Ipv6Addr::LOCALHOST)],
    })
}

/// Read the request line, which may arrive over several TCP segments.
async fn read_request_target(stream: &mut TcpStream) -> Option<String> {
    let mut reader = BufReader::new((&mut *stream).take(REQUEST_BUFFER_SIZE as u64));
    let mut line = Vec::with_capacity(256);
    match timeout(CONNECTION_READ_TIMEOUT, reader.read_until(b'\n', &mut line)).await {
        Ok(Ok(size)) if size > 0 && line.ends_with(b"\n") => {}
        _ => return None,
    }

    let request_line = String::from_utf8_lossy(&line);
    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("GET"), Some(target), Some(version), None) if version.starts_with("HTTP/") => {
            Some(target.to_string())
        }
        _ => None,
    }
}

async fn respond(stream: &mut TcpStream, result: &CallbackResult) {
    let failed = result.error.is_some() || result.code.is_none();
    let (status, body) = if failed {
        ("400 Bad Request", ERROR_HTML)
    } else {
        ("200 OK", SUCCESS_HTML)
    };
    write_response(stream, status, body).await;
}

async fn respond_bad_request(stream: &mut TcpStream) {
    write_response(stream, "400 Bad Request", ERROR_HTML).await;
}

async fn write_response(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "Failed to write callback page");
    }
    let _ = stream.shutdown().await;
}

/// Pairs the browser launch with the loopback listener that receives its
/// redirect.
#[derive(Clone)]
pub struct CallbackListener {
    launcher: Arc<dyn BrowserLauncher>,
    timeout: Duration,
}

impl CallbackListener {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, timeout: Duration) -> Self {
        Self { launcher, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open `authorize_url` in the browser and capture one redirect to
    /// `redirect_uri`.
    ///
    /// The listener is bound before the browser starts so a fast redirect
    /// cannot arrive before anyone is listening.
    ///
    /// # Errors
    ///
    /// - [`AuthError::ListenerBindFailure`] if the port is taken, including by
    ///   a concurrent capture in this process
    /// - [`AuthError::BrowserLaunchFailed`] if the browser cannot be started
    /// - [`AuthError::CallbackTimeout`] if no redirect arrives in time
    /// - [`AuthError::Cancelled`] if `cancel` fires first
    #[instrument(skip(self, authorize_url, redirect_uri, cancel), fields(redirect_uri = %redirect_uri))]
    pub async fn capture(
        &self,
        authorize_url: &Url,
        redirect_uri: &Url,
        cancel: &CancellationToken,
    ) -> Result<CallbackResult> {
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        let mut session = CaptureSession::bind(redirect_uri).await?;
        debug!(listeners = session.listeners.len(), "Listening for redirect");

        let browser = self
            .launcher
            .launch(authorize_url.as_str())
            .map_err(|e| AuthError::BrowserLaunchFailed(e.to_string()))?;
        session.browser = Some(browser);
        info!("Opened browser for user consent");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
            _ = sleep(self.timeout) => Err(AuthError::CallbackTimeout { waited: self.timeout }),
            result = next_callback(&session.listeners) => result,
        };

        if let Err(ref e) = outcome {
            warn!(error = %e, "Redirect capture ended without a callback");
        }
        drop(session);
        outcome
    }
}
