#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::Clock;
use bridge_traits::{BrowserLauncher, BrowserProcess};
use chrono::{DateTime, Utc};
use core_auth::Authenticator;
use core_runtime::config::{AuthMode, AuthSettings, CoreConfig};
use core_runtime::events::EventBus;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

pub const TOKEN_JSON: &str = r#"{"access_token":"at-1","token_type":"Bearer","expires_in":3600,"refresh_token":"rt-1","scope":"user-read-private"}"#;

pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn port_is_free(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Returns scripted responses in order and records every request.
#[derive(Default)]
pub struct ScriptedHttpClient {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(HttpResponse::new(status, body.to_string()));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| r.body_text().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BridgeError::OperationFailed("no scripted response".into()))
    }
}

/// What the fake browser does after "the user" finishes on the consent page.
#[derive(Debug, Clone)]
pub enum Redirect {
    /// Redirect with `code` and the state from the authorize URL.
    Code(String),
    /// Redirect with `error` and the state from the authorize URL.
    Error(String),
    /// Redirect with `code` and a state that was never issued.
    ForgedState(String),
    /// Redirect with only the correct state.
    StateOnly,
    /// Never redirect.
    Silent,
}

/// Browser stand-in that performs the provider redirect over a real socket.
pub struct FakeBrowser {
    redirect: Redirect,
    launches: AtomicUsize,
    terminated: Arc<AtomicBool>,
    authorize_urls: Mutex<Vec<Url>>,
    pages: Arc<Mutex<Vec<String>>>,
}

impl FakeBrowser {
    pub fn new(redirect: Redirect) -> Arc<Self> {
        Arc::new(Self {
            redirect,
            launches: AtomicUsize::new(0),
            terminated: Arc::new(AtomicBool::new(false)),
            authorize_urls: Mutex::new(Vec::new()),
            pages: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn authorize_urls(&self) -> Vec<Url> {
        self.authorize_urls.lock().unwrap().clone()
    }

    /// Raw HTTP responses the listener sent back to the "browser".
    pub fn pages(&self) -> Vec<String> {
        self.pages.lock().unwrap().clone()
    }

    /// Wait until `count` pages arrived, or give up after two seconds.
    pub async fn wait_for_pages(&self, count: usize) -> Vec<String> {
        for _ in 0..200 {
            let pages = self.pages();
            if pages.len() >= count {
                return pages;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.pages()
    }
}

struct FakeProcess {
    terminated: Arc<AtomicBool>,
}

impl BrowserProcess for FakeProcess {
    fn terminate(&mut self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    fn is_running(&mut self) -> bool {
        !self.terminated.load(Ordering::SeqCst)
    }
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

impl BrowserLauncher for FakeBrowser {
    fn launch(&self, url: &str) -> BridgeResult<Box<dyn BrowserProcess>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.terminated.store(false, Ordering::SeqCst);

        let authorize = Url::parse(url).map_err(|e| BridgeError::OperationFailed(e.to_string()))?;
        self.authorize_urls.lock().unwrap().push(authorize.clone());

        let state = query_value(&authorize, "state").unwrap_or_default();
        let redirect_uri = query_value(&authorize, "redirect_uri")
            .and_then(|uri| Url::parse(&uri).ok())
            .ok_or_else(|| BridgeError::OperationFailed("authorize URL lacks redirect_uri".into()))?;

        let query = match &self.redirect {
            Redirect::Code(code) => Some(format!("code={}&state={}", code, state)),
            Redirect::Error(error) => Some(format!("error={}&state={}", error, state)),
            Redirect::ForgedState(code) => Some(format!("code={}&state=forged", code)),
            Redirect::StateOnly => Some(format!("state={}", state)),
            Redirect::Silent => None,
        };

        if let Some(query) = query {
            let port = redirect_uri.port_or_known_default().unwrap_or(80);
            let target = format!("{}?{}", redirect_uri.path(), query);
            let pages = self.pages.clone();
            tokio::spawn(async move {
                if let Ok(page) = send_get(port, &target).await {
                    pages.lock().unwrap().push(page);
                }
            });
        }

        Ok(Box::new(FakeProcess {
            terminated: self.terminated.clone(),
        }))
    }
}

async fn send_get(port: u16, target: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: 127.0.0.1:{}\r\nConnection: close\r\n\r\n",
        target, port
    );
    stream.write_all(request.as_bytes()).await?;
    let mut page = String::new();
    stream.read_to_string(&mut page).await?;
    Ok(page)
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc::now()),
        })
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn interactive_settings(port: u16) -> AuthSettings {
    AuthSettings::builder()
        .auth_base_url("https://accounts.example.com")
        .api_base_url("https://api.example.com/v1")
        .client_id("client")
        .client_secret("secret")
        .redirect_uri(format!("http://127.0.0.1:{}/callback/", port))
        .scopes(["user-read-private"])
        .callback_timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

pub fn machine_settings() -> AuthSettings {
    AuthSettings::builder()
        .auth_base_url("https://accounts.example.com")
        .client_id("client")
        .client_secret("secret")
        .mode(AuthMode::ClientCredentials)
        .scopes(["playlist-read-private", "user-top-read"])
        .build()
        .unwrap()
}

pub struct Harness {
    pub authenticator: Arc<Authenticator>,
    pub http: Arc<ScriptedHttpClient>,
    pub browser: Arc<FakeBrowser>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(settings: AuthSettings, redirect: Redirect, bus: Option<EventBus>) -> Harness {
    let http = ScriptedHttpClient::new();
    let browser = FakeBrowser::new(redirect);
    let clock = ManualClock::new();

    let mut builder = CoreConfig::builder()
        .settings(settings)
        .http_client(http.clone())
        .browser_launcher(browser.clone())
        .clock(clock.clone());
    if let Some(bus) = bus {
        builder = builder.event_bus(bus);
    }

    Harness {
        authenticator: Arc::new(Authenticator::new(builder.build().unwrap()).unwrap()),
        http,
        browser,
        clock,
    }
}
