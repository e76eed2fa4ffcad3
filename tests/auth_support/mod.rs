#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, SubsecRound, Utc};
use ticktick_auth::auth::{
    AuthSession, BrowserLauncher, CodeExchanger, TokenBackend, TokenRecord, TokenValidator,
};
use ticktick_auth::error::AuthError;

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

pub struct InMemoryBackend {
    name: String,
    tokens: Mutex<HashMap<String, TokenRecord>>,
    fail_writes: bool,
    loads: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            tokens: Mutex::new(HashMap::new()),
            fail_writes: false,
            loads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        })
    }

    /// Backend whose `save` always fails, like a locked keyring.
    pub fn failing_writes(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            tokens: Mutex::new(HashMap::new()),
            fail_writes: true,
            loads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        })
    }

    pub fn seed(&self, client_id: &str, token: TokenRecord) {
        self.tokens
            .lock()
            .expect("backend lock poisoned")
            .insert(client_id.to_string(), token);
    }

    pub fn get(&self, client_id: &str) -> Option<TokenRecord> {
        self.tokens
            .lock()
            .expect("backend lock poisoned")
            .get(client_id)
            .cloned()
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Successful writes only.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl TokenBackend for InMemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self, client_id: &str) -> Result<Option<TokenRecord>, AuthError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(client_id))
    }

    fn save(&self, client_id: &str, token: &TokenRecord) -> Result<(), AuthError> {
        if self.fail_writes {
            return Err(AuthError::Persistence(format!("{} is unavailable", self.name)));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.seed(client_id, token.clone());
        Ok(())
    }

    fn clear(&self, client_id: &str) -> Result<(), AuthError> {
        self.tokens
            .lock()
            .expect("backend lock poisoned")
            .remove(client_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validator / exchanger stubs
// ---------------------------------------------------------------------------

/// Accepts unexpired tokens whose access token is on the allow list.
#[derive(Default)]
pub struct StubValidator {
    accepted: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl StubValidator {
    pub fn accepting(tokens: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            accepted: Mutex::new(tokens.iter().map(|t| t.to_string()).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenValidator for StubValidator {
    async fn validate(&self, token: &TokenRecord) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        !token.is_expired_at(Utc::now())
            && self
                .accepted
                .lock()
                .expect("validator lock poisoned")
                .contains(&token.access_token)
    }
}

/// Returns a preset token, or a callback error when none is set.
pub struct StubExchanger {
    token: Option<TokenRecord>,
    calls: AtomicUsize,
}

impl StubExchanger {
    pub fn returning(token: TokenRecord) -> Arc<Self> {
        Arc::new(Self {
            token: Some(token),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            token: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeExchanger for StubExchanger {
    async fn exchange(&self, _session: &AuthSession) -> Result<TokenRecord, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.token
            .clone()
            .ok_or_else(|| AuthError::Callback("user closed the browser".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Browsers
// ---------------------------------------------------------------------------

/// Plays the user: follows the authorization URL's redirect_uri with a fixed code.
pub struct RedirectingBrowser {
    code: String,
    opened: Mutex<Vec<String>>,
}

impl RedirectingBrowser {
    pub fn with_code(code: &str) -> Arc<Self> {
        Arc::new(Self {
            code: code.to_string(),
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().expect("browser lock poisoned").clone()
    }
}

impl BrowserLauncher for RedirectingBrowser {
    fn open(&self, url: &str) -> Result<(), AuthError> {
        self.opened
            .lock()
            .expect("browser lock poisoned")
            .push(url.to_string());
        let parsed = url::Url::parse(url).expect("authorization url");
        let redirect = parsed
            .query_pairs()
            .find(|(key, _)| key == "redirect_uri")
            .map(|(_, value)| value.into_owned())
            .expect("redirect_uri parameter");
        let target = format!("{redirect}?code={}", self.code);
        tokio::spawn(async move {
            let _ = reqwest::get(target).await;
        });
        Ok(())
    }
}

/// Never redirects, like a user who walked away.
pub struct IdleBrowser;

impl BrowserLauncher for IdleBrowser {
    fn open(&self, _url: &str) -> Result<(), AuthError> {
        Ok(())
    }
}

pub struct BrokenBrowser;

impl BrowserLauncher for BrokenBrowser {
    fn open(&self, _url: &str) -> Result<(), AuthError> {
        Err(AuthError::Browser("no display".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn token(access_token: &str) -> TokenRecord {
    TokenRecord {
        access_token: access_token.to_string(),
        token_type: "bearer".to_string(),
        scope: "tasks:read tasks:write".to_string(),
        expires_in: 3600,
        expires_at: now() + Duration::hours(1),
    }
}

pub fn expired_token(access_token: &str) -> TokenRecord {
    TokenRecord {
        expires_at: now() - Duration::hours(1),
        ..token(access_token)
    }
}

/// Whole-second "now", the resolution a persisted record keeps.
pub fn now() -> chrono::DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("free port")
}
