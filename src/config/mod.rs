//! Configuration (layered: code > env > defaults).

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::AuthError;

pub const DEFAULT_OAUTH_BASE_URL: &str = "https://ticktick.com/oauth";
pub const DEFAULT_API_BASE_URL: &str = "https://api.ticktick.com";
pub const DEFAULT_KEYRING_SERVICE: &str = "ticktick-auth";
pub const DEFAULT_ACCESS_TOKEN_ENV: &str = "TT_ACCESS_TOKEN";
pub const DEFAULT_SCOPES: &[&str] = &["tasks:write", "tasks:read"];
const TOKEN_FILE_NAME: &str = ".ticktick_oauth2.json";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Remote endpoints for one API surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub oauth_base_url: String,
    pub authorize_path: String,
    pub token_path: String,
    pub api_base_url: String,
    /// Lightweight authenticated GET used to confirm a token is still accepted.
    pub probe_path: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::open_api_v1()
    }
}

impl Endpoints {
    /// The Open API v1 surface.
    pub fn open_api_v1() -> Self {
        Self {
            oauth_base_url: DEFAULT_OAUTH_BASE_URL.to_string(),
            authorize_path: "/authorize".to_string(),
            token_path: "/token".to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            probe_path: "/open/v1/project".to_string(),
        }
    }

    /// Point both the OAuth server and the API at one base URL (mock servers, proxies).
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            oauth_base_url: format!("{base}/oauth"),
            api_base_url: base.to_string(),
            ..Self::open_api_v1()
        }
    }

    pub fn authorize_url(&self) -> String {
        join(&self.oauth_base_url, &self.authorize_path)
    }

    pub fn token_url(&self) -> String {
        join(&self.oauth_base_url, &self.token_path)
    }

    pub fn probe_url(&self) -> String {
        self.api_url(&self.probe_path)
    }

    pub fn api_url(&self, path: &str) -> String {
        join(&self.api_base_url, path)
    }
}

/// Where the browser redirect lands on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    /// Host named by the redirect URI, without IPv6 brackets.
    pub host: String,
    pub port: u16,
    pub path: String,
}

/// Static configuration for one authenticating process.
///
/// Passed by value into each component; nothing here is global.
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use ticktick_auth::config::AuthConfig;
///
/// let config = AuthConfig::new("client-id", "client-secret", "http://localhost:8080/callback")
///     .with_authorization_timeout(Some(Duration::from_secs(120)));
/// let target = config.redirect_target()?;
/// assert_eq!(target.port, 8080);
/// # Ok::<(), ticktick_auth::error::AuthError>(())
/// ```
#[derive(Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub endpoints: Endpoints,
    pub scopes: Vec<String>,
    pub keyring_service: String,
    pub token_file: PathBuf,
    pub access_token_env: String,
    pub probe_timeout: Duration,
    pub exchange_timeout: Duration,
    pub shutdown_grace: Duration,
    /// `None` waits for the browser redirect indefinitely.
    pub authorization_timeout: Option<Duration>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"..")
            .field("redirect_uri", &self.redirect_uri)
            .field("endpoints", &self.endpoints)
            .field("scopes", &self.scopes)
            .field("keyring_service", &self.keyring_service)
            .field("token_file", &self.token_file)
            .field("access_token_env", &self.access_token_env)
            .field("probe_timeout", &self.probe_timeout)
            .field("exchange_timeout", &self.exchange_timeout)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("authorization_timeout", &self.authorization_timeout)
            .finish()
    }
}

impl AuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            endpoints: Endpoints::default(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
            token_file: default_token_file(),
            access_token_env: DEFAULT_ACCESS_TOKEN_ENV.to_string(),
            probe_timeout: PROBE_TIMEOUT,
            exchange_timeout: EXCHANGE_TIMEOUT,
            shutdown_grace: SHUTDOWN_GRACE,
            authorization_timeout: Some(AUTHORIZATION_TIMEOUT),
        }
    }

    /// Load from environment variables (`TT_CLIENT_ID`, `TT_CLIENT_SECRET`, `TT_REDIRECT_URI`).
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self, AuthError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| {
                    AuthError::Configuration(format!("{key} environment variable is not set"))
                })
        };
        let mut config = Self::new(
            required("TT_CLIENT_ID")?,
            required("TT_CLIENT_SECRET")?,
            required("TT_REDIRECT_URI")?,
        );

        if let Some(raw) = lookup("TT_AUTH_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                AuthError::Configuration(format!("TT_AUTH_TIMEOUT_SECS is not a number: {raw}"))
            })?;
            config.authorization_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(path) = lookup("TT_TOKEN_FILE").filter(|p| !p.trim().is_empty()) {
            config.token_file = PathBuf::from(path);
        }
        if let Some(base) = lookup("TT_API_BASE_URL").filter(|b| !b.trim().is_empty()) {
            config.endpoints = Endpoints::with_base_url(&base);
        }

        Ok(config)
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_keyring_service(mut self, service: impl Into<String>) -> Self {
        self.keyring_service = service.into();
        self
    }

    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = path.into();
        self
    }

    pub fn with_access_token_env(mut self, var: impl Into<String>) -> Self {
        self.access_token_env = var.into();
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_authorization_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.authorization_timeout = timeout;
        self
    }

    /// Space-separated scope string as sent on the wire.
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    /// Parse the redirect URI into the local host, port and callback path.
    ///
    /// A URI without an explicit port is rejected: the listener has nothing to bind.
    pub fn redirect_target(&self) -> Result<RedirectTarget, AuthError> {
        let url = Url::parse(&self.redirect_uri).map_err(|e| {
            AuthError::Configuration(format!(
                "invalid redirect URI {}: {e}",
                self.redirect_uri
            ))
        })?;
        let port = url.port().ok_or_else(|| {
            AuthError::Configuration(format!(
                "redirect URI {} does not have a port",
                self.redirect_uri
            ))
        })?;
        let host = url
            .host_str()
            .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
            .unwrap_or_else(|| "localhost".to_string());
        let path = match url.path() {
            "" => "/".to_string(),
            other => other.to_string(),
        };
        Ok(RedirectTarget { host, port, path })
    }
}

/// Default token file (`~/.ticktick_oauth2.json`).
pub fn default_token_file() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(TOKEN_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(TOKEN_FILE_NAME))
}

fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
