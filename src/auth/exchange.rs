//! Browser-based authorization-code grant.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use url::Url;

use super::callback::CallbackListener;
use super::token::{TokenRecord, TokenResponse};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::util::timeout::with_timeout;

/// Static client credentials for one process.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("client_id", &self.client_id)
            .field("client_secret", &"..")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

impl AuthSession {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }
}

/// Code delivered by the browser redirect. Consumed by the token request.
#[derive(PartialEq, Eq)]
pub struct AuthorizationCode(String);

impl AuthorizationCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for AuthorizationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationCode(..)")
    }
}

// ---------------------------------------------------------------------------
// Browser
// ---------------------------------------------------------------------------

pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<(), AuthError>;
}

/// Opens URLs with the platform's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), AuthError> {
        open::that(url).map_err(|e| AuthError::Browser(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Exchanger
// ---------------------------------------------------------------------------

/// Produces a fresh token for a session.
#[async_trait]
pub trait CodeExchanger: Send + Sync {
    async fn exchange(&self, session: &AuthSession) -> Result<TokenRecord, AuthError>;
}

/// Runs the full grant: listener, browser, code handoff, token request.
///
/// Nothing is kept from a failed attempt; the token record only exists once the
/// endpoint response has decoded cleanly.
///
/// # Example
/// ```no_run
/// use ticktick_auth::auth::{AuthSession, AuthorizationExchanger, CodeExchanger};
/// use ticktick_auth::config::AuthConfig;
///
/// # async fn example() -> ticktick_auth::error::Result<()> {
/// let config = AuthConfig::from_env()?;
/// let exchanger = AuthorizationExchanger::new(reqwest::Client::new(), config.clone());
/// let token = exchanger.exchange(&AuthSession::from_config(&config)).await?;
/// println!("expires at {}", token.expires_at);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AuthorizationExchanger {
    http: reqwest::Client,
    config: AuthConfig,
    browser: Arc<dyn BrowserLauncher>,
}

impl AuthorizationExchanger {
    pub fn new(http: reqwest::Client, config: AuthConfig) -> Self {
        Self {
            http,
            config,
            browser: Arc::new(SystemBrowser),
        }
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    /// Authorization page URL the user is sent to.
    pub fn authorization_url(&self, session: &AuthSession) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.config.endpoints.authorize_url()).map_err(|e| {
            AuthError::Configuration(format!("invalid authorization endpoint: {e}"))
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &session.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &session.redirect_uri)
            .append_pair("scope", &self.config.scope());
        Ok(url)
    }

    /// Trade an authorization code for a token.
    pub async fn request_token(
        &self,
        session: &AuthSession,
        code: AuthorizationCode,
    ) -> Result<TokenRecord, AuthError> {
        let scope = self.config.scope();
        let code = code.into_inner();
        let form = [
            ("client_id", session.client_id.as_str()),
            ("client_secret", session.client_secret.as_str()),
            ("code", code.as_str()),
            ("grant_type", "authorization_code"),
            ("scope", scope.as_str()),
            ("redirect_uri", session.redirect_uri.as_str()),
        ];

        let token_url = self.config.endpoints.token_url();
        // The bound covers the body reads as well as the headers.
        let body = with_timeout(self.config.exchange_timeout, async {
            let response = self.http.post(&token_url).form(&form).send().await?;
            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(AuthError::TokenEndpoint {
                    status: status.as_u16(),
                    message,
                });
            }
            Ok(response.text().await?)
        })
        .await?;

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::InvalidResponse(format!("token response: {e}")))?;
        TokenRecord::issue(parsed, Utc::now())
    }
}

#[async_trait]
impl CodeExchanger for AuthorizationExchanger {
    async fn exchange(&self, session: &AuthSession) -> Result<TokenRecord, AuthError> {
        // Fails before any network activity when the redirect URI is unusable.
        let target = self.config.redirect_target()?;
        let listener = CallbackListener::bind(&target, self.config.shutdown_grace).await?;

        let url = self.authorization_url(session)?;
        tracing::info!(url = %url, "Opening browser for authorization");
        self.browser.open(url.as_str())?;

        let code = listener.wait(self.config.authorization_timeout).await?;
        tracing::debug!("Authorization code received");

        self.request_token(session, code).await
    }
}
