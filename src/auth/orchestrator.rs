use std::sync::Arc;

use strum::Display;

use super::exchange::{AuthSession, AuthorizationExchanger, CodeExchanger};
use super::store::TokenStore;
use super::token::TokenRecord;
use super::validator::{ProbeValidator, TokenValidator};
use crate::config::AuthConfig;
use crate::error::AuthError;

/// Where the authenticator is in its flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AuthState {
    Start,
    ReadCache,
    Authorizing,
    Exchanging,
    Validating,
    Persisting,
    Ready,
    Failed,
}

/// How the returned token was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// A cached record that passed validation.
    Cached { backend: String },
    /// A fresh grant; `persisted_to` is `None` when every write failed.
    Exchanged { persisted_to: Option<String> },
}

#[derive(Debug, Clone)]
pub struct Authenticated {
    pub token: TokenRecord,
    pub source: TokenSource,
}

/// One cached record as reported by [`Authenticator::status`].
#[derive(Debug, Clone)]
pub struct CandidateStatus {
    pub backend: String,
    pub token: TokenRecord,
    pub valid: bool,
}

/// Produces a usable token, from cache when possible and from a fresh grant otherwise.
///
/// # Example
/// ```no_run
/// use ticktick_auth::auth::Authenticator;
/// use ticktick_auth::config::AuthConfig;
///
/// # async fn example() -> ticktick_auth::error::Result<()> {
/// let mut auth = Authenticator::new(AuthConfig::from_env()?);
/// let result = auth.authenticate().await?;
/// println!("{:?}", result.source);
/// # Ok(())
/// # }
/// ```
pub struct Authenticator {
    session: AuthSession,
    store: TokenStore,
    validator: Arc<dyn TokenValidator>,
    exchanger: Arc<dyn CodeExchanger>,
    state: AuthState,
    transitions: Vec<AuthState>,
}

impl Authenticator {
    /// Keyring/file/env store, live probe validator, browser exchanger.
    pub fn new(config: AuthConfig) -> Self {
        let http = reqwest::Client::new();
        Self {
            session: AuthSession::from_config(&config),
            store: TokenStore::from_config(&config),
            validator: Arc::new(ProbeValidator::from_config(http.clone(), &config)),
            exchanger: Arc::new(AuthorizationExchanger::new(http, config)),
            state: AuthState::Start,
            transitions: vec![AuthState::Start],
        }
    }

    pub fn with_store(mut self, store: TokenStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_exchanger(mut self, exchanger: Arc<dyn CodeExchanger>) -> Self {
        self.exchanger = exchanger;
        self
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Every state entered by the last `authenticate` call, in order.
    pub fn transitions(&self) -> &[AuthState] {
        &self.transitions
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    fn enter(&mut self, next: AuthState) {
        tracing::debug!(from = %self.state, to = %next, "Auth state transition");
        self.state = next;
        self.transitions.push(next);
    }

    pub async fn authenticate(&mut self) -> Result<Authenticated, AuthError> {
        self.state = AuthState::Start;
        self.transitions = vec![AuthState::Start];

        self.enter(AuthState::ReadCache);
        let client_id = self.session.client_id.clone();
        let store = self.store.clone();
        // Lazy: later backends are never loaded once an earlier one validates.
        for (backend, token) in store.candidates(&client_id) {
            if self.validator.validate(&token).await {
                tracing::debug!(backend, "Using cached token");
                self.enter(AuthState::Ready);
                return Ok(Authenticated {
                    token,
                    source: TokenSource::Cached {
                        backend: backend.to_string(),
                    },
                });
            }
            tracing::debug!(backend, "Cached token rejected, trying next backend");
        }

        self.enter(AuthState::Authorizing);
        self.enter(AuthState::Exchanging);
        let token = match self.exchanger.exchange(&self.session).await {
            Ok(token) => token,
            Err(err) => {
                self.enter(AuthState::Failed);
                return Err(err);
            }
        };

        self.enter(AuthState::Validating);
        if !self.validator.validate(&token).await {
            self.enter(AuthState::Failed);
            return Err(AuthError::ValidationFailed(
                "freshly issued token was rejected by the server".to_string(),
            ));
        }

        self.enter(AuthState::Persisting);
        let persisted_to = match store.save(&client_id, &token) {
            Ok(backend) => Some(backend),
            Err(err) => {
                tracing::warn!(error = %err, "Token not persisted, next run will re-authenticate");
                None
            }
        };

        self.enter(AuthState::Ready);
        Ok(Authenticated {
            token,
            source: TokenSource::Exchanged { persisted_to },
        })
    }

    /// Every cached candidate with its validation result. Does not authorize.
    pub async fn status(&self) -> Vec<CandidateStatus> {
        let mut out = Vec::new();
        for (backend, token) in self.store.candidates(&self.session.client_id) {
            let valid = self.validator.validate(&token).await;
            out.push(CandidateStatus {
                backend: backend.to_string(),
                token,
                valid,
            });
        }
        out
    }

    /// Forget cached tokens locally. The server-side grant is left alone.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.clear(&self.session.client_id)
    }
}

