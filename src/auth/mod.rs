//! Authorization-code login, token validation, and the layered token cache.

pub mod callback;
pub mod exchange;
pub mod orchestrator;
pub mod store;
pub mod token;
pub mod validator;

pub use callback::CallbackListener;
pub use exchange::{
    AuthSession, AuthorizationCode, AuthorizationExchanger, BrowserLauncher, CodeExchanger,
    SystemBrowser,
};
pub use orchestrator::{AuthState, Authenticated, Authenticator, CandidateStatus, TokenSource};
pub use store::{EnvBackend, FileBackend, KeyringBackend, TokenBackend, TokenStore};
pub use token::{TokenRecord, TokenResponse};
pub use validator::{ProbeValidator, TokenValidator};
