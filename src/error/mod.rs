//! Error types for ticktick-auth.

use thiserror::Error;

/// Primary error type for every authentication operation.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Could not open browser: {0}")]
    Browser(String),

    #[error("Callback listener error: {0}")]
    Callback(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Token endpoint returned status {status}: {message}")]
    TokenEndpoint { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Token validation failed: {0}")]
    ValidationFailed(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad redirect URI, missing port, missing client credentials.
    Configuration,
    /// Token exchange POST, validation GET, browser launch, listener I/O.
    Network,
    /// A token was rejected locally or by the server.
    Validation,
    /// A cache backend could not be read or written.
    Persistence,
    /// The authorization step itself failed or never completed.
    Authorization,
    Internal,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    CheckConfiguration,
    CheckConnectivity,
    CheckCredentials,
    Reauthenticate,
    Ignore,
    ContactSupport,
}

impl AuthError {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Network(_) | Self::Browser(_) | Self::Callback(_) => ErrorCategory::Network,
            Self::Timeout(_) | Self::TokenEndpoint { .. } | Self::InvalidResponse(_) => {
                ErrorCategory::Authorization
            }
            Self::ValidationFailed(_) => ErrorCategory::Validation,
            Self::Persistence(_) | Self::Keyring(_) | Self::Io(_) => ErrorCategory::Persistence,
            Self::Serialization(_) | Self::Unsupported(_) => ErrorCategory::Internal,
        }
    }

    /// Configuration errors are surfaced immediately and never worked around.
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Network => RecoverySuggestion::CheckConnectivity,
            ErrorCategory::Validation => RecoverySuggestion::CheckCredentials,
            ErrorCategory::Authorization => RecoverySuggestion::Reauthenticate,
            // A failed cache write still leaves a usable in-memory token.
            ErrorCategory::Persistence => RecoverySuggestion::Ignore,
            ErrorCategory::Internal => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, AuthError>;
