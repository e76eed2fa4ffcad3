use std::fmt;
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;

use super::token::TokenRecord;
use crate::config::AuthConfig;
use crate::error::AuthError;

/// One place a token can be persisted.
pub trait TokenBackend: Send + Sync {
    /// Short label used in logs and status output.
    fn name(&self) -> &str;
    fn load(&self, client_id: &str) -> Result<Option<TokenRecord>, AuthError>;
    fn save(&self, client_id: &str, token: &TokenRecord) -> Result<(), AuthError>;
    fn clear(&self, client_id: &str) -> Result<(), AuthError>;

    /// Read-only backends are skipped by `save` and `clear`.
    fn is_writable(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Keyring
// ---------------------------------------------------------------------------

/// OS credential store entry keyed by service name + client id.
#[derive(Debug, Clone)]
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, client_id: &str) -> Result<keyring::Entry, AuthError> {
        Ok(keyring::Entry::new(&self.service, client_id)?)
    }
}

impl TokenBackend for KeyringBackend {
    fn name(&self) -> &str {
        "keyring"
    }

    fn load(&self, client_id: &str) -> Result<Option<TokenRecord>, AuthError> {
        match self.entry(client_id)?.get_password() {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, client_id: &str, token: &TokenRecord) -> Result<(), AuthError> {
        let serialized = serde_json::to_string(token)?;
        self.entry(client_id)?.set_password(&serialized)?;
        Ok(())
    }

    fn clear(&self, client_id: &str) -> Result<(), AuthError> {
        match self.entry(client_id)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

/// Single JSON file, shared by every client id.
///
/// # Example
/// ```no_run
/// use chrono::Utc;
/// use ticktick_auth::auth::{FileBackend, TokenBackend, TokenRecord};
///
/// let backend = FileBackend::new("/tmp/ticktick-token.json");
/// let token = TokenRecord::from_raw_access_token("abc", Utc::now());
/// backend.save("client-id", &token)?;
/// # Ok::<(), ticktick_auth::error::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    fn load(&self, _client_id: &str) -> Result<Option<TokenRecord>, AuthError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, _client_id: &str, token: &TokenRecord) -> Result<(), AuthError> {
        let serialized = serde_json::to_vec_pretty(token)?;
        atomic_write(&self.path, &serialized)
    }

    fn clear(&self, _client_id: &str) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path.file_name().ok_or_else(|| {
        AuthError::Configuration(format!("token path {} has no file name", path.display()))
    })?;

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_path = path.with_file_name(format!(
        ".{}.tmp-{}-{nonce}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let written = options.open(&temp_path).and_then(|mut file| {
        file.write_all(data)?;
        file.sync_all()
    });
    if let Err(err) = written.and_then(|()| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Raw access token injected through an environment variable. Never written.
#[derive(Clone)]
pub struct EnvBackend {
    var: String,
    lookup: Lookup,
}

impl fmt::Debug for EnvBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvBackend").field("var", &self.var).finish()
    }
}

impl EnvBackend {
    pub fn new(var: impl Into<String>) -> Self {
        Self::with_lookup(var, |key| std::env::var(key).ok())
    }

    /// Read the variable through `lookup` instead of the process environment.
    pub fn with_lookup<F>(var: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            var: var.into(),
            lookup: Arc::new(lookup),
        }
    }
}

impl TokenBackend for EnvBackend {
    fn name(&self) -> &str {
        "env"
    }

    fn load(&self, _client_id: &str) -> Result<Option<TokenRecord>, AuthError> {
        Ok((self.lookup)(&self.var)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(|raw| TokenRecord::from_raw_access_token(raw, Utc::now())))
    }

    fn save(&self, _client_id: &str, _token: &TokenRecord) -> Result<(), AuthError> {
        Err(AuthError::Unsupported(format!(
            "{} is a read-only token source",
            self.var
        )))
    }

    fn clear(&self, _client_id: &str) -> Result<(), AuthError> {
        Ok(())
    }

    fn is_writable(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Ordered set of backends. Reads take the first hit; writes degrade down the list.
#[derive(Clone, Default)]
pub struct TokenStore {
    backends: Vec<Arc<dyn TokenBackend>>,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.backends.iter().map(|b| b.name()))
            .finish()
    }
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keyring, then file, then environment.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new()
            .with_backend(KeyringBackend::new(&config.keyring_service))
            .with_backend(FileBackend::new(&config.token_file))
            .with_backend(EnvBackend::new(&config.access_token_env))
    }

    /// Append a backend at the lowest priority.
    pub fn with_backend(mut self, backend: impl TokenBackend + 'static) -> Self {
        self.backends.push(Arc::new(backend));
        self
    }

    pub fn with_shared_backend(mut self, backend: Arc<dyn TokenBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Records held by each backend, in priority order, loaded on demand.
    ///
    /// Backends that fail to load are logged and skipped; absent records are not yielded.
    pub fn candidates<'a>(
        &'a self,
        client_id: &'a str,
    ) -> impl Iterator<Item = (&'a str, TokenRecord)> + 'a {
        self.backends.iter().filter_map(move |backend| {
            match backend.load(client_id) {
                Ok(Some(token)) if !token.is_absent() => Some((backend.name(), token)),
                Ok(_) => None,
                Err(err) => {
                    tracing::warn!(
                        backend = backend.name(),
                        error = %err,
                        "Token backend load failed"
                    );
                    None
                }
            }
        })
    }

    pub fn load(&self, client_id: &str) -> Option<TokenRecord> {
        self.candidates(client_id).next().map(|(_, token)| token)
    }

    /// Persist to the first writable backend that accepts the token.
    ///
    /// Returns the accepting backend's name.
    pub fn save(&self, client_id: &str, token: &TokenRecord) -> Result<String, AuthError> {
        for backend in self.backends.iter().filter(|b| b.is_writable()) {
            match backend.save(client_id, token) {
                Ok(()) => {
                    tracing::debug!(backend = backend.name(), "Token persisted");
                    return Ok(backend.name().to_string());
                }
                Err(err) => {
                    tracing::warn!(
                        backend = backend.name(),
                        error = %err,
                        "Token backend write failed, trying next backend"
                    );
                }
            }
        }
        Err(AuthError::Persistence(
            "no token backend accepted the write".to_string(),
        ))
    }

    /// Remove the record from every writable backend.
    pub fn clear(&self, client_id: &str) -> Result<(), AuthError> {
        let mut failed = Vec::new();
        for backend in self.backends.iter().filter(|b| b.is_writable()) {
            if let Err(err) = backend.clear(client_id) {
                tracing::warn!(
                    backend = backend.name(),
                    error = %err,
                    "Token backend clear failed"
                );
                failed.push(backend.name().to_string());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Persistence(format!(
                "could not clear: {}",
                failed.join(", ")
            )))
        }
    }
}
