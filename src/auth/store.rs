//! Durable credential store for the user snapshot and the access/refresh token
//! pair. The three keys are always written or cleared together under one lock,
//! so readers never observe a user without tokens or an access token paired with
//! a stale refresh token. Token values are only exposed to build headers or to
//! persist them.

use crate::auth::types::{TokenPair, User};
use secrecy::{ExposeSecret, SecretString};
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;
use tracing::{debug, warn};

pub const USER_KEY: &str = "user";
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

const KEYS: [&str; 3] = [USER_KEY, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY];

type Entries = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential storage is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Storage that survives process restarts. Implementations persist the whole
/// key set at once.
pub trait CredentialBackend: Send + Sync {
    /// # Errors
    /// Returns an error if the stored entries cannot be read or decoded.
    fn load(&self) -> Result<Entries, StoreError>;

    /// # Errors
    /// Returns an error if the entries cannot be written.
    fn save(&self, entries: &Entries) -> Result<(), StoreError>;
}

/// Process-local backend, shared between store instances to simulate reloads.
#[derive(Default)]
pub struct MemoryCredentials {
    entries: Mutex<Entries>,
}

impl MemoryCredentials {
    #[must_use]
    pub fn with_entries(entries: Entries) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Entries {
        lock(&self.entries).clone()
    }
}

impl CredentialBackend for MemoryCredentials {
    fn load(&self) -> Result<Entries, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, entries: &Entries) -> Result<(), StoreError> {
        *lock(&self.entries) = entries.clone();
        Ok(())
    }
}

/// JSON file backend. Writes go to a sibling temp file that is renamed over the
/// target, so a crash never leaves a half-written token pair on disk.
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CredentialBackend for FileCredentials {
    fn load(&self) -> Result<Entries, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Entries::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Entries::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, entries: &Entries) -> Result<(), StoreError> {
        if entries.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            };
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let payload = serde_json::to_vec_pretty(entries)?;
        let temp_path = self.temp_path();
        let mut file = open_private(&temp_path)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        fs::rename(&temp_path, &self.path)?;

        debug!("credentials written to {}", self.path.display());

        Ok(())
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}

fn lock(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared handle to the persisted credentials. Cloning is cheap; all clones see
/// the same entries.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    backend: Arc<dyn CredentialBackend>,
    entries: Mutex<Entries>,
}

impl CredentialStore {
    /// Loads the persisted entries, clearing them if the three keys are not
    /// co-present or the user snapshot does not decode.
    /// # Errors
    /// Returns an error if the backend cannot be read or repaired.
    pub fn open(backend: Arc<dyn CredentialBackend>) -> Result<Self, StoreError> {
        let mut entries = backend.load()?;
        entries.retain(|key, _| KEYS.contains(&key.as_str()));

        if !entries.is_empty() && !is_complete(&entries) {
            warn!("stored credentials are incomplete, clearing them");
            entries.clear();
            backend.save(&entries)?;
        }

        Ok(Self {
            inner: Arc::new(StoreInner {
                backend,
                entries: Mutex::new(entries),
            }),
        })
    }

    /// Store that lives only as long as the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                backend: Arc::new(MemoryCredentials::default()),
                entries: Mutex::new(Entries::new()),
            }),
        }
    }

    #[must_use]
    pub fn access_token(&self) -> Option<SecretString> {
        self.get(ACCESS_TOKEN_KEY).map(SecretString::from)
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<SecretString> {
        self.get(REFRESH_TOKEN_KEY).map(SecretString::from)
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        let raw = self.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(err) => {
                warn!("stored user snapshot does not decode: {err}");
                None
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.inner.entries).is_empty()
    }

    /// True when either all three keys are present or none are.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let entries = lock(&self.inner.entries);
        entries.is_empty() || is_complete(&entries)
    }

    /// Persists a fresh login: user snapshot plus both tokens.
    /// # Errors
    /// Returns an error if the user cannot be encoded or the backend write fails.
    pub fn save_login(&self, user: &User, tokens: &TokenPair) -> Result<(), StoreError> {
        let user_json = serde_json::to_string(user)?;
        self.mutate(|entries| {
            entries.insert(USER_KEY.to_string(), user_json);
            entries.insert(
                ACCESS_TOKEN_KEY.to_string(),
                tokens.access.expose_secret().to_string(),
            );
            entries.insert(
                REFRESH_TOKEN_KEY.to_string(),
                tokens.refresh.expose_secret().to_string(),
            );
            true
        })
        .map(|_| ())
    }

    /// Replaces the access token, and the refresh token when the backend rotated
    /// it, as long as `sent` is still the stored refresh token. Returns `false`
    /// without writing if the session was cleared or replaced meanwhile, so a
    /// concurrent logout or login is never overwritten.
    /// # Errors
    /// Returns an error if the backend write fails.
    pub fn update_tokens(
        &self,
        sent: &SecretString,
        access: &SecretString,
        rotated: Option<&SecretString>,
    ) -> Result<bool, StoreError> {
        self.mutate(|entries| {
            if !is_complete(entries) || !holds_refresh(entries, sent) {
                return false;
            }
            entries.insert(
                ACCESS_TOKEN_KEY.to_string(),
                access.expose_secret().to_string(),
            );
            if let Some(refresh) = rotated {
                entries.insert(
                    REFRESH_TOKEN_KEY.to_string(),
                    refresh.expose_secret().to_string(),
                );
            }
            true
        })
    }

    /// Clears all three keys if `rejected` is still the stored refresh token.
    /// Returns `false` and leaves a newer session alone otherwise.
    /// # Errors
    /// Returns an error if the backend write fails.
    pub fn clear_if_refresh(&self, rejected: &SecretString) -> Result<bool, StoreError> {
        self.mutate(|entries| {
            if !holds_refresh(entries, rejected) {
                return false;
            }
            entries.clear();
            true
        })
    }

    /// Replaces the user snapshot. Returns `false` if no tokens are stored.
    /// # Errors
    /// Returns an error if the user cannot be encoded or the backend write fails.
    pub fn update_user(&self, user: &User) -> Result<bool, StoreError> {
        let user_json = serde_json::to_string(user)?;
        self.mutate(|entries| {
            if !is_complete(entries) {
                return false;
            }
            entries.insert(USER_KEY.to_string(), user_json);
            true
        })
    }

    /// Removes all three keys.
    /// # Errors
    /// Returns an error if the backend write fails; the in-memory entries are
    /// cleared regardless.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut entries = lock(&self.inner.entries);
        entries.clear();
        self.inner.backend.save(&entries)
    }

    fn get(&self, key: &str) -> Option<String> {
        lock(&self.inner.entries).get(key).cloned()
    }

    fn mutate(&self, apply: impl FnOnce(&mut Entries) -> bool) -> Result<bool, StoreError> {
        let mut entries = lock(&self.inner.entries);
        let mut next = entries.clone();
        if !apply(&mut next) {
            return Ok(false);
        }
        self.inner.backend.save(&next)?;
        *entries = next;
        Ok(true)
    }
}

fn holds_refresh(entries: &Entries, refresh: &SecretString) -> bool {
    entries
        .get(REFRESH_TOKEN_KEY)
        .is_some_and(|stored| stored.as_str() == refresh.expose_secret())
}

fn is_complete(entries: &Entries) -> bool {
    KEYS.iter().all(|key| entries.contains_key(*key))
        && entries
            .get(USER_KEY)
            .is_some_and(|raw| serde_json::from_str::<User>(raw).is_ok())
}
