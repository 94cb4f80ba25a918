// ABOUTME: Credential persistence behind a pluggable store
// Keyring (macOS Keychain, Linux Secret Service) by default; plaintext file kept for compatibility

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use keyring::Entry;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{CredentialBackend, CredentialConfig};
use crate::models::Credential;

const SERVICE_NAME: &str = "commit-canvas";

#[derive(Error, Debug)]
pub enum CredentialStoreError {
    #[error("Credential file error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed stored credential: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Persistence contract. The caller decides when to load, save or clear.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<Credential>, CredentialStoreError>;
    fn save(&self, credential: &Credential) -> Result<(), CredentialStoreError>;
    /// Remove the stored credential; clearing an empty store succeeds
    fn clear(&self) -> Result<(), CredentialStoreError>;
}

/// Store selected by configuration
pub fn store_from_config(config: &CredentialConfig) -> Box<dyn CredentialStore> {
    match config.backend {
        CredentialBackend::Keyring => Box::new(KeyringCredentialStore::new()),
        CredentialBackend::File => {
            Box::new(PlaintextFileStore::new(config.resolved_file_path()))
        }
    }
}

/// Credential stored as JSON in the system keychain, one entry per host
pub struct KeyringCredentialStore {
    account: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::for_host(crate::models::DEFAULT_HOST)
    }

    pub fn for_host(host: &str) -> Self {
        Self {
            account: format!("credential@{host}"),
        }
    }

    fn entry(&self) -> Result<Entry, CredentialStoreError> {
        Ok(Entry::new(SERVICE_NAME, &self.account)?)
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn load(&self) -> Result<Option<Credential>, CredentialStoreError> {
        match self.entry()?.get_password() {
            Ok(secret) => {
                debug!(account = %self.account, "Retrieved credential from keychain");
                Ok(Some(serde_json::from_str(&secret)?))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(account = %self.account, "No credential in keychain");
                Ok(None)
            }
            Err(e) => {
                warn!(account = %self.account, error = %e, "Failed to read keychain");
                Err(e.into())
            }
        }
    }

    fn save(&self, credential: &Credential) -> Result<(), CredentialStoreError> {
        let secret = serde_json::to_string(credential)?;
        self.entry()?.set_password(&secret)?;
        info!(account = %self.account, username = %credential.username, "Stored credential in keychain");
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                info!(account = %self.account, "Deleted credential from keychain");
                Ok(())
            }
            // Already doesn't exist, that's fine
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Unencrypted JSON file, restricted to the owner (0600 on unix).
///
/// Anyone with read access to the file has the token.
pub struct PlaintextFileStore {
    path: PathBuf,
}

impl PlaintextFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> CredentialStoreError {
        CredentialStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CredentialStore for PlaintextFileStore {
    fn load(&self) -> Result<Option<Credential>, CredentialStoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn save(&self, credential: &Credential) -> Result<(), CredentialStoreError> {
        warn!(path = %self.path.display(), "Storing credential in plaintext");

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let content = serde_json::to_string_pretty(credential)?;
        let mut file = owner_only_file(&self.path).map_err(|e| self.io_error(e))?;
        file.write_all(content.as_bytes()).map_err(|e| self.io_error(e))?;

        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Deleted credential file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Open `path` for writing, truncated and readable only by the owner before
/// any bytes land in it. An existing file with wider permissions is narrowed.
fn owner_only_file(path: &Path) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let file = options.open(path)?;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
        Ok(file)
    }

    #[cfg(not(unix))]
    {
        options.open(path)
    }
}

/// Process-local store, nothing touches disk
#[derive(Default)]
pub struct MemoryCredentialStore {
    credential: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>, CredentialStoreError> {
        Ok(self
            .credential
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone()))
    }

    fn save(&self, credential: &Credential) -> Result<(), CredentialStoreError> {
        let mut guard = self
            .credential
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        let mut guard = self
            .credential
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = None;
        Ok(())
    }
}
