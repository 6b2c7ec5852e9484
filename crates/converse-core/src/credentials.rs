//! Credential persistence
//!
//! The core treats stored credentials as opaque values: it only needs to save
//! them after a login, read them back at process start, and forget them.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::CredentialError;
use crate::types::Credentials;

/// Whatever the store currently holds; any field may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(rename = "converse_username", default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "converse_password", default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "converse_domain", default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl StoredCredentials {
    /// Full credentials, only if all three fields are present and non-empty
    pub fn complete(&self) -> Option<Credentials> {
        match (&self.username, &self.password, &self.domain) {
            (Some(u), Some(p), Some(d)) if !u.is_empty() && !p.is_empty() && !d.is_empty() => {
                Some(Credentials::new(u.clone(), p.clone(), d.clone()))
            }
            _ => None,
        }
    }
}

impl From<&Credentials> for StoredCredentials {
    fn from(credentials: &Credentials) -> Self {
        Self {
            username: Some(credentials.username.clone()),
            password: Some(credentials.password.clone()),
            domain: Some(credentials.domain.clone()),
        }
    }
}

/// Key-value storage for the account credentials
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<StoredCredentials, CredentialError>;
    fn save(&self, credentials: &Credentials) -> Result<(), CredentialError>;
    fn clear(&self) -> Result<(), CredentialError>;
}

/// In-process store, lost on exit
#[derive(Default)]
pub struct MemoryCredentialStore {
    stored: Mutex<StoredCredentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a possibly partial record
    pub fn with_stored(stored: StoredCredentials) -> Self {
        Self {
            stored: Mutex::new(stored),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<StoredCredentials, CredentialError> {
        Ok(self.stored.lock().clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        *self.stored.lock() = credentials.into();
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        *self.stored.lock() = StoredCredentials::default();
        Ok(())
    }
}

/// JSON file store
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<StoredCredentials, CredentialError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No credential file at {}", self.path.display());
                Ok(StoredCredentials::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&StoredCredentials::from(credentials))?;
        std::fs::write(&self.path, json)?;
        debug!("Saved credentials to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
