//! Credential and status stores
//!
//! The relay talks to its account backend through two small traits so the
//! backend stays swappable. `UserStore` is the built-in implementation:
//! salted SHA-256 password hashes, kept in memory and optionally mirrored
//! to a JSON file.
//!
//! Both traits are synchronous; session tasks call them through
//! `tokio::task::spawn_blocking`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::StoreError;

/// Account registration and authentication
///
/// The gateway is the single source of truth for username uniqueness.
pub trait CredentialGateway: Send + Sync + 'static {
    /// Create an account. `Ok(false)` means the username is taken.
    fn register(&self, username: &str, password: &str) -> Result<bool, StoreError>;

    /// Check a username/password pair. `Ok(false)` means bad credentials.
    fn authenticate(&self, username: &str, password: &str) -> Result<bool, StoreError>;
}

/// Online-status bookkeeping for authenticated users
pub trait StatusStore: Send + Sync + 'static {
    fn mark_online(&self, username: &str) -> Result<(), StoreError>;
    fn mark_offline(&self, username: &str) -> Result<(), StoreError>;
}

/// Stored credentials for one account
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    /// Hex-encoded random salt
    salt: String,
    /// Hex-encoded SHA-256 of salt bytes followed by the password
    password_hash: String,
}

impl UserRecord {
    fn new(password: &str) -> Self {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill(&mut salt);
        Self {
            salt: hex::encode(salt),
            password_hash: hash_password(&salt, password),
        }
    }

    fn verify(&self, password: &str) -> bool {
        match hex::decode(&self.salt) {
            Ok(salt) => hash_password(&salt, password) == self.password_hash,
            Err(_) => false,
        }
    }
}

/// On-disk layout of the users file
#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersFile {
    users: BTreeMap<String, UserRecord>,
}

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<String, UserRecord>,
    /// Live session count per online username
    online: BTreeMap<String, usize>,
}

/// Built-in credential and status store
#[derive(Debug)]
pub struct UserStore {
    /// Users file; `None` keeps everything in memory
    path: Option<PathBuf>,
    inner: Mutex<Inner>,
}

impl UserStore {
    /// Store that forgets everything on exit
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Store backed by a JSON users file
    ///
    /// A missing file starts an empty store; it is created on the first signup.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let users = if path.exists() {
            let data = fs::read_to_string(&path)?;
            serde_json::from_str::<UsersFile>(&data)?.users
        } else {
            BTreeMap::new()
        };

        info!("Loaded {} users from {}", users.len(), path.display());

        Ok(Self {
            path: Some(path),
            inner: Mutex::new(Inner {
                users,
                online: BTreeMap::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Usernames currently marked online, sorted
    pub fn online_users(&self) -> Vec<String> {
        self.lock().online.keys().cloned().collect()
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }
}

impl CredentialGateway for UserStore {
    fn register(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner.users.contains_key(username) {
            debug!("Signup rejected, '{}' already exists", username);
            return Ok(false);
        }

        inner
            .users
            .insert(username.to_string(), UserRecord::new(password));

        if let Some(path) = &self.path {
            if let Err(e) = persist(path, &inner.users) {
                inner.users.remove(username);
                return Err(e);
            }
        }

        Ok(true)
    }

    fn authenticate(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        let inner = self.lock();
        Ok(inner
            .users
            .get(username)
            .is_some_and(|record| record.verify(password)))
    }
}

impl StatusStore for UserStore {
    fn mark_online(&self, username: &str) -> Result<(), StoreError> {
        *self.lock().online.entry(username.to_string()).or_insert(0) += 1;
        Ok(())
    }

    /// Drops one session's claim; the user goes offline with the last one
    fn mark_offline(&self, username: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(count) = inner.online.get_mut(username) {
            *count -= 1;
            if *count == 0 {
                inner.online.remove(username);
            }
        }
        Ok(())
    }
}

/// Run a store call on the blocking pool
///
/// A panicked or cancelled call counts as the store being unavailable.
pub async fn run_blocking<T, F>(call: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
}

/// Write the users file via a temp file and rename
fn persist(path: &Path, users: &BTreeMap<String, UserRecord>) -> Result<(), StoreError> {
    let file = UsersFile {
        users: users.clone(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn hash_password(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
