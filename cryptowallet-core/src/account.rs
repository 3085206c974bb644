//! User accounts and the on-disk user store.
//!
//! Passwords are stored as lowercase hex SHA-256 digests. The store keeps
//! every user (and their wallet) in memory and writes a single JSON file on
//! [`UserStore::save`].

use crate::error::{AccountError, StoreError, WalletError};
use crate::wallet::Wallet;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Handle to an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserRef(String);

impl UserRef {
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    pub fn username(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registration and credential checks.
pub trait AccountService: Send + Sync {
    /// Creates a new account with an empty wallet.
    fn register(&self, username: &str, password: &str) -> Result<(), AccountError>;

    /// Verifies credentials and returns the user handle.
    fn login(&self, username: &str, password: &str) -> Result<UserRef, AccountError>;
}

/// Hashes a password using SHA-256, returning a lowercase hex string.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// A persisted user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
    #[serde(default)]
    pub wallet: Wallet,
}

#[derive(Serialize, Deserialize)]
struct UserFile {
    users: Vec<UserRecord>,
}

/// In-memory user table with optional JSON file persistence.
pub struct UserStore {
    path: Option<PathBuf>,
    users: DashMap<String, UserRecord>,
    dirty: AtomicBool,
}

impl UserStore {
    /// Creates a store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            users: DashMap::new(),
            dirty: AtomicBool::new(false),
        }
    }

    /// Opens the store at `path`, loading existing users if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let store = Self {
            path: Some(path),
            users: DashMap::new(),
            dirty: AtomicBool::new(false),
        };
        store.load()?;

        Ok(store)
    }

    fn load(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let file = File::open(path)?;
        let data: UserFile = serde_json::from_reader(BufReader::new(file))?;
        for record in data.users {
            if self.users.contains_key(&record.username) {
                return Err(StoreError::Corruption(format!(
                    "duplicate user '{}' in {}",
                    record.username,
                    path.display()
                )));
            }
            self.users.insert(record.username.clone(), record);
        }

        tracing::info!("Loaded {} users from {}", self.users.len(), path.display());
        Ok(())
    }

    /// Writes all users to disk. A no-op for in-memory stores.
    ///
    /// The file is written to a temporary sibling and renamed into place.
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut users: Vec<UserRecord> = self.users.iter().map(|r| r.value().clone()).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));

        let tmp_path = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &UserFile { users })?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        self.dirty.store(false, Ordering::Release);
        tracing::info!("Saved {} users to {}", self.users.len(), path.display());
        Ok(())
    }

    /// Returns whether there are changes not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    /// Returns a copy of a user's wallet.
    pub fn wallet(&self, user: &UserRef) -> Option<Wallet> {
        self.users.get(user.username()).map(|r| r.wallet.clone())
    }

    /// Runs `f` against a working copy of the user's wallet.
    ///
    /// The copy replaces the stored wallet only if `f` succeeds, so a failing
    /// closure never leaves a partial update behind.
    pub fn update_wallet<T>(
        &self,
        user: &UserRef,
        f: impl FnOnce(&mut Wallet) -> Result<T, WalletError>,
    ) -> Result<T, WalletError> {
        let mut record = self
            .users
            .get_mut(user.username())
            .ok_or_else(|| WalletError::UnknownUser(user.username().to_string()))?;

        let mut working = record.wallet.clone();
        let value = f(&mut working)?;
        record.wallet = working;
        self.dirty.store(true, Ordering::Release);

        Ok(value)
    }
}

impl AccountService for UserStore {
    fn register(&self, username: &str, password: &str) -> Result<(), AccountError> {
        if username.trim().is_empty() {
            return Err(AccountError::InvalidCredentials("username cannot be blank"));
        }
        if password.trim().is_empty() {
            return Err(AccountError::InvalidCredentials("password cannot be blank"));
        }

        match self.users.entry(username.to_string()) {
            Entry::Occupied(_) => Err(AccountError::UsernameTaken(username.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(UserRecord {
                    username: username.to_string(),
                    password_hash: hash_password(password),
                    wallet: Wallet::new(),
                });
                self.dirty.store(true, Ordering::Release);
                tracing::debug!("Registered user {}", username);
                Ok(())
            }
        }
    }

    fn login(&self, username: &str, password: &str) -> Result<UserRef, AccountError> {
        let record = self
            .users
            .get(username)
            .ok_or_else(|| AccountError::UserNotFound(username.to_string()))?;

        if record.password_hash != hash_password(password) {
            return Err(AccountError::WrongPassword);
        }

        Ok(UserRef::new(username))
    }
}
