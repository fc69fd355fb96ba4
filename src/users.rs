//! User accounts for whoever serves the archives.
//!
//! The archive core never looks at users; a front end asks a
//! [`CredentialStore`] who may log in. [`JsonUserStore`] keeps the accounts
//! in one pretty-printed JSON file with salted PBKDF2-HMAC-SHA256 hashes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const PBKDF2_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum UserStoreError {
    #[error("user store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("user store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("user '{0}' already exists")]
    AlreadyExists(String),

    #[error("user '{0}' not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("random source unavailable: {0}")]
    Random(String),
}

pub type Result<T> = std::result::Result<T, UserStoreError>;

/// What the serving layer needs from an account store
pub trait CredentialStore: Send + Sync {
    fn validate_credentials(&self, username: &str, password: &str) -> bool;
    fn load_user(&self, username: &str) -> Option<User>;
}

/// Public view of an account (no secrets)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    username: String,
    password_hash: String,
    salt: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    is_admin: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    last_login: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

impl UserRecord {
    fn to_user(&self) -> User {
        User {
            username: self.username.clone(),
            email: self.email.clone(),
            is_admin: self.is_admin,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_login: self.last_login,
        }
    }

    fn verify(&self, password: &str) -> bool {
        let computed = hash_password(password, &self.salt);
        constant_time_eq(computed.as_bytes(), self.password_hash.as_bytes())
    }
}

/// Fields `update_user` may change; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub is_admin: Option<bool>,
    pub active: Option<bool>,
}

type Users = BTreeMap<String, UserRecord>;

/// Account store backed by a JSON file
pub struct JsonUserStore {
    path: PathBuf,
}

impl JsonUserStore {
    /// Use the file at `path`, creating it (and its directory) if missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        if !store.path.exists() {
            if let Some(parent) = store.path.parent() {
                fs::create_dir_all(parent)?;
            }
            store.save(&Users::new())?;
            info!(path = %store.path.display(), "created user store");
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Users> {
        let text = fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(Users::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&self, users: &Users) -> Result<()> {
        let text = serde_json::to_string_pretty(users)?;
        fs::write(&self.path, text)?;
        Ok(())
    }

    pub fn create_user(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
        is_admin: bool,
    ) -> Result<User> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(UserStoreError::InvalidInput(
                "username and password are required".into(),
            ));
        }

        let mut users = self.load()?;
        if users.contains_key(username) {
            return Err(UserStoreError::AlreadyExists(username.to_string()));
        }

        let salt = new_salt()?;
        let now = Utc::now();
        let record = UserRecord {
            username: username.to_string(),
            password_hash: hash_password(password, &salt),
            salt,
            email: email.unwrap_or_default().to_string(),
            is_admin,
            created_at: now,
            updated_at: now,
            last_login: None,
            active: true,
        };
        let user = record.to_user();
        users.insert(username.to_string(), record);
        self.save(&users)?;

        info!(username, is_admin, "created user");
        Ok(user)
    }

    pub fn get_user(&self, username: &str) -> Result<Option<User>> {
        Ok(self.load()?.get(username).map(UserRecord::to_user))
    }

    /// Every account, ordered by username
    pub fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.load()?.values().map(UserRecord::to_user).collect())
    }

    pub fn update_user(&self, username: &str, update: UserUpdate) -> Result<User> {
        self.modify(username, |record| {
            if let Some(email) = update.email {
                record.email = email;
            }
            if let Some(is_admin) = update.is_admin {
                record.is_admin = is_admin;
            }
            if let Some(active) = update.active {
                record.active = active;
            }
            Ok(())
        })
    }

    pub fn set_password(&self, username: &str, password: &str) -> Result<User> {
        if password.is_empty() {
            return Err(UserStoreError::InvalidInput("password is required".into()));
        }
        let salt = new_salt()?;
        self.modify(username, |record| {
            record.password_hash = hash_password(password, &salt);
            record.salt = salt;
            Ok(())
        })
    }

    /// Replace the password after checking the current one.
    pub fn change_password(&self, username: &str, old: &str, new: &str) -> Result<bool> {
        if !self.check(username, old)? {
            return Ok(false);
        }
        self.set_password(username, new)?;
        Ok(true)
    }

    pub fn delete_user(&self, username: &str) -> Result<()> {
        let mut users = self.load()?;
        if users.remove(username).is_none() {
            return Err(UserStoreError::NotFound(username.to_string()));
        }
        self.save(&users)?;
        info!(username, "deleted user");
        Ok(())
    }

    pub fn user_count(&self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    /// Password check that ignores inactive accounts; does not record a login.
    fn check(&self, username: &str, password: &str) -> Result<bool> {
        Ok(self
            .load()?
            .get(username)
            .is_some_and(|record| record.active && record.verify(password)))
    }

    fn modify(
        &self,
        username: &str,
        change: impl FnOnce(&mut UserRecord) -> Result<()>,
    ) -> Result<User> {
        let mut users = self.load()?;
        let record = users
            .get_mut(username)
            .ok_or_else(|| UserStoreError::NotFound(username.to_string()))?;
        change(record)?;
        record.updated_at = Utc::now();
        let user = record.to_user();
        self.save(&users)?;
        Ok(user)
    }
}

impl CredentialStore for JsonUserStore {
    /// Successful checks record the login time.
    fn validate_credentials(&self, username: &str, password: &str) -> bool {
        match self.check(username, password) {
            Ok(true) => {
                let recorded = self.load().and_then(|mut users| {
                    if let Some(record) = users.get_mut(username) {
                        record.last_login = Some(Utc::now());
                    }
                    self.save(&users)
                });
                if let Err(e) = recorded {
                    debug!(username, "could not record login: {}", e);
                }
                true
            }
            Ok(false) => false,
            Err(e) => {
                debug!(username, "credential check failed: {}", e);
                false
            }
        }
    }

    fn load_user(&self, username: &str) -> Option<User> {
        self.get_user(username)
            .ok()
            .flatten()
            .filter(|user| user.active)
    }
}

fn new_salt() -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt).map_err(|e| UserStoreError::Random(e.to_string()))?;
    Ok(hex::encode(salt))
}

/// Hex PBKDF2-HMAC-SHA256 of `password`; the salt is used as its hex text.
fn hash_password(password: &str, salt: &str) -> String {
    let mut hash = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), PBKDF2_ROUNDS, &mut hash);
    hex::encode(hash)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
