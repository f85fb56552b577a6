//! Accounts and their credentials.
//!
//! Accounts live in the proxy, not the world: the world only ever sees the
//! username and the entity bound to it. Passwords are stored as Argon2id PHC
//! strings keyed with a process secret and are never compared in the clear.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use argon2::{Algorithm, Argon2, Params, Version};
use mud_entity::EntityId;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AccountError;

/// Length of generated passwords.
pub const GENERATED_PASSWORD_LEN: usize = 12;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// As typed at registration; lookups ignore case.
    pub username: String,
    pub email: String,
    password_hash: String,
    /// The entity this account plays, once the world has created it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityId>,
}

impl Account {
    #[must_use]
    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }
}

// ── Password hashing ────────────────────────────────────────────────────────

/// Argon2id keyed with a process-wide secret.
#[derive(Clone)]
pub struct PasswordHasher {
    secret: Vec<u8>,
    params: Params,
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("secret", &"<redacted>")
            .field("params", &self.params)
            .finish()
    }
}

impl PasswordHasher {
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self::with_params(secret, Params::default())
    }

    /// A hasher with explicit cost parameters.
    #[must_use]
    pub fn with_params(secret: impl Into<Vec<u8>>, params: Params) -> Self {
        Self {
            secret: secret.into(),
            params,
        }
    }

    fn argon2(&self) -> Result<Argon2<'_>, AccountError> {
        if self.secret.is_empty() {
            return Ok(Argon2::new(
                Algorithm::Argon2id,
                Version::V0x13,
                self.params.clone(),
            ));
        }
        Argon2::new_with_secret(
            &self.secret,
            Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
        .map_err(|err| AccountError::Hash(err.to_string()))
    }

    /// Hash `password` with a fresh salt into a PHC string.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::Hash`] if hashing fails.
    pub fn hash(&self, password: &str) -> Result<String, AccountError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self.argon2()?.hash_password(password.as_bytes(), &salt)?;
        Ok(hash.to_string())
    }

    /// Returns `true` if `password` matches the PHC string `hash`.
    #[must_use]
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2()
            .is_ok_and(|argon2| argon2.verify_password(password.as_bytes(), &parsed).is_ok())
    }

    async fn hash_blocking(&self, password: &str) -> Result<String, AccountError> {
        let hasher = self.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| AccountError::Hash(err.to_string()))?
    }

    async fn verify_blocking(&self, password: &str, hash: &str) -> bool {
        let hasher = self.clone();
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .unwrap_or(false)
    }
}

/// A random alphanumeric password for a new account.
#[must_use]
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Usernames are 3 to 20 ASCII letters, digits or underscores and start with
/// a letter.
///
/// # Errors
///
/// Returns [`AccountError::InvalidUsername`] otherwise.
pub fn validate_username(username: &str) -> Result<(), AccountError> {
    let len = username.chars().count();
    let starts_with_letter = username.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    let charset_ok = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if (USERNAME_MIN..=USERNAME_MAX).contains(&len) && starts_with_letter && charset_ok {
        Ok(())
    } else {
        Err(AccountError::InvalidUsername(username.to_string()))
    }
}

/// A loose shape check: `local@domain.tld`, no whitespace.
///
/// # Errors
///
/// Returns [`AccountError::InvalidEmail`] otherwise.
pub fn validate_email(email: &str) -> Result<(), AccountError> {
    let valid = !email.chars().any(char::is_whitespace)
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        });
    if valid {
        Ok(())
    } else {
        Err(AccountError::InvalidEmail(email.to_string()))
    }
}

// ── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountFile {
    accounts: Vec<Account>,
}

/// All accounts, keyed by lower-cased username.
///
/// Backed by a single pretty-printed JSON file rewritten atomically on every
/// change, or held only in memory. A change reaches the map only after the
/// file holding it is written; the map lock is never held across that write.
#[derive(Debug)]
pub struct AccountStore {
    path: Option<PathBuf>,
    hasher: PasswordHasher,
    accounts: RwLock<BTreeMap<String, Account>>,
    /// Serialises changes so each file written holds every earlier change.
    writer: Mutex<()>,
}

impl AccountStore {
    #[must_use]
    pub fn in_memory(hasher: PasswordHasher) -> Self {
        Self::with_accounts(None, hasher, BTreeMap::new())
    }

    fn with_accounts(
        path: Option<PathBuf>,
        hasher: PasswordHasher,
        accounts: BTreeMap<String, Account>,
    ) -> Self {
        Self {
            path,
            hasher,
            accounts: RwLock::new(accounts),
            writer: Mutex::new(()),
        }
    }

    /// Load the account file at `path`; a missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::Io`] or [`AccountError::Json`] if the file
    /// exists but cannot be read.
    pub async fn open(path: impl Into<PathBuf>, hasher: PasswordHasher) -> Result<Self, AccountError> {
        let path = path.into();
        let file = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<AccountFile>(&bytes)
                .map_err(|source| json_error(&path, source))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => AccountFile::default(),
            Err(source) => return Err(io_error(&path, source)),
        };

        let accounts: BTreeMap<_, _> = file
            .accounts
            .into_iter()
            .map(|a| (a.username.to_lowercase(), a))
            .collect();
        info!(path = %path.display(), accounts = accounts.len(), "loaded accounts");
        Ok(Self::with_accounts(Some(path), hasher, accounts))
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }

    pub async fn exists(&self, username: &str) -> bool {
        self.accounts
            .read()
            .await
            .contains_key(&username.to_lowercase())
    }

    /// # Errors
    ///
    /// Returns [`AccountError::NotFound`] for an unknown username.
    pub async fn get(&self, username: &str) -> Result<Account, AccountError> {
        self.accounts
            .read()
            .await
            .get(&username.to_lowercase())
            .cloned()
            .ok_or_else(|| AccountError::NotFound(username.to_string()))
    }

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::UsernameTaken`] if any account has the same
    /// username ignoring case, validation errors for a malformed username or
    /// email, and I/O errors if the file cannot be rewritten. Nothing is
    /// registered on error.
    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<Account, AccountError> {
        validate_username(username)?;
        validate_email(email)?;
        let key = username.to_lowercase();
        if self.accounts.read().await.contains_key(&key) {
            return Err(AccountError::UsernameTaken(username.to_string()));
        }

        let password_hash = self.hasher.hash_blocking(password).await?;
        // Checked again inside `apply`; a concurrent registration may have
        // won while we were hashing.
        let account = self
            .apply(key, |existing| match existing {
                Some(_) => Err(AccountError::UsernameTaken(username.to_string())),
                None => Ok(Account {
                    id: Uuid::new_v4(),
                    username: username.to_string(),
                    email: email.to_string(),
                    password_hash,
                    entity: None,
                }),
            })
            .await?;
        info!(account = %account.username, id = %account.id, "account created");
        Ok(account)
    }

    /// Check `username` and `password` together.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::InvalidCredentials`] whether the account is
    /// unknown or the password is wrong.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Account, AccountError> {
        let Ok(account) = self.get(username).await else {
            debug!(account = username, "login for unknown account");
            return Err(AccountError::InvalidCredentials);
        };
        if self.check_password(&account, password).await {
            Ok(account)
        } else {
            debug!(account = username, "wrong password");
            Err(AccountError::InvalidCredentials)
        }
    }

    pub async fn check_password(&self, account: &Account, password: &str) -> bool {
        self.hasher
            .verify_blocking(password, &account.password_hash)
            .await
    }

    /// # Errors
    ///
    /// Returns [`AccountError::NotFound`] for an unknown username, or an I/O
    /// error leaving the old password in place.
    pub async fn set_password(&self, username: &str, password: &str) -> Result<(), AccountError> {
        let hash = self.hasher.hash_blocking(password).await?;
        self.update(username, |account| account.password_hash = hash)
            .await
    }

    /// Record the entity `username` plays.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::NotFound`] for an unknown username, or an I/O
    /// error leaving the old binding in place.
    pub async fn bind_entity(&self, username: &str, entity: EntityId) -> Result<(), AccountError> {
        self.update(username, |account| account.entity = Some(entity))
            .await
    }

    async fn update(
        &self,
        username: &str,
        f: impl FnOnce(&mut Account),
    ) -> Result<(), AccountError> {
        self.apply(username.to_lowercase(), |existing| {
            let mut account = existing
                .cloned()
                .ok_or_else(|| AccountError::NotFound(username.to_string()))?;
            f(&mut account);
            Ok(account)
        })
        .await
        .map(|_| ())
    }

    /// Compute the new account stored under `key` from the current one, write
    /// the file, then publish the change.
    async fn apply<F>(&self, key: String, f: F) -> Result<Account, AccountError>
    where
        F: FnOnce(Option<&Account>) -> Result<Account, AccountError>,
    {
        let _writer = self.writer.lock().await;
        let (account, file) = {
            let accounts = self.accounts.read().await;
            let account = f(accounts.get(&key))?;
            let file = self.path.as_ref().map(|_| AccountFile {
                accounts: accounts
                    .iter()
                    .filter(|(k, _)| **k != key)
                    .map(|(_, a)| a.clone())
                    .chain(std::iter::once(account.clone()))
                    .collect(),
            });
            (account, file)
        };
        if let (Some(path), Some(file)) = (&self.path, file) {
            save(path, &file).await?;
        }
        self.accounts.write().await.insert(key, account.clone());
        Ok(account)
    }
}

async fn save(path: &Path, file: &AccountFile) -> Result<(), AccountError> {
    let bytes = serde_json::to_vec_pretty(file).map_err(|source| json_error(path, source))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|source| io_error(&tmp, source))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> AccountError {
    AccountError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn json_error(path: &Path, source: serde_json::Error) -> AccountError {
    AccountError::Json {
        path: path.to_path_buf(),
        source,
    }
}

/// Cheap hashing parameters for tests.
#[cfg(test)]
pub(crate) fn test_hasher() -> PasswordHasher {
    PasswordHasher::with_params("test-secret", Params::new(8, 1, 1, None).unwrap())
}
