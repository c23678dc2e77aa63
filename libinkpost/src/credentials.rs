//! Durable storage for the author's credential
//!
//! The cache holds two slots: the private key (under [`CREDENTIAL_STORAGE_KEY`])
//! and the last token issued for it (under [`TOKEN_STORAGE_KEY`]). It performs
//! no validation; whether a key actually authenticates is decided by the
//! token issuer.
//!
//! # Backends
//!
//! - `FileCache`: plain files with 0600 permissions (default)
//! - `EncryptedFileCache`: `age` passphrase-encrypted files
//! - `KeyringCache`: OS-native keyring
//!
//! File backends name the key file after the storage key, so a
//! [`StorageWatcher`](crate::sync::StorageWatcher) can tell a credential
//! change apart from any other write in the directory.
//!
//! # Example
//!
//! ```no_run
//! use libinkpost::credentials::{open_cache, CredentialConfig};
//! use libinkpost::Credential;
//!
//! # fn example() -> libinkpost::Result<()> {
//! let cache = open_cache(&CredentialConfig::default())?;
//! cache.save(&Credential::new(std::fs::read_to_string("app.pem").unwrap()))?;
//! assert!(cache.load()?.is_some());
//! cache.clear()?;
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CredentialError, Result};
use crate::types::{AuthToken, Credential};

/// Storage key of the private key slot
pub const CREDENTIAL_STORAGE_KEY: &str = "author.key";

/// Storage key of the last-issued-token slot
pub const TOKEN_STORAGE_KEY: &str = "author.token";

const KEYRING_SERVICE: &str = "inkpost";

/// Key/value persistence for the single author credential
///
/// Backends implement the three slot primitives; `save`, `load` and `clear`
/// are built on top of them.
pub trait CredentialCache: Send + Sync {
    /// Replace the contents of a slot
    fn write_slot(&self, slot: &str, value: &str) -> Result<()>;

    /// Read a slot, `None` when it was never written or has been removed
    fn read_slot(&self, slot: &str) -> Result<Option<Zeroizing<String>>>;

    /// Remove a slot. Removing a missing slot is not an error.
    fn remove_slot(&self, slot: &str) -> Result<()>;

    /// Name of this backend for logs and `ink-creds status`
    fn backend_name(&self) -> &str;

    /// File backing a slot, if this backend is file based
    fn slot_path(&self, _slot: &str) -> Option<PathBuf> {
        None
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        self.write_slot(CREDENTIAL_STORAGE_KEY, credential.expose())
    }

    fn load(&self) -> Result<Option<Credential>> {
        Ok(self
            .read_slot(CREDENTIAL_STORAGE_KEY)?
            .filter(|value| !value.trim().is_empty())
            .map(|value| Credential::new(value.as_str())))
    }

    /// Remove the key and everything derived from it
    ///
    /// The token slot goes first so that observers of the key slot never see
    /// a token outliving its key.
    fn clear(&self) -> Result<()> {
        self.remove_slot(TOKEN_STORAGE_KEY)?;
        self.remove_slot(CREDENTIAL_STORAGE_KEY)
    }

    fn save_token(&self, token: &AuthToken) -> Result<()> {
        self.write_slot(TOKEN_STORAGE_KEY, token.expose())
    }

    fn load_token(&self) -> Result<Option<AuthToken>> {
        Ok(self
            .read_slot(TOKEN_STORAGE_KEY)?
            .filter(|value| !value.is_empty())
            .map(|value| AuthToken::new(value.as_str())))
    }
}

/// Refuse to read credential files that are symbolic links
pub fn validate_not_symlink(path: &Path) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| {
        CredentialError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read metadata for '{}': {}", path.display(), e),
        ))
    })?;

    if metadata.is_symlink() {
        return Err(CredentialError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "Security: credential file '{}' is a symbolic link. \
                Credential files must be regular files.",
                path.display()
            ),
        ))
        .into());
    }

    Ok(())
}

/// Write `bytes` to `path` through a temporary sibling and a rename, so that
/// another process never reads a half-written key.
fn write_private_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(CredentialError::Io)?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = parent.join(format!(".{}.tmp", file_name));

    {
        let mut file = std::fs::File::create(&tmp_path).map_err(CredentialError::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&tmp_path, perms).map_err(CredentialError::Io)?;
        }

        file.write_all(bytes).map_err(CredentialError::Io)?;
        file.sync_all().map_err(CredentialError::Io)?;
    }

    std::fs::rename(&tmp_path, path).map_err(CredentialError::Io)?;
    Ok(())
}

fn remove_file_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Removed {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CredentialError::Io(e).into()),
    }
}

// ============================================================================
// Plain files
// ============================================================================

/// Plain file storage: one file per slot, owner read/write only
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, slot: &str) -> PathBuf {
        self.dir.join(slot)
    }
}

impl CredentialCache for FileCache {
    fn write_slot(&self, slot: &str, value: &str) -> Result<()> {
        let path = self.path(slot);
        write_private_file(&path, value.as_bytes())?;
        tracing::debug!("Stored {} at {:?}", slot, path);
        Ok(())
    }

    fn read_slot(&self, slot: &str) -> Result<Option<Zeroizing<String>>> {
        let path = self.path(slot);
        if !path.exists() {
            return Ok(None);
        }
        validate_not_symlink(&path)?;

        let value = Zeroizing::new(std::fs::read_to_string(&path).map_err(CredentialError::Io)?);
        Ok(Some(value))
    }

    fn remove_slot(&self, slot: &str) -> Result<()> {
        remove_file_if_present(&self.path(slot))
    }

    fn backend_name(&self) -> &str {
        "file"
    }

    fn slot_path(&self, slot: &str) -> Option<PathBuf> {
        Some(self.path(slot))
    }
}

// ============================================================================
// Encrypted files
// ============================================================================

/// Encrypted file storage using the `age` passphrase format
///
/// Slots are stored as `{slot}.age` with 0600 permissions. The master
/// password must be set before any read or write.
pub struct EncryptedFileCache {
    dir: PathBuf,
    master_password: Arc<RwLock<Option<String>>>,
}

impl EncryptedFileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            master_password: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the master password for encryption/decryption
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::WeakPassword` if the password is less than 8 characters.
    pub fn set_master_password(&self, password: String) -> Result<()> {
        if password.len() < 8 {
            return Err(CredentialError::WeakPassword.into());
        }

        *self
            .master_password
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(password);
        tracing::debug!("Master password set for encrypted credential cache");
        Ok(())
    }

    fn password(&self) -> Result<String> {
        self.master_password
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(|| CredentialError::MasterPasswordNotSet.into())
    }

    pub(crate) fn encrypt(&self, data: &str) -> Result<Vec<u8>> {
        let password = self.password()?;
        let encryptor = age::Encryptor::with_user_passphrase(age::secrecy::Secret::new(password));

        let mut encrypted = vec![];
        let mut writer = encryptor
            .wrap_output(&mut encrypted)
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;
        writer
            .write_all(data.as_bytes())
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        Ok(encrypted)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Zeroizing<String>> {
        let password = self.password()?;

        let decryptor = match age::Decryptor::new(data) {
            Ok(age::Decryptor::Passphrase(d)) => d,
            Ok(_) => {
                return Err(CredentialError::Encryption(
                    "Invalid encryption format (expected passphrase)".to_string(),
                )
                .into())
            }
            Err(e) => return Err(CredentialError::Encryption(e.to_string()).into()),
        };

        let mut reader = decryptor
            .decrypt(&age::secrecy::Secret::new(password), None)
            .map_err(|e| {
                if e.to_string().contains("decryption") || e.to_string().contains("MAC") {
                    CredentialError::DecryptionFailed
                } else {
                    CredentialError::Encryption(e.to_string())
                }
            })?;

        let mut decrypted = Zeroizing::new(vec![]);
        reader
            .read_to_end(&mut decrypted)
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        let text = std::str::from_utf8(&decrypted)
            .map_err(|e| CredentialError::Encryption(format!("Invalid UTF-8: {}", e)))?;
        Ok(Zeroizing::new(text.to_owned()))
    }

    fn path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{}.age", slot))
    }
}

impl CredentialCache for EncryptedFileCache {
    fn write_slot(&self, slot: &str, value: &str) -> Result<()> {
        let encrypted = self.encrypt(value)?;
        let path = self.path(slot);
        write_private_file(&path, &encrypted)?;
        tracing::debug!("Stored encrypted {} at {:?}", slot, path);
        Ok(())
    }

    fn read_slot(&self, slot: &str) -> Result<Option<Zeroizing<String>>> {
        let path = self.path(slot);
        if !path.exists() {
            return Ok(None);
        }
        validate_not_symlink(&path)?;

        let encrypted = std::fs::read(&path).map_err(CredentialError::Io)?;
        self.decrypt(&encrypted).map(Some)
    }

    fn remove_slot(&self, slot: &str) -> Result<()> {
        remove_file_if_present(&self.path(slot))
    }

    fn backend_name(&self) -> &str {
        "encrypted_file"
    }

    fn slot_path(&self, slot: &str) -> Option<PathBuf> {
        Some(self.path(slot))
    }
}

// ============================================================================
// OS keyring
// ============================================================================

/// OS-native keyring storage (Keychain, Credential Manager, Secret Service)
///
/// Keyring writes produce no filesystem events, so processes sharing a
/// keyring backend converge only through their own refreshes.
pub struct KeyringCache {
    service: String,
}

impl KeyringCache {
    /// # Errors
    ///
    /// Returns `CredentialError::Keyring` if the OS keyring cannot be accessed.
    pub fn new() -> Result<Self> {
        keyring::Entry::new(KEYRING_SERVICE, "availability_check").map_err(|e| {
            CredentialError::Keyring(format!("OS keyring not accessible: {}", e))
        })?;
        Ok(Self {
            service: KEYRING_SERVICE.to_string(),
        })
    }

    fn entry(&self, slot: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, slot)
            .map_err(|e| CredentialError::Keyring(e.to_string()).into())
    }
}

impl CredentialCache for KeyringCache {
    fn write_slot(&self, slot: &str, value: &str) -> Result<()> {
        self.entry(slot)?
            .set_password(value)
            .map_err(|e| CredentialError::Keyring(e.to_string()))?;
        tracing::debug!("Stored {} in OS keyring", slot);
        Ok(())
    }

    fn read_slot(&self, slot: &str) -> Result<Option<Zeroizing<String>>> {
        match self.entry(slot)?.get_password() {
            Ok(value) => Ok(Some(Zeroizing::new(value))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CredentialError::Keyring(e.to_string()).into()),
        }
    }

    fn remove_slot(&self, slot: &str) -> Result<()> {
        match self.entry(slot)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::Keyring(e.to_string()).into()),
        }
    }

    fn backend_name(&self) -> &str {
        "keyring"
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Storage backend type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Plain files with 0600 permissions
    #[default]
    File,
    /// Encrypted files with master password
    Encrypted,
    /// OS-native keyring
    Keyring,
}

/// Credential storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    #[serde(default)]
    pub storage: StorageBackend,

    /// Directory for file-based backends
    #[serde(default = "default_credential_path")]
    pub path: String,

    /// Master password for encrypted storage (not serialized)
    #[serde(skip)]
    pub master_password: Option<String>,
}

fn default_credential_path() -> String {
    "~/.config/inkpost".to_string()
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::File,
            path: default_credential_path(),
            master_password: None,
        }
    }
}

impl CredentialConfig {
    /// Pick up `INKPOST_MASTER_PASSWORD` if it is set and non-empty
    pub fn load_master_password_from_env(&mut self) {
        if let Ok(password) = std::env::var("INKPOST_MASTER_PASSWORD") {
            if !password.is_empty() {
                self.master_password = Some(password);
                tracing::debug!(
                    "Loaded master password from INKPOST_MASTER_PASSWORD environment variable"
                );
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(CredentialError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Credential path cannot be empty",
            ))
            .into());
        }
        Ok(())
    }

    /// Expand `~` in the credential path
    pub fn expand_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

/// Open the cache selected by `config`
///
/// For the encrypted backend without a configured master password, prompts
/// on the terminal when stdin is a TTY.
///
/// # Errors
///
/// Returns an error if the keyring is unavailable or no master password can
/// be obtained for the encrypted backend.
pub fn open_cache(config: &CredentialConfig) -> Result<Arc<dyn CredentialCache>> {
    config.validate()?;
    let dir = config.expand_path();

    match config.storage {
        StorageBackend::File => {
            tracing::debug!("Using plain file credential cache at {:?}", dir);
            Ok(Arc::new(FileCache::new(dir)))
        }
        StorageBackend::Keyring => {
            tracing::debug!("Using OS keyring credential cache");
            Ok(Arc::new(KeyringCache::new()?))
        }
        StorageBackend::Encrypted => {
            let cache = EncryptedFileCache::new(dir);
            let password = match &config.master_password {
                Some(password) => password.clone(),
                None if atty::is(atty::Stream::Stdin) => {
                    rpassword::prompt_password("Enter master password for credential encryption: ")
                        .map_err(CredentialError::Io)?
                }
                None => return Err(CredentialError::MasterPasswordNotSet.into()),
            };
            cache.set_master_password(password)?;
            tracing::debug!("Using encrypted file credential cache");
            Ok(Arc::new(cache))
        }
    }
}
