//! Auth-state synchronization
//!
//! Two kinds of signal make an [`AuthState`](crate::auth::AuthState) re-check
//! the stored credential:
//!
//! - `Changed`: another auth state in this process saved or cleared the
//!   credential. Delivered over a [`SyncHub`].
//! - `Storage`: the credential file was modified by another process.
//!   Produced by a [`StorageWatcher`] and delivered over the same hub.
//!
//! Signals carry no credential data; receivers always re-read the cache.

use std::path::{Path, PathBuf};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast;

use crate::error::CredentialError;
use crate::Result;

const HUB_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSignal {
    /// An auth state in this process changed the credential
    Changed { origin: u64 },
    /// The storage slot named `key` changed on disk
    Storage { key: String },
}

/// In-process broadcast channel for [`AuthSignal`]s
#[derive(Clone)]
pub struct SyncHub {
    sender: broadcast::Sender<AuthSignal>,
}

impl SyncHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthSignal> {
        self.sender.subscribe()
    }

    pub fn announce_changed(&self, origin: u64) {
        self.send(AuthSignal::Changed { origin });
    }

    pub fn storage_changed(&self, key: impl Into<String>) {
        self.send(AuthSignal::Storage { key: key.into() });
    }

    fn send(&self, signal: AuthSignal) {
        // No subscribers is fine
        if self.sender.send(signal.clone()).is_err() {
            tracing::trace!("No auth state listening for {:?}", signal);
        }
    }
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Watches one credential file and forwards changes as `Storage` signals
///
/// The parent directory is watched rather than the file itself, because
/// saves replace the file through a rename and clears delete it.
pub struct StorageWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl StorageWatcher {
    /// Start watching `slot_path`, reporting changes under `key`
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Watch` if the platform watcher cannot be
    /// created or the directory cannot be watched.
    pub fn spawn(slot_path: &Path, key: &str, hub: SyncHub) -> Result<Self> {
        let dir = slot_path
            .parent()
            .ok_or_else(|| CredentialError::Watch(format!("{:?} has no parent", slot_path)))?
            .to_path_buf();
        std::fs::create_dir_all(&dir).map_err(CredentialError::Io)?;

        let file_name = slot_path.file_name().map(|name| name.to_os_string());
        let key = key.to_string();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Credential watcher error: {}", e);
                    return;
                }
            };

            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }

            let touches_slot = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if touches_slot {
                tracing::debug!("Credential storage changed ({:?})", event.kind);
                hub.storage_changed(key.as_str());
            }
        })
        .map_err(|e| CredentialError::Watch(e.to_string()))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| CredentialError::Watch(e.to_string()))?;

        tracing::debug!("Watching {:?} for credential changes", slot_path);
        Ok(Self {
            _watcher: watcher,
            path: slot_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
