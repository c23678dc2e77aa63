//! Wiring of the library's components from a [`Config`]

use std::sync::Arc;

use crate::auth::{AuthState, GitHubAppIssuer};
use crate::config::Config;
use crate::credentials::open_cache;
use crate::error::AuthError;
use crate::github::GitHubClient;
use crate::notifications::NotificationBus;
use crate::orchestrator::Orchestrator;
use crate::publish::{GitHubPublisher, Publisher};
use crate::sync::SyncHub;
use crate::Result;

/// Everything a command needs: one auth state, its orchestrator and the
/// notification bus they report to
///
/// The auth state starts unauthenticated; call
/// [`AuthState::refresh`] to derive it from the cache.
pub struct Session {
    config: Arc<Config>,
    auth: Arc<AuthState>,
    orchestrator: Orchestrator,
    notifier: NotificationBus,
}

impl Session {
    /// Open a session using the configuration file
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config)
    }

    /// Open a session talking to GitHub, reporting on the global bus
    pub fn from_config(config: Config) -> Result<Self> {
        let cache = open_cache(&config.credentials)?;
        let client = GitHubClient::new(config.github.api_base_url.clone())
            .map_err(|e| AuthError::Network(format!("failed to build HTTP client: {}", e)))?;
        let issuer = Arc::new(GitHubAppIssuer::new(client.clone(), &config.github));
        let auth = Arc::new(AuthState::new(cache, issuer, SyncHub::new()));
        let notifier = NotificationBus::global().clone();
        let publisher = Arc::new(GitHubPublisher::new(
            client,
            Arc::clone(&auth),
            notifier.clone(),
            &config,
        ));

        Ok(Self::from_parts(config, auth, publisher, notifier))
    }

    /// Assemble a session from ready-made parts
    pub fn from_parts(
        config: Config,
        auth: Arc<AuthState>,
        publisher: Arc<dyn Publisher>,
        notifier: NotificationBus,
    ) -> Self {
        let orchestrator = Orchestrator::new(Arc::clone(&auth), publisher, notifier.clone());
        Self {
            config: Arc::new(config),
            auth,
            orchestrator,
            notifier,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn auth(&self) -> &Arc<AuthState> {
        &self.auth
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn notifier(&self) -> &NotificationBus {
        &self.notifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialConfig, StorageBackend};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        let mut config = Config::default_config();
        config.github.owner = "author".to_string();
        config.github.repo = "blog".to_string();
        config.github.app_id = "1".to_string();
        config.credentials = CredentialConfig {
            storage: StorageBackend::File,
            path: dir.path().to_string_lossy().to_string(),
            master_password: None,
        };
        config
    }

    #[tokio::test]
    async fn test_session_starts_unauthenticated() {
        let dir = TempDir::new().unwrap();
        let session = Session::from_config(config(&dir)).unwrap();

        assert!(!session.auth().is_authenticated());
        assert_eq!(session.auth().cache().backend_name(), "file");
        assert_eq!(session.config().github.repo, "blog");
    }

    #[tokio::test]
    async fn test_refresh_on_empty_cache_needs_no_network() {
        let dir = TempDir::new().unwrap();
        let session = Session::from_config(config(&dir)).unwrap();

        assert!(!session.auth().refresh().await);
    }
}
