//! Inkpost - publish to a GitHub-hosted static site from the terminal
//!
//! The library holds the author's credential (a GitHub App private key),
//! derives short-lived tokens from it, and drives the publish, delete and
//! key-import flows used by the `ink-*` binaries.

pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod github;
pub mod logging;
pub mod mock;
pub mod notifications;
pub mod orchestrator;
pub mod publish;
pub mod session;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use auth::{AuthSnapshot, AuthState, GitHubAppIssuer, TokenIssuer, VerifiedCredential};
pub use config::Config;
pub use credentials::{open_cache, CredentialCache, CredentialConfig, StorageBackend};
pub use error::{AuthError, InkpostError, PublishError, Result};
pub use notifications::{NotificationBus, NotifyOptions, Severity};
pub use orchestrator::{Orchestrator, Outcome, Phase};
pub use publish::{GitHubPublisher, Publisher};
pub use session::Session;
pub use sync::{AuthSignal, StorageWatcher, SyncHub};
pub use types::{AuthToken, Cover, Credential, DraftPost, ImageAsset, PostForm, PostMode};
