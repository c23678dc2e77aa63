//! In-memory collaborators for tests
//!
//! [`MemoryCache`], [`MockIssuer`] and [`MockPublisher`] stand in for the
//! credential store, the GitHub App exchange and the Contents API. They keep
//! call counts and recorded arguments so tests can assert on what was (and
//! was not) called.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use zeroize::Zeroizing;

use crate::auth::issuer::{AuthResult, TokenIssuer};
use crate::credentials::CredentialCache;
use crate::error::{AuthError, CredentialError, PublishError};
use crate::notifications::{NotificationBus, NotifyOptions};
use crate::publish::{PublishResult, Publisher};
use crate::types::{AuthToken, Credential, DraftPost, PostMode};
use crate::Result;

// ============================================================================
// Credential cache
// ============================================================================

/// Credential cache held in memory
#[derive(Default)]
pub struct MemoryCache {
    slots: Mutex<HashMap<String, Zeroizing<String>>>,
    unreadable: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read fail, as a corrupt or locked store would
    pub fn set_unreadable(&self, unreadable: bool) {
        self.unreadable.store(unreadable, Ordering::SeqCst);
    }

    pub fn slot_count(&self) -> usize {
        self.slots.lock().unwrap().len()
    }
}

impl CredentialCache for MemoryCache {
    fn write_slot(&self, slot: &str, value: &str) -> Result<()> {
        self.slots
            .lock()
            .unwrap()
            .insert(slot.to_string(), Zeroizing::new(value.to_string()));
        Ok(())
    }

    fn read_slot(&self, slot: &str) -> Result<Option<Zeroizing<String>>> {
        if self.unreadable.load(Ordering::SeqCst) {
            return Err(CredentialError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "mock cache is unreadable",
            ))
            .into());
        }
        Ok(self.slots.lock().unwrap().get(slot).cloned())
    }

    fn remove_slot(&self, slot: &str) -> Result<()> {
        self.slots.lock().unwrap().remove(slot);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Token issuer
// ============================================================================

/// Issuer that accepts a fixed set of keys
///
/// Every successful call returns a distinct token (`ghs_mock_<n>`).
#[derive(Default)]
pub struct MockIssuer {
    accepted: Mutex<HashSet<String>>,
    network_down: AtomicBool,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl MockIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` with the mock remote side
    pub fn accept(&self, key: &str) {
        self.accepted.lock().unwrap().insert(key.to_string());
    }

    pub fn revoke(&self, key: &str) {
        self.accepted.lock().unwrap().remove(key);
    }

    pub fn set_network_down(&self, down: bool) {
        self.network_down.store(down, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Number of `issue_token` calls so far, successful or not
    pub fn issue_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenIssuer for MockIssuer {
    async fn issue_token(&self, credential: &Credential) -> AuthResult<AuthToken> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            sleep(delay).await;
        }

        if self.network_down.load(Ordering::SeqCst) {
            return Err(AuthError::Network("mock network is down".to_string()));
        }
        if !self.accepted.lock().unwrap().contains(credential.expose()) {
            return Err(AuthError::InvalidCredential(
                "key is not registered for this app".to_string(),
            ));
        }

        Ok(AuthToken::new(format!("ghs_mock_{}", n)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Publisher
// ============================================================================

/// Configuration for mock publisher behavior
#[derive(Debug, Clone, Default)]
pub struct MockPublisherConfig {
    /// Error returned by `push`
    pub push_error: Option<PublishError>,

    /// Error returned by `delete`
    pub delete_error: Option<PublishError>,

    /// Panic inside `push` instead of returning
    pub panic_on_push: bool,

    /// Panic inside `delete` instead of returning
    pub panic_on_delete: bool,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Stored posts by slug, served by `load`
    pub posts: Arc<Mutex<HashMap<String, DraftPost>>>,

    /// Every draft handed to `push`, in order
    pub pushed: Arc<Mutex<Vec<DraftPost>>>,

    /// Every slug handed to `delete`, in order
    pub deleted: Arc<Mutex<Vec<String>>>,
}

/// Publisher that records its calls and honors the notification contract:
/// `push` notifies, `delete` and `load` do not
pub struct MockPublisher {
    config: MockPublisherConfig,
    notifier: NotificationBus,
}

impl MockPublisher {
    pub fn new(config: MockPublisherConfig, notifier: NotificationBus) -> Self {
        Self { config, notifier }
    }

    pub fn success(notifier: NotificationBus) -> Self {
        Self::new(MockPublisherConfig::default(), notifier)
    }

    pub fn push_failure(notifier: NotificationBus, error: PublishError) -> Self {
        Self::new(
            MockPublisherConfig {
                push_error: Some(error),
                ..Default::default()
            },
            notifier,
        )
    }

    pub fn delete_failure(notifier: NotificationBus, error: PublishError) -> Self {
        Self::new(
            MockPublisherConfig {
                delete_error: Some(error),
                ..Default::default()
            },
            notifier,
        )
    }

    pub fn panicking(notifier: NotificationBus) -> Self {
        Self::new(
            MockPublisherConfig {
                panic_on_push: true,
                panic_on_delete: true,
                ..Default::default()
            },
            notifier,
        )
    }

    pub fn with_delay(notifier: NotificationBus, delay: Duration) -> Self {
        Self::new(
            MockPublisherConfig {
                delay,
                ..Default::default()
            },
            notifier,
        )
    }

    /// Seed a stored post for `load`
    pub fn with_post(self, draft: DraftPost) -> Self {
        self.config
            .posts
            .lock()
            .unwrap()
            .insert(draft.form.slug.clone(), draft);
        self
    }

    pub fn push_count(&self) -> usize {
        self.config.pushed.lock().unwrap().len()
    }

    pub fn pushed(&self) -> Vec<DraftPost> {
        self.config.pushed.lock().unwrap().clone()
    }

    pub fn delete_count(&self) -> usize {
        self.config.deleted.lock().unwrap().len()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.config.deleted.lock().unwrap().clone()
    }

    pub fn has_post(&self, slug: &str) -> bool {
        self.config.posts.lock().unwrap().contains_key(slug)
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn push(&self, draft: &DraftPost) -> PublishResult<()> {
        self.config.pushed.lock().unwrap().push(draft.clone());
        let id = self.notifier.loading("Publishing post…", None);

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
        if self.config.panic_on_push {
            panic!("mock push panicked");
        }

        if let Some(error) = &self.config.push_error {
            self.notifier.error(
                "Publish failed",
                Some(NotifyOptions::new().id(id).description(error.to_string())),
            );
            return Err(error.clone());
        }

        {
            let mut posts = self.config.posts.lock().unwrap();
            if draft.mode == PostMode::Edit {
                if let Some(original) = &draft.original_slug {
                    posts.remove(original);
                }
            }
            posts.insert(draft.form.slug.clone(), draft.clone());
        }
        self.notifier
            .success("Post published", Some(NotifyOptions::new().id(id)));
        Ok(())
    }

    async fn delete(&self, slug: &str) -> PublishResult<()> {
        self.config.deleted.lock().unwrap().push(slug.to_string());

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
        if self.config.panic_on_delete {
            panic!("mock delete panicked");
        }

        if let Some(error) = &self.config.delete_error {
            return Err(error.clone());
        }
        self.config.posts.lock().unwrap().remove(slug);
        Ok(())
    }

    async fn load(&self, slug: &str) -> PublishResult<DraftPost> {
        self.config
            .posts
            .lock()
            .unwrap()
            .get(slug)
            .cloned()
            .map(|draft| draft.editing(slug))
            .ok_or_else(|| PublishError::Remote(format!("404 Not Found: post '{}'", slug)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
