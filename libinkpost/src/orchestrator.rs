//! Publish, delete and key-import flows
//!
//! The orchestrator sits between the author's commands and the
//! [`Publisher`]. Every run ends in an [`Outcome`] and every failure has
//! already been shown on the notification bus by the time the run returns;
//! errors are never propagated past this layer.
//!
//! Each run follows `Idle → Validating → (Idle | Submitting) → (Succeeded |
//! Failed)`. While a run is submitting, the loading flag is `true`. The flag
//! is reset by a guard, so it is cleared on every exit path, including a
//! collaborator that panics.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use zeroize::Zeroizing;

use crate::auth::AuthState;
use crate::error::{InkpostError, PublishError};
use crate::notifications::{NotificationBus, NotifyOptions};
use crate::publish::{PublishResult, Publisher};
use crate::types::{Credential, DraftPost};

const DEPLOYMENT_PENDING: &str = "Changes pushed to GitHub; wait for the deployment to finish.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

/// Terminal result of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { detail: Option<String> },
    Failure { error: PublishError },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn error(&self) -> Option<&PublishError> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { error } => Some(error),
        }
    }

    pub fn into_result(self) -> Result<Option<String>, PublishError> {
        match self {
            Outcome::Success { detail } => Ok(detail),
            Outcome::Failure { error } => Err(error),
        }
    }
}

impl From<PublishError> for Outcome {
    fn from(error: PublishError) -> Self {
        Outcome::Failure { error }
    }
}

fn into_publish_error(error: InkpostError) -> PublishError {
    match error {
        InkpostError::Auth(e) => PublishError::Auth(e),
        InkpostError::Publish(e) => e,
        other => PublishError::Io(other.to_string()),
    }
}

/// Holds the loading flag for the duration of a submission
struct OperationGuard<'a> {
    orchestrator: &'a Orchestrator,
    settled: bool,
}

impl<'a> OperationGuard<'a> {
    fn begin(orchestrator: &'a Orchestrator) -> Self {
        orchestrator.loading.send_replace(true);
        orchestrator.phase.send_replace(Phase::Submitting);
        Self {
            orchestrator,
            settled: false,
        }
    }

    fn settle(mut self, phase: Phase) {
        self.settled = true;
        self.orchestrator.phase.send_replace(phase);
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.orchestrator.phase.send_replace(Phase::Failed);
        }
        self.orchestrator.loading.send_replace(false);
    }
}

pub struct Orchestrator {
    auth: Arc<AuthState>,
    publisher: Arc<dyn Publisher>,
    notifier: NotificationBus,
    loading: watch::Sender<bool>,
    phase: watch::Sender<Phase>,
}

impl Orchestrator {
    pub fn new(auth: Arc<AuthState>, publisher: Arc<dyn Publisher>, notifier: NotificationBus) -> Self {
        let (loading, _) = watch::channel(false);
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            auth,
            publisher,
            notifier,
            loading,
            phase,
        }
    }

    pub fn auth(&self) -> &Arc<AuthState> {
        &self.auth
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Follow the loading flag, e.g. to disable a trigger while it is `true`
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn phases(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Validate and push `draft`
    ///
    /// The publisher reports the result of the push itself, so nothing is
    /// emitted here once the push has started.
    pub async fn publish(&self, draft: &DraftPost) -> Outcome {
        self.phase.send_replace(Phase::Validating);

        let missing = if draft.form.title.trim().is_empty() {
            Some(("title", "Please enter a post title"))
        } else if draft.form.slug.trim().is_empty() {
            Some(("slug", "Please enter a post slug (URL path)"))
        } else {
            None
        };
        if let Some((field, message)) = missing {
            tracing::debug!("Publish rejected: missing {}", field);
            self.notifier.warning(message, None);
            self.phase.send_replace(Phase::Idle);
            return PublishError::Validation {
                field: field.to_string(),
            }
            .into();
        }

        let guard = OperationGuard::begin(self);
        let publisher = Arc::clone(&self.publisher);
        let payload = draft.clone();
        let result = tokio::spawn(async move { publisher.push(&payload).await }).await;

        match result {
            Ok(Ok(())) => {
                guard.settle(Phase::Succeeded);
                Outcome::Success { detail: None }
            }
            Ok(Err(error)) => {
                tracing::debug!("Push of '{}' failed: {}", draft.form.slug, error);
                guard.settle(Phase::Failed);
                error.into()
            }
            Err(join_error) => {
                // The push never got to report anything
                let error = PublishError::Remote(format!("push aborted: {}", join_error));
                self.notifier.error(
                    "Publish failed",
                    Some(NotifyOptions::new().description(error.to_string())),
                );
                guard.settle(Phase::Failed);
                error.into()
            }
        }
    }

    /// Delete the post `draft` was loaded from, or the one its slug names
    pub async fn delete(&self, draft: &DraftPost) -> Outcome {
        self.phase.send_replace(Phase::Validating);

        let Some(slug) = draft.delete_target().map(|s| s.trim().to_string()) else {
            self.notifier.error("Missing slug, cannot delete", None);
            self.phase.send_replace(Phase::Idle);
            return PublishError::MissingSlug.into();
        };

        let guard = OperationGuard::begin(self);
        let publisher = Arc::clone(&self.publisher);
        let target = slug.clone();
        let result = tokio::spawn(async move { publisher.delete(&target).await })
            .await
            .unwrap_or_else(|join_error| {
                Err(PublishError::Remote(format!("delete aborted: {}", join_error)))
            });

        match result {
            Ok(()) => {
                tracing::info!("Deleted post '{}'", slug);
                self.notifier.success(
                    "Post deleted",
                    Some(NotifyOptions::new().description(DEPLOYMENT_PENDING)),
                );
                guard.settle(Phase::Succeeded);
                Outcome::Success {
                    detail: Some(DEPLOYMENT_PENDING.to_string()),
                }
            }
            Err(error) => {
                tracing::error!("Deleting '{}' failed: {}", slug, error);
                self.notifier.error(
                    "Delete failed",
                    Some(NotifyOptions::new().description(error.to_string())),
                );
                guard.settle(Phase::Failed);
                error.into()
            }
        }
    }

    /// Import the private key stored at `path`
    ///
    /// The key is checked against the issuer first and is only written to the
    /// credential cache once it has produced a token.
    pub async fn import_key(&self, path: &Path) -> Outcome {
        let material = match tokio::fs::read_to_string(path).await {
            Ok(text) => Zeroizing::new(text),
            Err(e) => {
                let error = PublishError::Io(format!("{}: {}", path.display(), e));
                self.notifier.error(
                    "Failed to read key file",
                    Some(NotifyOptions::new().description(error.to_string())),
                );
                return error.into();
            }
        };

        let id = self.notifier.loading("Verifying private key…", None);

        let verified = match self.auth.verify(Credential::new(material.as_str())).await {
            Ok(verified) => verified,
            Err(e) => {
                tracing::warn!("Key from {:?} failed verification: {}", path, e);
                let error = into_publish_error(e);
                self.notifier.error(
                    "Key verification failed, check that the key is correct",
                    Some(NotifyOptions::new().id(id).description(error.to_string())),
                );
                return error.into();
            }
        };

        if let Err(e) = self.auth.set_credential(verified) {
            let error = into_publish_error(e);
            self.notifier.error(
                "Failed to store private key",
                Some(NotifyOptions::new().id(id).description(error.to_string())),
            );
            return error.into();
        }

        self.notifier
            .success("Private key imported", Some(NotifyOptions::new().id(id)));
        Outcome::Success { detail: None }
    }

    /// Fetch a stored post for editing
    ///
    /// # Errors
    ///
    /// Returns the publisher's error after showing "Failed to load post".
    pub async fn load_for_edit(&self, slug: &str) -> PublishResult<DraftPost> {
        match self.publisher.load(slug).await {
            Ok(draft) => Ok(draft),
            Err(error) => {
                tracing::error!("Loading '{}' failed: {}", slug, error);
                self.notifier.error(
                    "Failed to load post",
                    Some(NotifyOptions::new().description(error.to_string())),
                );
                Err(error)
            }
        }
    }
}
