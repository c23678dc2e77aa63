//! Push, delete and load collaborators
//!
//! A [`Publisher`] owns the network side of writing posts. The notification
//! contract differs per operation:
//!
//! - `push` reports its own progress and outcome on the notification bus and
//!   returns the error afterwards so the caller can stop
//! - `delete` and `load` stay silent; the caller decides what to tell the
//!   author

pub mod frontmatter;
pub mod github;

use async_trait::async_trait;

pub use github::GitHubPublisher;

use crate::error::PublishError;
use crate::types::DraftPost;

pub type PublishResult<T> = std::result::Result<T, PublishError>;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Create or update the post described by `draft`, uploading its cover
    /// and images
    async fn push(&self, draft: &DraftPost) -> PublishResult<()>;

    /// Remove the post stored under `slug`
    async fn delete(&self, slug: &str) -> PublishResult<()>;

    /// Fetch the post stored under `slug` as an edit-mode draft
    async fn load(&self, slug: &str) -> PublishResult<DraftPost>;

    fn name(&self) -> &str;
}
