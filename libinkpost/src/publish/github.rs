//! Publisher backed by the GitHub Contents API
//!
//! Every file change is a commit on the configured branch. Posts live at
//! `{posts_dir}/{slug}.md`; uploaded images at `{images_dir}/{slug}/{file}`
//! and are referenced from the post as `{image_url_prefix}/{slug}/{file}`.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{frontmatter, PublishResult, Publisher};
use crate::auth::AuthState;
use crate::config::{Config, ContentConfig};
use crate::error::{AuthError, InkpostError, PublishError};
use crate::github::{describe_failure, GitHubClient};
use crate::notifications::{NotificationBus, NotifyOptions};
use crate::types::{AuthToken, Cover, DraftPost, ImageAsset, PostMode};

pub struct GitHubPublisher {
    client: GitHubClient,
    auth: Arc<AuthState>,
    notifier: NotificationBus,
    owner: String,
    repo: String,
    branch: String,
    content: ContentConfig,
}

#[derive(Deserialize)]
struct FileMetadata {
    sha: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct PutFile<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Serialize)]
struct DeleteFile<'a> {
    message: &'a str,
    sha: String,
    branch: &'a str,
}

fn join_path(dir: &str, rest: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", dir, rest)
    }
}

fn classify_failure(status: StatusCode, message: String) -> PublishError {
    match status {
        StatusCode::UNAUTHORIZED => PublishError::Auth(AuthError::InvalidCredential(message)),
        _ => PublishError::Remote(message),
    }
}

fn network(e: reqwest::Error) -> PublishError {
    PublishError::Network(e.to_string())
}

impl GitHubPublisher {
    pub fn new(
        client: GitHubClient,
        auth: Arc<AuthState>,
        notifier: NotificationBus,
        config: &Config,
    ) -> Self {
        Self {
            client,
            auth,
            notifier,
            owner: config.github.owner.clone(),
            repo: config.github.repo.clone(),
            branch: config.github.branch.clone(),
            content: config.content.clone(),
        }
    }

    pub fn post_path(&self, slug: &str) -> String {
        join_path(&self.content.posts_dir, &format!("{}.md", slug.trim()))
    }

    fn image_path(&self, slug: &str, file_name: &str) -> String {
        join_path(
            &self.content.images_dir,
            &format!("{}/{}", slug.trim(), file_name),
        )
    }

    fn image_url(&self, slug: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.content.image_url_prefix.trim_end_matches('/'),
            slug.trim(),
            file_name
        )
    }

    fn contents_url(&self, path: &str) -> PublishResult<Url> {
        let segments = ["repos", self.owner.as_str(), self.repo.as_str(), "contents"]
            .into_iter()
            .chain(path.split('/').filter(|s| !s.is_empty()));
        self.client
            .url(segments)
            .ok_or_else(|| PublishError::Remote("invalid GitHub API base URL".to_string()))
    }

    async fn token(&self) -> PublishResult<AuthToken> {
        self.auth.get_token(None).await.map_err(|e| match e {
            InkpostError::Auth(auth) => PublishError::Auth(auth),
            other => PublishError::Io(other.to_string()),
        })
    }

    /// Current metadata of `path` on the branch, `None` if it does not exist
    async fn metadata(&self, token: &AuthToken, path: &str) -> PublishResult<Option<FileMetadata>> {
        let mut url = self.contents_url(path)?;
        url.query_pairs_mut().append_pair("ref", &self.branch);

        let response = self
            .client
            .request(Method::GET, url, token.expose())
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_failure(status, describe_failure(response).await));
        }

        let metadata = response
            .json::<FileMetadata>()
            .await
            .map_err(|e| PublishError::Remote(format!("unexpected contents response: {}", e)))?;
        Ok(Some(metadata))
    }

    /// Create or replace `path` with `bytes`
    async fn put_file(
        &self,
        token: &AuthToken,
        path: &str,
        bytes: &[u8],
        message: &str,
    ) -> PublishResult<()> {
        let sha = self.metadata(token, path).await?.map(|m| m.sha);
        let body = PutFile {
            message,
            content: STANDARD.encode(bytes),
            branch: &self.branch,
            sha,
        };

        let response = self
            .client
            .request(Method::PUT, self.contents_url(path)?, token.expose())
            .json(&body)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_failure(status, describe_failure(response).await));
        }
        tracing::debug!("Wrote {} ({} bytes)", path, bytes.len());
        Ok(())
    }

    async fn delete_file(&self, token: &AuthToken, path: &str, message: &str) -> PublishResult<()> {
        let metadata = self
            .metadata(token, path)
            .await?
            .ok_or_else(|| PublishError::Remote(format!("{} does not exist", path)))?;
        let body = DeleteFile {
            message,
            sha: metadata.sha,
            branch: &self.branch,
        };

        let response = self
            .client
            .request(Method::DELETE, self.contents_url(path)?, token.expose())
            .json(&body)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_failure(status, describe_failure(response).await));
        }
        tracing::debug!("Deleted {}", path);
        Ok(())
    }

    async fn read_local(path: &std::path::Path) -> PublishResult<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| PublishError::Io(format!("{}: {}", path.display(), e)))
    }

    /// Upload a local cover and return the URL the post should reference
    async fn upload_cover(
        &self,
        token: &AuthToken,
        slug: &str,
        cover: &Cover,
    ) -> PublishResult<String> {
        match cover {
            Cover::Url { url } => Ok(url.clone()),
            Cover::File { path } => {
                let asset = ImageAsset::new(path.clone());
                let mime = asset.mime_type().ok_or_else(|| {
                    PublishError::Io(format!("{}: unsupported image type", path.display()))
                })?;
                let file_name = format!("cover.{}", mime.extension());
                let bytes = Self::read_local(path).await?;
                self.put_file(
                    token,
                    &self.image_path(slug, &file_name),
                    &bytes,
                    &format!("Upload cover for {}", slug),
                )
                .await?;
                Ok(self.image_url(slug, &file_name))
            }
        }
    }

    async fn upload_image(&self, token: &AuthToken, slug: &str, image: &ImageAsset) -> PublishResult<()> {
        if image.mime_type().is_none() {
            return Err(PublishError::Io(format!(
                "{}: unsupported image type",
                image.path.display()
            )));
        }
        let file_name = image.file_name().ok_or_else(|| {
            PublishError::Io(format!("{}: not a file", image.path.display()))
        })?;
        let bytes = Self::read_local(&image.path).await?;
        self.put_file(
            token,
            &self.image_path(slug, &file_name),
            &bytes,
            &format!("Upload {} for {}", file_name, slug),
        )
        .await
    }

    /// Returns the path of the written post
    async fn push_inner(&self, draft: &DraftPost) -> PublishResult<String> {
        let token = self.token().await?;
        let slug = draft.form.slug.trim();

        let cover_url = match &draft.cover {
            Some(cover) => Some(self.upload_cover(&token, slug, cover).await?),
            None => None,
        };
        for image in &draft.images {
            self.upload_image(&token, slug, image).await?;
        }

        let date = draft
            .form
            .date
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let text = frontmatter::render(&draft.form, date, cover_url.as_deref())?;
        let path = self.post_path(slug);
        let verb = match draft.mode {
            PostMode::Create => "Publish",
            PostMode::Edit => "Update",
        };
        self.put_file(
            &token,
            &path,
            text.as_bytes(),
            &format!("{} post: {}", verb, draft.form.title.trim()),
        )
        .await?;

        // A renamed post must not leave its old file behind
        if draft.mode == PostMode::Edit {
            if let Some(original) = draft
                .original_slug
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != slug)
            {
                let old_path = self.post_path(original);
                self.delete_file(&token, &old_path, &format!("Rename post: {} -> {}", original, slug))
                    .await?;
            }
        }

        Ok(path)
    }
}

#[async_trait]
impl Publisher for GitHubPublisher {
    async fn push(&self, draft: &DraftPost) -> PublishResult<()> {
        let id = self.notifier.loading("Publishing post…", None);

        match self.push_inner(draft).await {
            Ok(path) => {
                tracing::info!("Published {}", path);
                self.notifier.success(
                    "Post published",
                    Some(
                        NotifyOptions::new()
                            .id(id)
                            .description("Changes pushed to GitHub; wait for the deployment to finish."),
                    ),
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("Publishing '{}' failed: {}", draft.form.slug, e);
                self.notifier.error(
                    "Publish failed",
                    Some(NotifyOptions::new().id(id).description(e.to_string())),
                );
                Err(e)
            }
        }
    }

    async fn delete(&self, slug: &str) -> PublishResult<()> {
        let token = self.token().await?;
        let path = self.post_path(slug);
        self.delete_file(&token, &path, &format!("Delete post: {}", slug.trim()))
            .await?;
        tracing::info!("Deleted {}", path);
        Ok(())
    }

    async fn load(&self, slug: &str) -> PublishResult<DraftPost> {
        let token = self.token().await?;
        let path = self.post_path(slug);
        let metadata = self
            .metadata(&token, &path)
            .await?
            .ok_or_else(|| PublishError::Remote(format!("{} does not exist", path)))?;

        let encoded: String = metadata
            .content
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| PublishError::Remote(format!("{}: invalid base64 content: {}", path, e)))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| PublishError::Remote(format!("{} is not valid UTF-8", path)))?;

        frontmatter::parse(slug.trim(), &text)
    }

    fn name(&self) -> &str {
        "github"
    }
}
