//! Core types for Inkpost

use chrono::NaiveDate;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

// ============================================================================
// Credential material
// ============================================================================

/// The author's private key material (a PEM blob)
///
/// Opaque to everything except the token issuer. The contents are zeroed on
/// drop and never printed by `Debug`.
pub struct Credential(SecretString);

impl Credential {
    pub fn new(material: impl Into<String>) -> Self {
        Self(SecretString::from(material.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_blank(&self) -> bool {
        self.expose().trim().is_empty()
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_owned())
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Credential {}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Short-lived bearer token derived from a [`Credential`]
///
/// Expiry is enforced by the remote side only.
pub struct AuthToken(SecretString);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// First 8 bytes of the SHA-256 of the token, hex encoded. Safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.expose().as_bytes());
        digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl Clone for AuthToken {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_owned())
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthToken({})", self.fingerprint())
    }
}

// ============================================================================
// Drafts
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostMode {
    #[default]
    Create,
    Edit,
}

/// Cover image of a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Cover {
    /// Already hosted somewhere; written to the frontmatter as-is
    Url { url: String },
    /// Local file uploaded next to the post's images
    File { path: PathBuf },
}

/// A local image uploaded alongside the post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageAsset {
    pub path: PathBuf,
}

impl ImageAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    pub fn mime_type(&self) -> Option<ImageMimeType> {
        ImageMimeType::from_path(&self.path)
    }
}

/// Author-entered form fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PostForm {
    pub title: String,
    pub slug: String,
    pub body: String,
    /// Publication date; today is used when absent
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Frontmatter entries this tool does not manage, kept through an edit
    #[serde(default)]
    pub extra_frontmatter: serde_yaml::Mapping,
}

/// A post being written or edited
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DraftPost {
    pub form: PostForm,
    pub cover: Option<Cover>,
    #[serde(default)]
    pub images: Vec<ImageAsset>,
    #[serde(default)]
    pub mode: PostMode,
    /// Slug the post had when it was loaded for editing
    pub original_slug: Option<String>,
}

impl DraftPost {
    pub fn new(title: impl Into<String>, slug: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            form: PostForm {
                title: title.into(),
                slug: slug.into(),
                body: body.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Switch the draft to edit mode for the post currently stored at `original_slug`
    pub fn editing(mut self, original_slug: impl Into<String>) -> Self {
        self.mode = PostMode::Edit;
        self.original_slug = Some(original_slug.into());
        self
    }

    pub fn with_cover(mut self, cover: Cover) -> Self {
        self.cover = Some(cover);
        self
    }

    pub fn with_image(mut self, image: ImageAsset) -> Self {
        self.images.push(image);
        self
    }

    /// Slug a delete should target: the loaded slug wins over the edited one
    pub fn delete_target(&self) -> Option<&str> {
        self.original_slug
            .as_deref()
            .filter(|slug| !slug.trim().is_empty())
            .or_else(|| Some(self.form.slug.as_str()).filter(|slug| !slug.trim().is_empty()))
    }
}

// ============================================================================
// Image types
// ============================================================================

/// Supported image MIME types for uploads
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
    Avif,
    Svg,
}

impl ImageMimeType {
    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            "avif" => Some(Self::Avif),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Get the MIME type string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
            Self::Avif => "image/avif",
            Self::Svg => "image/svg+xml",
        }
    }

    /// Get the typical file extension for this MIME type
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
            Self::Avif => "avif",
            Self::Svg => "svg",
        }
    }
}

impl std::fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
