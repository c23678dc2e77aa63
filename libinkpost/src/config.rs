//! Configuration management for Inkpost

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::credentials::CredentialConfig;
use crate::error::{ConfigError, Result};

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub github: GitHubConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
}

/// Repository the site is built from and the GitHub App allowed to write to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub app_id: String,
    /// Looked up from the repository when absent
    #[serde(default)]
    pub installation_id: Option<u64>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

/// Where posts and their images live inside the site repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_posts_dir")]
    pub posts_dir: String,
    #[serde(default = "default_images_dir")]
    pub images_dir: String,
    #[serde(default = "default_image_url_prefix")]
    pub image_url_prefix: String,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_posts_dir() -> String {
    "src/content/blog".to_string()
}

fn default_images_dir() -> String {
    "public/images/blog".to_string()
}

fn default_image_url_prefix() -> String {
    "/images/blog".to_string()
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            posts_dir: default_posts_dir(),
            images_dir: default_images_dir(),
            image_url_prefix: default_image_url_prefix(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let mut config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.credentials.load_master_password_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            github: GitHubConfig {
                owner: String::new(),
                repo: String::new(),
                branch: default_branch(),
                app_id: String::new(),
                installation_id: None,
                api_base_url: default_api_base_url(),
            },
            content: ContentConfig::default(),
            credentials: CredentialConfig::default(),
        }
    }

    /// Check that the fields needed to reach the repository are present
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("github.owner", &self.github.owner),
            ("github.repo", &self.github.repo),
            ("github.app_id", &self.github.app_id),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(name.to_string()).into());
            }
        }
        self.credentials.validate()?;
        Ok(())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("INKPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("inkpost").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StorageBackend;
    use serial_test::serial;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    #[serial]
    fn test_load_minimal_config_applies_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[github]
owner = "author"
repo = "blog"
app_id = "123456"
"#,
        );

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.github.branch, "main");
        assert_eq!(config.github.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.github.installation_id, None);
        assert_eq!(config.content.posts_dir, "src/content/blog");
        assert_eq!(config.content.images_dir, "public/images/blog");
        assert_eq!(config.credentials.storage, StorageBackend::File);
    }

    #[test]
    #[serial]
    fn test_load_full_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[github]
owner = "author"
repo = "blog"
branch = "publish"
app_id = "42"
installation_id = 7
api_base_url = "http://localhost:9000"

[content]
posts_dir = "content/posts"
images_dir = "static/img"
image_url_prefix = "/img"

[credentials]
storage = "encrypted"
path = "/tmp/inkpost-test"
"#,
        );

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.github.branch, "publish");
        assert_eq!(config.github.installation_id, Some(7));
        assert_eq!(config.content.posts_dir, "content/posts");
        assert_eq!(config.content.image_url_prefix, "/img");
        assert_eq!(config.credentials.storage, StorageBackend::Encrypted);
    }

    #[test]
    #[serial]
    fn test_missing_owner_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[github]
owner = ""
repo = "blog"
app_id = "1"
"#,
        );

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("github.owner"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load_from_path(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[github\nowner =");
        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_respects_env() {
        std::env::set_var("INKPOST_CONFIG", "/tmp/inkpost/custom.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("INKPOST_CONFIG");
        assert_eq!(path, PathBuf::from("/tmp/inkpost/custom.toml"));
    }
}
