//! Error types for Inkpost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, InkpostError>;

#[derive(Error, Debug)]
pub enum InkpostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential storage error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl InkpostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            InkpostError::InvalidInput(_) => 3,
            InkpostError::Publish(PublishError::Validation { .. }) => 3,
            InkpostError::Publish(PublishError::MissingSlug) => 3,
            InkpostError::Auth(AuthError::InvalidCredential(_)) => 2,
            InkpostError::Auth(AuthError::NotAuthenticated) => 2,
            InkpostError::Publish(PublishError::Auth(AuthError::InvalidCredential(_))) => 2,
            InkpostError::Publish(PublishError::Auth(AuthError::NotAuthenticated)) => 2,
            InkpostError::Auth(_) => 1,
            InkpostError::Publish(_) => 1,
            InkpostError::Config(_) => 1,
            InkpostError::Credential(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption failed (wrong master password?)")]
    DecryptionFailed,

    #[error("Master password not set")]
    MasterPasswordNotSet,

    #[error("Master password must be at least 8 characters")]
    WeakPassword,

    #[error("OS keyring error: {0}")]
    Keyring(String),

    #[error("Failed to watch credential storage: {0}")]
    Watch(String),
}

/// Failures of token issuance.
///
/// `Clone` so that outcomes can carry the error after it has been reported.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("No credential stored. Import a private key first.")]
    NotAuthenticated,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Missing required field: {field}")]
    Validation { field: String },

    #[error("Missing slug, nothing to delete")]
    MissingSlug,

    #[error("Remote API rejected the request: {0}")]
    Remote(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Local I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    Auth(#[from] AuthError),
}
