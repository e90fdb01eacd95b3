use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigStoreError {
    #[error("Config directory unavailable")]
    #[diagnostic(
        code(cogbot_config::directory_unavailable),
        help("Check that {} exists or can be created, and is writable", path.display())
    )]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("Bucket file I/O failed")]
    #[diagnostic(
        code(cogbot_config::bucket_io),
        help("Failed to {operation} {}", path.display())
    )]
    BucketIo {
        path: PathBuf,
        operation: &'static str,
        #[source]
        cause: std::io::Error,
    },

    #[error("Bucket file is not a valid config document")]
    #[diagnostic(
        code(cogbot_config::bucket_parse),
        help("{} must contain a single JSON object", path.display())
    )]
    BucketParse {
        path: PathBuf,
        #[source]
        cause: serde_json::Error,
    },

    #[error("Value for '{key}' is not serializable")]
    #[diagnostic(
        code(cogbot_config::not_serializable),
        help("Config values must be representable as JSON")
    )]
    NotSerializable {
        key: String,
        #[source]
        cause: serde_json::Error,
    },

    #[error("Invalid scope '{input}'")]
    #[diagnostic(
        code(cogbot_config::invalid_scope),
        help("Expected 'global', 'guild:<id>' or 'user:<id>'")
    )]
    InvalidScope { input: String },

    #[error("Invalid store option '{field}'")]
    #[diagnostic(
        code(cogbot_config::invalid_options),
        help("'{field}' {reason}")
    )]
    InvalidOptions {
        field: &'static str,
        reason: &'static str,
    },

    #[error("Background task failed")]
    #[diagnostic(code(cogbot_config::task_failed))]
    TaskFailed {
        task: &'static str,
        #[source]
        cause: tokio::task::JoinError,
    },
}

pub type Result<T> = std::result::Result<T, ConfigStoreError>;

impl ConfigStoreError {
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, cause: std::io::Error) -> Self {
        Self::BucketIo {
            path: path.into(),
            operation,
            cause,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, cause: serde_json::Error) -> Self {
        Self::BucketParse {
            path: path.into(),
            cause,
        }
    }

    /// True when the error came from decoding a file rather than reaching it
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::BucketParse { .. })
    }
}
