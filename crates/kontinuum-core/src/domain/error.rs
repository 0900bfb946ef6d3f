//! Domain-level error taxonomy for Kontinuum.

use super::work_package::WorkPackageStatus;
use crate::cas::CasError;

/// Kontinuum domain errors.
#[derive(Debug, thiserror::Error)]
pub enum KontinuumError {
    #[error("invalid work package transition: {from} -> {to}")]
    InvalidTransition {
        from: WorkPackageStatus,
        to: WorkPackageStatus,
    },

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("invalid repository config: {0}")]
    Config(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("commit status error: {0}")]
    Status(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("work package not found: {project}@{commit_hash}")]
    WorkPackageNotFound { project: String, commit_hash: String },

    #[error("content store error: {0}")]
    Cas(#[from] CasError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for KontinuumError {
    fn from(err: reqwest::Error) -> Self {
        KontinuumError::Http(err.to_string())
    }
}

/// Result type for Kontinuum domain operations.
pub type Result<T> = std::result::Result<T, KontinuumError>;
