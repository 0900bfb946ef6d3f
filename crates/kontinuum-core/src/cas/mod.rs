pub mod fs;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// SHA-256 content hash (lowercase hex) used as a content address.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    /// Compute the hash of `data`.
    pub fn compute(data: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(data)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render as an externally resolvable URL: `<scheme>://<hash>`.
    pub fn url(&self, scheme: &str) -> String {
        format!("{}://{}", scheme, self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.0[..12.min(self.0.len())])
    }
}

impl FromStr for ContentHash {
    type Err = CasError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CasError::InvalidHash(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

/// One published item: a file's path relative to the published directory
/// and the hash it was stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedEntry {
    pub name: String,
    pub hash: ContentHash,
}

/// Errors from content store operations.
#[derive(Debug, Error)]
pub enum CasError {
    #[error("blob not found: {0}")]
    NotFound(ContentHash),

    #[error("invalid content hash: {0}")]
    InvalidHash(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CasError>;

/// Content-addressable store that stage outputs and diagnostics are
/// published to.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `text` and return its hash.
    async fn add_string(&self, text: &str) -> Result<ContentHash>;

    /// Store every file below `dir`, returning one entry per file.
    async fn add_directory(&self, dir: &Path) -> Result<Vec<AddedEntry>>;
}
