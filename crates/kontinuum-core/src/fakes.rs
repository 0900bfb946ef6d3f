//! In-memory fakes for collaborator traits (testing only)
//!
//! Provides `MemoryContentStore`, `FailingContentStore`,
//! `RecordingStatusSink` and `FailingStatusSink` that satisfy the trait contracts without any
//! network or disk-backed services.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cas::fs::collect_files;
use crate::cas::{AddedEntry, CasError, ContentHash, ContentStore};
use crate::domain::{CommitState, CommitStatus, KontinuumError, Result};
use crate::status::CommitStatusSink;

// ---------------------------------------------------------------------------
// MemoryContentStore
// ---------------------------------------------------------------------------

/// In-memory content store backed by a `HashMap<hash, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&self, data: &[u8]) -> ContentHash {
        let hash = ContentHash::compute(data);
        self.blobs
            .lock()
            .unwrap()
            .insert(hash.as_str().to_string(), data.to_vec());
        hash
    }

    /// Bytes stored under `hash`.
    pub fn get(&self, hash: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(hash).cloned()
    }

    /// Resolve a `<scheme>://<hash>` URL to the stored text.
    pub fn resolve_url(&self, url: &str) -> Option<String> {
        let (_, hash) = url.split_once("://")?;
        self.get(hash)
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn add_string(&self, text: &str) -> std::result::Result<ContentHash, CasError> {
        Ok(self.put(text.as_bytes()))
    }

    async fn add_directory(&self, dir: &Path) -> std::result::Result<Vec<AddedEntry>, CasError> {
        collect_files(dir)?
            .into_iter()
            .map(|(name, path)| {
                let data = std::fs::read(&path)?;
                Ok(AddedEntry {
                    name,
                    hash: self.put(&data),
                })
            })
            .collect()
    }
}

/// Content store whose every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingContentStore;

#[async_trait]
impl ContentStore for FailingContentStore {
    async fn add_string(&self, _text: &str) -> std::result::Result<ContentHash, CasError> {
        Err(store_unavailable())
    }

    async fn add_directory(&self, _dir: &Path) -> std::result::Result<Vec<AddedEntry>, CasError> {
        Err(store_unavailable())
    }
}

fn store_unavailable() -> CasError {
    CasError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "store unavailable",
    ))
}

// ---------------------------------------------------------------------------
// RecordingStatusSink
// ---------------------------------------------------------------------------

/// One captured `set_status` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatus {
    pub project: String,
    pub commit_hash: String,
    pub status: CommitStatus,
    pub installation_id: u64,
}

/// Status sink that records every call in order.
#[derive(Debug, Default)]
pub struct RecordingStatusSink {
    calls: Mutex<Vec<RecordedStatus>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RecordedStatus> {
        self.calls.lock().unwrap().clone()
    }

    /// Statuses reported for a namespaced context, in call order.
    pub fn for_context(&self, context: &str) -> Vec<CommitStatus> {
        self.calls()
            .into_iter()
            .filter(|c| c.status.context == context)
            .map(|c| c.status)
            .collect()
    }

    /// Number of reports with `state` on `context`.
    pub fn count(&self, context: &str, state: CommitState) -> usize {
        self.for_context(context)
            .iter()
            .filter(|s| s.state == state)
            .count()
    }
}

#[async_trait]
impl CommitStatusSink for RecordingStatusSink {
    async fn set_status(
        &self,
        project: &str,
        commit_hash: &str,
        status: &CommitStatus,
        installation_id: u64,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(RecordedStatus {
            project: project.to_string(),
            commit_hash: commit_hash.to_string(),
            status: status.clone(),
            installation_id,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FailingStatusSink
// ---------------------------------------------------------------------------

/// Status sink whose every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingStatusSink;

#[async_trait]
impl CommitStatusSink for FailingStatusSink {
    async fn set_status(
        &self,
        _project: &str,
        _commit_hash: &str,
        _status: &CommitStatus,
        _installation_id: u64,
    ) -> Result<()> {
        Err(KontinuumError::Status("sink unavailable".to_string()))
    }
}
