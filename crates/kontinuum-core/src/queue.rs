//! Work package queue providers.
//!
//! The worker only ever claims the *first* PENDING package in queue order.
//! Claiming is a compare-and-set on the status field performed under the
//! queue's own lock, so a package can never be handed out twice.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use crate::domain::{KontinuumError, Result, WorkPackage, WorkPackageStatus};

/// Ordered collection of work packages shared with a producer.
#[async_trait]
pub trait WorkPackageQueue: Send + Sync {
    /// Mark the first PENDING package PROCESSING and return a copy of it.
    async fn claim_next_pending(&self) -> Result<Option<WorkPackage>>;

    /// Write `work_package` back over the entry for the same request.
    async fn update(&self, work_package: &WorkPackage) -> Result<()>;

    /// Copy of every package in queue order.
    async fn snapshot(&self) -> Result<Vec<WorkPackage>>;
}

fn claim_first(packages: &mut [WorkPackage]) -> Result<Option<WorkPackage>> {
    match packages.iter_mut().find(|wp| wp.is_pending()) {
        Some(wp) => {
            wp.advance_to(WorkPackageStatus::Processing)?;
            Ok(Some(wp.clone()))
        }
        None => Ok(None),
    }
}

/// Only the claimed (PROCESSING) entry accepts writes, so a finished
/// package cannot be overwritten by a stale copy.
fn replace(packages: &mut [WorkPackage], work_package: &WorkPackage) -> Result<()> {
    let slot = packages
        .iter_mut()
        .find(|wp| {
            wp.same_request(work_package)
                && wp.work_package_status == WorkPackageStatus::Processing
        })
        .ok_or_else(|| KontinuumError::WorkPackageNotFound {
            project: work_package.project.clone(),
            commit_hash: work_package.commit_hash.clone(),
        })?;
    if work_package.work_package_status < slot.work_package_status {
        return Err(KontinuumError::InvalidTransition {
            from: slot.work_package_status,
            to: work_package.work_package_status,
        });
    }
    *slot = work_package.clone();
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process queue backed by a `Vec`.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    packages: Mutex<Vec<WorkPackage>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_packages(packages: Vec<WorkPackage>) -> Self {
        Self {
            packages: Mutex::new(packages),
        }
    }

    /// Append a package to the end of the queue.
    pub fn push(&self, work_package: WorkPackage) {
        lock(&self.packages).push(work_package);
    }
}

#[async_trait]
impl WorkPackageQueue for MemoryQueue {
    async fn claim_next_pending(&self) -> Result<Option<WorkPackage>> {
        claim_first(&mut lock(&self.packages))
    }

    async fn update(&self, work_package: &WorkPackage) -> Result<()> {
        replace(&mut lock(&self.packages), work_package)
    }

    async fn snapshot(&self) -> Result<Vec<WorkPackage>> {
        Ok(lock(&self.packages).clone())
    }
}

/// Queue persisted as a JSON array, re-read and rewritten on every mutation
/// so an external producer can append packages between polls.
#[derive(Debug)]
pub struct FileQueue {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<WorkPackage>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, packages: &[WorkPackage]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(serde_json::to_string_pretty(packages)?.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[async_trait]
impl WorkPackageQueue for FileQueue {
    async fn claim_next_pending(&self) -> Result<Option<WorkPackage>> {
        let _guard = lock(&self.guard);
        let mut packages = self.load()?;
        let claimed = claim_first(&mut packages)?;
        if claimed.is_some() {
            self.save(&packages)?;
        }
        Ok(claimed)
    }

    async fn update(&self, work_package: &WorkPackage) -> Result<()> {
        let _guard = lock(&self.guard);
        let mut packages = self.load()?;
        replace(&mut packages, work_package)?;
        self.save(&packages)
    }

    async fn snapshot(&self) -> Result<Vec<WorkPackage>> {
        let _guard = lock(&self.guard);
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_claims_first_pending_in_order() {
        let queue = MemoryQueue::with_packages(vec![
            WorkPackage::new("a/a", "1", 1),
            WorkPackage::new("b/b", "2", 1),
        ]);
        let first = queue.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(first.project, "a/a");
        assert_eq!(first.work_package_status, WorkPackageStatus::Processing);

        let second = queue.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(second.project, "b/b");

        assert!(queue.claim_next_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_writes_back() {
        let queue = MemoryQueue::new();
        queue.push(WorkPackage::new("a/a", "1", 1));
        let mut wp = queue.claim_next_pending().await.unwrap().unwrap();
        wp.commit_message = Some("msg".to_string());
        wp.advance_to(WorkPackageStatus::Finished).unwrap();
        queue.update(&wp).await.unwrap();

        let all = queue.snapshot().await.unwrap();
        assert_eq!(all[0].work_package_status, WorkPackageStatus::Finished);
        assert_eq!(all[0].commit_message.as_deref(), Some("msg"));
    }

    #[tokio::test]
    async fn test_update_rejects_regression() {
        let queue = MemoryQueue::new();
        queue.push(WorkPackage::new("a/a", "1", 1));
        let mut wp = queue.claim_next_pending().await.unwrap().unwrap();
        wp.advance_to(WorkPackageStatus::Finished).unwrap();
        queue.update(&wp).await.unwrap();

        let mut stale = wp.clone();
        stale.work_package_status = WorkPackageStatus::Processing;
        assert!(queue.update(&stale).await.is_err());
    }

    #[tokio::test]
    async fn test_update_unknown_package() {
        let queue = MemoryQueue::new();
        let wp = WorkPackage::new("a/a", "1", 1);
        assert!(matches!(
            queue.update(&wp).await,
            Err(KontinuumError::WorkPackageNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_queue_persists_claims() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let packages = vec![WorkPackage::new("a/a", "1", 1)];
        std::fs::write(&path, serde_json::to_string(&packages).unwrap()).unwrap();

        let queue = FileQueue::new(&path);
        let claimed = queue.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(claimed.project, "a/a");

        let reopened = FileQueue::new(&path);
        let all = reopened.snapshot().await.unwrap();
        assert_eq!(all[0].work_package_status, WorkPackageStatus::Processing);
        assert!(reopened.claim_next_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_queue_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let queue = FileQueue::new(dir.path().join("absent.json"));
        assert!(queue.snapshot().await.unwrap().is_empty());
        assert!(queue.claim_next_pending().await.unwrap().is_none());
    }
}
