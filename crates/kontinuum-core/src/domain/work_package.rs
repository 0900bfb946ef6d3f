//! Work packages: one queued request to build a commit of a project.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{KontinuumError, Result};
use super::stage_info::StageInfo;

/// Lifecycle status of a [`WorkPackage`].
///
/// Transitions are monotonic: PENDING -> PROCESSING -> FINISHED.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkPackageStatus {
    Pending,
    Processing,
    Finished,
}

impl WorkPackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkPackageStatus::Pending => "PENDING",
            WorkPackageStatus::Processing => "PROCESSING",
            WorkPackageStatus::Finished => "FINISHED",
        }
    }

    /// Whether `next` is the single legal successor of `self`.
    pub fn can_advance_to(&self, next: WorkPackageStatus) -> bool {
        matches!(
            (self, next),
            (WorkPackageStatus::Pending, WorkPackageStatus::Processing)
                | (WorkPackageStatus::Processing, WorkPackageStatus::Finished)
        )
    }
}

impl fmt::Display for WorkPackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single build request for `project` at `commit_hash`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkPackage {
    /// Repository in `owner/repo` form.
    pub project: String,

    /// Commit to check out and build.
    pub commit_hash: String,

    /// Installation the access token is scoped to.
    pub installation_id: u64,

    pub work_package_status: WorkPackageStatus,

    /// Full message of the checked-out commit, filled after checkout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,

    /// One record per attempted stage, in execution order.
    #[serde(default)]
    pub stage_info_list: Vec<StageInfo>,
}

impl WorkPackage {
    /// Create a PENDING work package.
    pub fn new(
        project: impl Into<String>,
        commit_hash: impl Into<String>,
        installation_id: u64,
    ) -> Self {
        Self {
            project: project.into(),
            commit_hash: commit_hash.into(),
            installation_id,
            work_package_status: WorkPackageStatus::Pending,
            commit_message: None,
            stage_info_list: Vec::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.work_package_status == WorkPackageStatus::Pending
    }

    /// Whether `other` refers to the same build request.
    pub fn same_request(&self, other: &WorkPackage) -> bool {
        self.project == other.project && self.commit_hash == other.commit_hash
    }

    /// Move to `next`, rejecting anything but the next lifecycle step.
    pub fn advance_to(&mut self, next: WorkPackageStatus) -> Result<()> {
        if !self.work_package_status.can_advance_to(next) {
            return Err(KontinuumError::InvalidTransition {
                from: self.work_package_status,
                to: next,
            });
        }
        self.work_package_status = next;
        Ok(())
    }

    /// Short `project@sha` label for logs.
    pub fn label(&self) -> String {
        let short = &self.commit_hash[..7.min(self.commit_hash.len())];
        format!("{}@{}", self.project, short)
    }
}
