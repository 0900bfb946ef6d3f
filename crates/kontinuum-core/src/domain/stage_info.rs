//! Per-stage execution records.

use serde::{Deserialize, Serialize};

use super::commit_status::CommitState;

/// Outcome of a single stage as recorded on its work package.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Pending,
    Success,
    Error,
}

/// Execution record for one attempted stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageInfo {
    /// Stage name as declared in the repository config.
    pub stage: String,

    pub status: StageStatus,

    /// Artifact URL, empty until the stage output is published.
    #[serde(default)]
    pub info: String,

    pub start_epoch_seconds: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_epoch_seconds: Option<i64>,
}

impl StageInfo {
    /// Begin a PENDING record at `now` (epoch seconds).
    pub fn start(stage: impl Into<String>, now: i64) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Pending,
            info: String::new(),
            start_epoch_seconds: now,
            end_epoch_seconds: None,
        }
    }

    /// Apply the stage verdict. Only the first non-pending verdict sticks.
    pub fn resolve(&mut self, verdict: CommitState) {
        if self.status != StageStatus::Pending {
            return;
        }
        self.status = match verdict {
            CommitState::Success => StageStatus::Success,
            CommitState::Error => StageStatus::Error,
            CommitState::Pending => StageStatus::Pending,
        };
    }

    /// Stamp the end time. Clock skew never yields `end < start`.
    pub fn finish(&mut self, now: i64) {
        self.end_epoch_seconds = Some(now.max(self.start_epoch_seconds));
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.end_epoch_seconds
            .map(|end| end - self.start_epoch_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_is_pending() {
        let info = StageInfo::start("build", 100);
        assert_eq!(info.status, StageStatus::Pending);
        assert_eq!(info.start_epoch_seconds, 100);
        assert!(info.end_epoch_seconds.is_none());
        assert!(info.info.is_empty());
    }

    #[test]
    fn test_resolve_once() {
        let mut info = StageInfo::start("build", 100);
        info.resolve(CommitState::Error);
        info.resolve(CommitState::Success);
        assert_eq!(info.status, StageStatus::Error);
    }

    #[test]
    fn test_pending_verdict_stays_pending() {
        let mut info = StageInfo::start("build", 100);
        info.resolve(CommitState::Pending);
        assert_eq!(info.status, StageStatus::Pending);
        assert!(!info.is_success());
    }

    #[test]
    fn test_finish_clamps_to_start() {
        let mut info = StageInfo::start("build", 100);
        info.finish(90);
        assert_eq!(info.end_epoch_seconds, Some(100));
        assert_eq!(info.duration_seconds(), Some(0));
    }

    #[test]
    fn test_duration() {
        let mut info = StageInfo::start("test", 100);
        assert_eq!(info.duration_seconds(), None);
        info.finish(142);
        assert_eq!(info.duration_seconds(), Some(42));
    }
}
