//! Commit status tuples sent to the status sink.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Three-valued commit verdict, as understood by the status sink.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Error,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Error => "error",
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single status annotation for a commit.
///
/// `context` is already namespaced (`kontinuum/build`) by the time a
/// status reaches a sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitStatus {
    pub state: CommitState,
    pub target_url: String,
    pub description: String,
    pub context: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_status_wire_shape() {
        let status = CommitStatus {
            state: CommitState::Success,
            target_url: "cas://abc".to_string(),
            description: "result".to_string(),
            context: "kontinuum/build".to_string(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "success");
        assert_eq!(json["target_url"], "cas://abc");
        assert_eq!(json["context"], "kontinuum/build");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CommitState::Pending.to_string(), "pending");
        assert_eq!(CommitState::Error.to_string(), "error");
    }
}
