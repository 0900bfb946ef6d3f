//! Repository-local build configuration (`.ci/kontinuum.json`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{KontinuumError, Result};

/// Location of the config file relative to the work tree root.
pub const REPO_CONFIG_PATH: &str = ".ci/kontinuum.json";

/// Declared stages, in execution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoConfig {
    #[serde(default)]
    pub stages: Vec<String>,
}

impl RepoConfig {
    /// Load the config from `work_tree`. `Ok(None)` when the file is absent.
    pub fn load(work_tree: &Path) -> Result<Option<RepoConfig>> {
        let path = work_tree.join(REPO_CONFIG_PATH);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        let config = serde_json::from_str(&raw).map_err(|e| {
            KontinuumError::Config(format!("{}: {}", REPO_CONFIG_PATH, e))
        })?;
        Ok(Some(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) {
        std::fs::create_dir_all(dir.join(".ci")).unwrap();
        std::fs::write(dir.join(REPO_CONFIG_PATH), body).unwrap();
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RepoConfig::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_stage_order_preserved() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), r#"{"stages": ["build", "test", "spoon"]}"#);
        let config = RepoConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(config.stages, vec!["build", "test", "spoon"]);
    }

    #[test]
    fn test_missing_stages_key_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "{}");
        let config = RepoConfig::load(dir.path()).unwrap().unwrap();
        assert!(config.stages.is_empty());
    }

    #[test]
    fn test_malformed_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "{ stages: nope");
        let err = RepoConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, KontinuumError::Config(_)));
        assert!(err.to_string().contains(REPO_CONFIG_PATH));
    }
}
