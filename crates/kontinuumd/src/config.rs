//! Daemon configuration file (TOML).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kontinuum_ci::StageConfig;
use kontinuum_core::{DEFAULT_CLONE_URL_TEMPLATE, DEFAULT_PRODUCT};
use serde::{Deserialize, Serialize};

/// Top-level daemon configuration. Every field has a default, so an empty
/// file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DaemonConfig {
    /// JSON file holding the work package queue.
    pub queue_file: PathBuf,

    /// Root of the per-project work trees.
    pub workspace_dir: PathBuf,

    /// Root of the per-stage output directories.
    pub out_dir: PathBuf,

    /// Object directory of the content store.
    pub cas_dir: PathBuf,

    /// Scheme of published artifact URLs.
    pub url_scheme: String,

    /// Prefix of every status context.
    pub product: String,

    /// Target URL of statuses without an artifact.
    pub home_url: String,

    pub poll_interval_secs: u64,

    /// Timeout of builtin stages, 0 for none.
    pub stage_timeout_secs: u64,

    pub clone_url_template: String,

    /// Run in the work tree after every successful checkout.
    pub clean_command: Option<Vec<String>>,

    pub github: GithubSection,

    /// Additional or overriding command stages.
    pub stages: Vec<StageConfig>,

    pub artifacts: ArtifactSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GithubSection {
    pub api_url: String,

    /// Access token; `KONTINUUM_GITHUB_TOKEN` is used when unset.
    pub token: Option<String>,
}

/// Primary artifact patterns by stage name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArtifactSection {
    pub primary: BTreeMap<String, String>,
    pub fallback: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            queue_file: PathBuf::from("work_packages.json"),
            workspace_dir: PathBuf::from("work"),
            out_dir: PathBuf::from("out"),
            cas_dir: PathBuf::from("cas"),
            url_scheme: "cas".to_string(),
            product: DEFAULT_PRODUCT.to_string(),
            home_url: "https://github.com/ligi/kontinuum".to_string(),
            poll_interval_secs: 1,
            stage_timeout_secs: 3600,
            clone_url_template: DEFAULT_CLONE_URL_TEMPLATE.to_string(),
            clean_command: Some(vec!["./gradlew".to_string(), "clean".to_string()]),
            github: GithubSection::default(),
            stages: Vec::new(),
            artifacts: ArtifactSection::default(),
        }
    }
}

impl Default for GithubSection {
    fn default() -> Self {
        Self {
            api_url: kontinuum_core::github::DEFAULT_API_URL.to_string(),
            token: None,
        }
    }
}

impl DaemonConfig {
    /// Load `path`, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
