//! Stage definitions, command execution and the stage registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kontinuum_core::{CommitState, WorkPackage};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

/// Environment variable carrying the stage output directory.
pub const OUT_DIR_ENV: &str = "KONTINUUM_OUT_DIR";

/// Placeholder in stage commands replaced by the output directory.
pub const OUT_DIR_PLACEHOLDER: &str = "{out}";

/// Log file every command stage writes into its output directory.
pub const LOG_FILE: &str = "log.txt";

/// Everything a stage may look at while it runs.
pub struct StageContext<'a> {
    pub work_package: &'a WorkPackage,

    /// Checked-out work tree of the project.
    pub work_tree: &'a Path,

    /// Private output directory; everything written here is published.
    pub out_dir: &'a Path,
}

/// One named step of the pipeline.
///
/// A stage may only write below `ctx.out_dir` for things it wants
/// published and must return a final commit verdict.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn run(&self, ctx: &StageContext<'_>) -> anyhow::Result<CommitState>;
}

/// Builtin Gradle stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinStage {
    /// ./gradlew clean
    Clean,

    /// ./gradlew build
    Build,

    /// ./gradlew test
    Test,

    /// ./gradlew lint
    Lint,

    /// ./gradlew spoon
    Spoon,
}

impl BuiltinStage {
    pub const ALL: [BuiltinStage; 5] = [
        BuiltinStage::Clean,
        BuiltinStage::Build,
        BuiltinStage::Test,
        BuiltinStage::Lint,
        BuiltinStage::Spoon,
    ];

    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinStage::Clean => "clean",
            BuiltinStage::Build => "build",
            BuiltinStage::Test => "test",
            BuiltinStage::Lint => "lint",
            BuiltinStage::Spoon => "spoon",
        }
    }

    /// Get the stage's command.
    pub fn command(&self) -> Vec<String> {
        vec!["./gradlew".to_string(), self.name().to_string()]
    }

    /// Work tree paths copied into the output directory after the command.
    pub fn artifacts(&self) -> Vec<String> {
        match self {
            BuiltinStage::Build => vec!["app/build/outputs/apk".to_string()],
            BuiltinStage::Lint => vec!["app/build/reports/lint-results.html".to_string()],
            BuiltinStage::Spoon => vec!["app/build/spoon".to_string()],
            _ => Vec::new(),
        }
    }
}

/// Configuration for a command stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageConfig {
    /// Stage name as referenced from `.ci/kontinuum.json`.
    pub name: String,

    /// Command to execute (first element is executable). `{out}` is
    /// replaced by the output directory.
    pub command: Vec<String>,

    /// Work tree relative paths copied into the output directory.
    #[serde(default)]
    pub artifacts: Vec<String>,

    /// Timeout in seconds, 0 for none.
    #[serde(default)]
    pub timeout_secs: u64,
}

impl StageConfig {
    /// Create a new stage configuration from a builtin stage.
    pub fn from_builtin(stage: BuiltinStage, timeout_secs: u64) -> Self {
        Self {
            name: stage.name().to_string(),
            command: stage.command(),
            artifacts: stage.artifacts(),
            timeout_secs,
        }
    }

    /// Create a custom stage configuration.
    pub fn custom(name: impl Into<String>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            command,
            artifacts: Vec::new(),
            timeout_secs,
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct StageResult {
    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

impl StageResult {
    /// Whether the command passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs an external command inside the work tree.
#[derive(Debug, Clone)]
pub struct CommandStage {
    config: StageConfig,
}

impl CommandStage {
    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Execute the command with `out_dir` substituted and exported.
    pub async fn execute(&self, work_tree: &Path, out_dir: &Path) -> anyhow::Result<StageResult> {
        let start = Instant::now();

        if self.config.command.is_empty() {
            anyhow::bail!("Stage {} has empty command", self.config.name);
        }

        let out = out_dir.to_string_lossy();
        let argv: Vec<String> = self
            .config
            .command
            .iter()
            .map(|arg| arg.replace(OUT_DIR_PLACEHOLDER, &out))
            .collect();

        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(work_tree)
            .env(OUT_DIR_ENV, out_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("Stage {} failed to spawn {}: {}", self.config.name, argv[0], e))?;

        let output = if self.config.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Stage {} timed out after {} seconds",
                    self.config.name,
                    self.config.timeout_secs
                )
            })??
        } else {
            child.wait_with_output().await?
        };

        Ok(StageResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Stage for CommandStage {
    async fn run(&self, ctx: &StageContext<'_>) -> anyhow::Result<CommitState> {
        let result = self.execute(ctx.work_tree, ctx.out_dir).await?;
        debug!(
            stage = %self.config.name,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "command finished"
        );

        let log = format!(
            "$ {}\n\n{}{}\nexit code {}\n",
            self.config.command.join(" "),
            result.stdout,
            result.stderr,
            result.exit_code
        );
        tokio::fs::write(ctx.out_dir.join(LOG_FILE), log).await?;

        for artifact in &self.config.artifacts {
            let source = ctx.work_tree.join(artifact);
            if source.exists() {
                copy_into(&source, ctx.out_dir)?;
            } else {
                debug!(stage = %self.config.name, artifact = %artifact, "artifact missing");
            }
        }

        Ok(if result.passed() {
            CommitState::Success
        } else {
            CommitState::Error
        })
    }
}

/// Copy a file or directory tree into `dest_dir`, keeping its file name.
fn copy_into(source: &Path, dest_dir: &Path) -> std::io::Result<()> {
    let name = source.file_name().map(PathBuf::from).unwrap_or_default();
    let target = dest_dir.join(name);
    if source.is_dir() {
        std::fs::create_dir_all(&target)?;
        for entry in std::fs::read_dir(source)? {
            copy_into(&entry?.path(), &target)?;
        }
    } else {
        std::fs::copy(source, &target)?;
    }
    Ok(())
}

/// Fallback for names no stage is registered under: always an error
/// verdict, with the reason left in the output directory.
pub struct UnknownStage {
    name: String,
}

impl UnknownStage {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for UnknownStage {
    async fn run(&self, ctx: &StageContext<'_>) -> anyhow::Result<CommitState> {
        tokio::fs::write(
            ctx.out_dir.join(LOG_FILE),
            format!("unknown stage: {}\n", self.name),
        )
        .await?;
        Ok(CommitState::Error)
    }
}

/// Stage implementations by name.
#[derive(Default, Clone)]
pub struct StageRegistry {
    stages: HashMap<String, Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every [`BuiltinStage`].
    pub fn with_builtins(timeout_secs: u64) -> Self {
        let mut registry = Self::new();
        for builtin in BuiltinStage::ALL {
            registry.register_command(StageConfig::from_builtin(builtin, timeout_secs));
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, stage: Arc<dyn Stage>) {
        self.stages.insert(name.into(), stage);
    }

    /// Register a command stage under its configured name, replacing any
    /// previous stage of that name.
    pub fn register_command(&mut self, config: StageConfig) {
        let name = config.name.clone();
        self.register(name, Arc::new(CommandStage::new(config)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    /// The stage registered as `name`, or an [`UnknownStage`].
    pub fn resolve(&self, name: &str) -> Arc<dyn Stage> {
        self.stages
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::new(UnknownStage::new(name)))
    }
}
