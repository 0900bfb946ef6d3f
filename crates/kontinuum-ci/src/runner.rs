//! Uniform status reporting and artifact publishing around one stage.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use kontinuum_core::{
    ArtifactPublisher, CommitState, KontinuumError, Result, StageInfo, StatusReporter,
    WorkPackage,
};
use tracing::{info, warn};

use crate::stage::{Stage, StageContext};

/// File a stage's error is written to when the stage itself fails to run.
pub const ERROR_FILE: &str = "error.txt";

/// Description attached to every final stage status.
pub const RESULT_DESCRIPTION: &str = "result";

/// Executes stages inside `<out_root>/<project>/<commit>/<stage>`.
#[derive(Clone)]
pub struct StageRunner {
    reporter: StatusReporter,
    publisher: Arc<ArtifactPublisher>,
    out_root: PathBuf,
    home_url: String,
}

impl StageRunner {
    pub fn new(
        reporter: StatusReporter,
        publisher: Arc<ArtifactPublisher>,
        out_root: impl Into<PathBuf>,
        home_url: impl Into<String>,
    ) -> Self {
        Self {
            reporter,
            publisher,
            out_root: out_root.into(),
            home_url: home_url.into(),
        }
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    pub fn publisher(&self) -> &ArtifactPublisher {
        &self.publisher
    }

    /// Output directory of `stage` for this package. Fails when a segment
    /// would leave `<out_root>/<project>/<commit>/<stage>`.
    pub fn out_dir_for(&self, work_package: &WorkPackage, stage: &str) -> Result<PathBuf> {
        contained_path(
            &self.out_root,
            &[&work_package.project, &work_package.commit_hash, stage],
        )
    }

    /// Run `stage` for `stage_info`:
    ///
    /// 1. report a pending status on the stage's context
    /// 2. create a fresh output directory
    /// 3. run the stage, turning a stage `Err` into an error verdict
    /// 4. publish the output directory and record the URL
    /// 5. report the final verdict with description `result`
    ///
    /// Errors from the status sink or the content store are returned; the
    /// stage verdict is applied to `stage_info` before publishing so it is
    /// never lost.
    pub async fn run_in(
        &self,
        stage_info: &mut StageInfo,
        work_package: &WorkPackage,
        work_tree: &Path,
        stage: &dyn Stage,
    ) -> Result<CommitState> {
        let name = stage_info.stage.clone();
        info!(stage = %name, "entering stage");

        let out_dir = match self.out_dir_for(work_package, &name) {
            Ok(out_dir) => out_dir,
            Err(err) => {
                warn!(stage = %name, error = %err, "refusing to run stage");
                stage_info.resolve(CommitState::Error);
                self.reporter
                    .report(
                        work_package,
                        &self.home_url,
                        CommitState::Error,
                        &err.to_string(),
                        &name,
                    )
                    .await?;
                return Ok(CommitState::Error);
            }
        };

        self.reporter
            .report(
                work_package,
                &self.home_url,
                CommitState::Pending,
                &format!("{name} in progress"),
                &name,
            )
            .await?;

        if out_dir.exists() {
            tokio::fs::remove_dir_all(&out_dir).await?;
        }
        tokio::fs::create_dir_all(&out_dir).await?;

        let ctx = StageContext {
            work_package,
            work_tree,
            out_dir: &out_dir,
        };
        let verdict = match stage.run(&ctx).await {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(stage = %name, error = %err, "stage failed to run");
                tokio::fs::write(out_dir.join(ERROR_FILE), format!("{err:?}\n")).await?;
                CommitState::Error
            }
        };
        stage_info.resolve(verdict);

        info!(stage = %name, verdict = %verdict, "finished stage");
        let url = self.publisher.publish(&name, &out_dir).await?;
        stage_info.info = url.clone();

        self.reporter
            .report(work_package, &url, verdict, RESULT_DESCRIPTION, &name)
            .await?;

        Ok(verdict)
    }
}

/// Join `segments` onto `root`, accepting only plain relative names so the
/// result always stays below `root`.
pub fn contained_path(root: &Path, segments: &[&str]) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in segments {
        let relative = Path::new(segment);
        let plain = !segment.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(KontinuumError::Config(format!(
                "path segment {segment:?} leaves {}",
                root.display()
            )));
        }
        path.push(relative);
    }
    if !path.starts_with(root) {
        return Err(KontinuumError::Config(format!(
            "{} is outside {}",
            path.display(),
            root.display()
        )));
    }
    Ok(path)
}
