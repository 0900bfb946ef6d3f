//! Ordered, short-circuiting stage execution for one work package.

use std::path::Path;
use std::sync::Arc;

use kontinuum_core::{
    emit_package_error, emit_stage_finished, emit_stage_skipped, emit_stage_started,
    ArtifactPublisher, Clock, CommitState, KontinuumError, RepoConfig, StageInfo,
    StatusReporter, WorkPackage, WorkPackageQueue, METRICS,
};
use tracing::{info, warn};

use crate::runner::StageRunner;
use crate::stage::StageRegistry;

/// Context the status of an unreadable repository config is reported on.
pub const CONFIG_CONTEXT: &str = "config";

/// Result of a complete pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Number of stages actually executed.
    pub attempted: usize,

    /// Stages not executed because an earlier one failed.
    pub skipped: Vec<String>,

    /// Whether every attempted stage succeeded.
    pub success: bool,
}

/// Stage pipeline orchestrator.
pub struct StagePipeline {
    runner: StageRunner,
    registry: Arc<StageRegistry>,
    clock: Arc<dyn Clock>,
    progress: Option<Arc<dyn WorkPackageQueue>>,
}

impl StagePipeline {
    pub fn new(runner: StageRunner, registry: Arc<StageRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            runner,
            registry,
            clock,
            progress: None,
        }
    }

    /// Write the package back to `queue` whenever a stage record changes.
    pub fn with_progress(mut self, queue: Arc<dyn WorkPackageQueue>) -> Self {
        self.progress = Some(queue);
        self
    }

    /// Load `.ci/kontinuum.json` from `work_tree` and run its stages.
    ///
    /// A missing config runs nothing and succeeds. An unreadable config is
    /// reported as an error on the `config` context and runs nothing.
    pub async fn run_configured(
        &self,
        work_package: &mut WorkPackage,
        work_tree: &Path,
    ) -> PipelineOutcome {
        match RepoConfig::load(work_tree) {
            Ok(Some(config)) => self.run(work_package, work_tree, &config.stages).await,
            Ok(None) => {
                info!("kontinuum config for repo not found");
                PipelineOutcome {
                    success: true,
                    ..PipelineOutcome::default()
                }
            }
            Err(err) => {
                warn!(error = %err, "unreadable repository config");
                if let Err(report_err) = report_config_error(
                    work_package,
                    &err,
                    self.runner.reporter(),
                    self.runner.publisher(),
                )
                .await
                {
                    emit_package_error(&work_package.project, &report_err);
                }
                PipelineOutcome::default()
            }
        }
    }

    /// Run `stages` in order. After the first failure every remaining stage
    /// is skipped without a record.
    pub async fn run(
        &self,
        work_package: &mut WorkPackage,
        work_tree: &Path,
        stages: &[String],
    ) -> PipelineOutcome {
        let mut outcome = PipelineOutcome {
            success: true,
            ..PipelineOutcome::default()
        };

        for name in stages {
            if !outcome.success {
                emit_stage_skipped(name);
                outcome.skipped.push(name.clone());
                continue;
            }

            emit_stage_started(name);
            work_package
                .stage_info_list
                .push(StageInfo::start(name.as_str(), self.clock.epoch_seconds()));
            self.save_progress(work_package).await;

            let stage = self.registry.resolve(name);
            let snapshot = work_package.clone();
            let Some(stage_info) = work_package.stage_info_list.last_mut() else {
                continue;
            };

            let verdict = match self
                .runner
                .run_in(stage_info, &snapshot, work_tree, stage.as_ref())
                .await
            {
                Ok(verdict) => verdict,
                Err(err) => {
                    emit_package_error(&snapshot.project, &err);
                    stage_info.resolve(CommitState::Error);
                    CommitState::Error
                }
            };
            stage_info.finish(self.clock.epoch_seconds());

            let passed = stage_info.is_success();
            METRICS.record_stage(passed);
            emit_stage_finished(
                name,
                verdict.as_str(),
                stage_info.duration_seconds().unwrap_or_default(),
                &stage_info.info,
            );
            outcome.attempted += 1;
            if !passed {
                outcome.success = false;
            }
            self.save_progress(work_package).await;
        }

        outcome
    }

    async fn save_progress(&self, work_package: &WorkPackage) {
        if let Some(queue) = &self.progress {
            if let Err(err) = queue.update(work_package).await {
                warn!(error = %err, "failed to save stage progress");
            }
        }
    }
}

async fn report_config_error(
    work_package: &WorkPackage,
    err: &KontinuumError,
    reporter: &StatusReporter,
    publisher: &ArtifactPublisher,
) -> kontinuum_core::Result<()> {
    let url = publisher.publish_text(&err.to_string()).await?;
    reporter
        .report(
            work_package,
            &url,
            CommitState::Error,
            &err.to_string(),
            CONFIG_CONTEXT,
        )
        .await
}
