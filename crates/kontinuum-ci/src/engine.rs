//! Work package lifecycle engine.
//!
//! One worker, one package at a time: claim the first PENDING package,
//! synchronize its repository, run its configured stages and mark it
//! FINISHED. Collaborator failures are logged and never stop the loop.

use std::sync::Arc;
use std::time::Duration;

use kontinuum_core::{
    emit_package_claimed, emit_package_error, emit_package_finished, package_span, CommitState,
    StatusReporter, WorkPackage, WorkPackageQueue, WorkPackageStatus, CHECKOUT_CONTEXT, METRICS,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::pipeline::StagePipeline;
use crate::sync::RepositorySynchronizer;

/// Settings for [`LifecycleEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pause between two queue polls.
    pub poll_interval: Duration,

    /// Target URL of the pending checkout status.
    pub home_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            home_url: "https://github.com/ligi/kontinuum".to_string(),
        }
    }
}

pub struct LifecycleEngine {
    queue: Arc<dyn WorkPackageQueue>,
    synchronizer: RepositorySynchronizer,
    pipeline: StagePipeline,
    reporter: StatusReporter,
    config: EngineConfig,
}

impl LifecycleEngine {
    pub fn new(
        queue: Arc<dyn WorkPackageQueue>,
        synchronizer: RepositorySynchronizer,
        pipeline: StagePipeline,
        reporter: StatusReporter,
        config: EngineConfig,
    ) -> Self {
        Self {
            queue,
            synchronizer,
            pipeline,
            reporter,
            config,
        }
    }

    /// Process at most one package. Returns the finished package, or `None`
    /// when nothing was pending.
    ///
    /// Only a failure to claim is returned as an error; everything after
    /// the claim is absorbed so the package always reaches FINISHED.
    pub async fn process_next(&self) -> anyhow::Result<Option<WorkPackage>> {
        let Some(work_package) = self.queue.claim_next_pending().await? else {
            return Ok(None);
        };

        let span = package_span(&work_package.project, &work_package.commit_hash);
        let finished = self.process(work_package).instrument(span).await;
        Ok(Some(finished))
    }

    async fn process(&self, mut work_package: WorkPackage) -> WorkPackage {
        emit_package_claimed(&work_package.project, &work_package.commit_hash);

        if let Err(err) = self
            .reporter
            .report(
                &work_package,
                &self.config.home_url,
                CommitState::Pending,
                "checkout in progress",
                CHECKOUT_CONTEXT,
            )
            .await
        {
            emit_package_error(&work_package.project, &err);
        }

        let ready = match self.synchronizer.prepare(&mut work_package).await {
            Ok(ready) => ready,
            Err(err) => {
                emit_package_error(&work_package.project, &err);
                false
            }
        };
        self.save(&work_package).await;

        let outcome = if ready {
            let work_tree = self.synchronizer.work_tree(&work_package.project);
            Some(
                self.pipeline
                    .run_configured(&mut work_package, &work_tree)
                    .await,
            )
        } else {
            None
        };

        if let Err(err) = work_package.advance_to(WorkPackageStatus::Finished) {
            emit_package_error(&work_package.project, &err);
        }
        self.save(&work_package).await;

        METRICS.inc_packages_processed();
        METRICS.flush();
        let success = outcome.as_ref().is_some_and(|o| o.success);
        emit_package_finished(
            &work_package.project,
            work_package.stage_info_list.len(),
            success,
        );

        work_package
    }

    async fn save(&self, work_package: &WorkPackage) {
        if let Err(err) = self.queue.update(work_package).await {
            warn!(error = %err, package = %work_package.label(), "failed to update queue");
        }
    }

    /// Poll the queue until `cancel` fires, pausing one poll interval after
    /// every iteration. A claim error is logged and retried on the next poll.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "worker started"
        );
        while !cancel.is_cancelled() {
            self.iterate().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
        info!("worker stopped");
    }

    /// Run exactly `iterations` polls, each followed by the poll interval.
    /// Returns the number of packages processed.
    pub async fn run_iterations(&self, iterations: usize) -> usize {
        let mut processed = 0;
        for _ in 0..iterations {
            if self.iterate().await {
                processed += 1;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
        processed
    }

    async fn iterate(&self) -> bool {
        match self.process_next().await {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!("no pending work package");
                false
            }
            Err(err) => {
                warn!(error = %err, "failed to claim work package");
                false
            }
        }
    }
}
