//! Repository synchronization: brings `<workspace>/<project>` to the
//! requested commit, submodules included.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use kontinuum_core::auth::clone_url;
use kontinuum_core::{
    emit_checkout_error, emit_checkout_finished, git, ArtifactPublisher, CommitState,
    StatusReporter, TokenProvider, WorkPackage, CHECKOUT_CONTEXT, METRICS,
};
use tokio::process::Command;

use crate::runner::contained_path;
use tracing::{debug, info, warn};

/// Settings for [`RepositorySynchronizer`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root under which each project gets its own work tree.
    pub workspace_dir: PathBuf,

    /// Clone URL template with `{token}` and `{project}` placeholders.
    pub clone_url_template: String,

    /// Target URL of non-diagnostic checkout statuses.
    pub home_url: String,

    /// Build-system clean run in the work tree after a successful checkout.
    pub clean_command: Option<Vec<String>>,
}

/// How the work tree was brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Cloned,
    Fetched,
}

pub struct RepositorySynchronizer {
    config: SyncConfig,
    tokens: Arc<dyn TokenProvider>,
    reporter: StatusReporter,
    publisher: Arc<ArtifactPublisher>,
}

impl RepositorySynchronizer {
    pub fn new(
        config: SyncConfig,
        tokens: Arc<dyn TokenProvider>,
        reporter: StatusReporter,
        publisher: Arc<ArtifactPublisher>,
    ) -> Self {
        Self {
            config,
            tokens,
            reporter,
            publisher,
        }
    }

    /// Work tree of `project`.
    pub fn work_tree(&self, project: &str) -> PathBuf {
        self.config.workspace_dir.join(project)
    }

    /// Synchronize the work tree for `work_package` and report the checkout
    /// status. Returns whether stages may run.
    ///
    /// On success the commit message is recorded on the package, a success
    /// status is reported and the clean command runs. On failure the error
    /// chain is published and an error status pointing at it is reported.
    /// A partially cloned tree is left as it is.
    pub async fn prepare(&self, work_package: &mut WorkPackage) -> kontinuum_core::Result<bool> {
        let path = self.work_tree(&work_package.project);

        match self.synchronize(work_package, &path).await {
            Ok((mode, message)) => {
                debug!(mode = ?mode, "work tree synchronized");
                info!(message = %message.lines().next().unwrap_or(""), "processing commit");
                work_package.commit_message = Some(message);
                self.reporter
                    .report(
                        work_package,
                        &self.config.home_url,
                        CommitState::Success,
                        "checkout done",
                        CHECKOUT_CONTEXT,
                    )
                    .await?;
                emit_checkout_finished(&work_package.project, true);
                self.clean(&path).await;
                Ok(true)
            }
            Err(err) => {
                emit_checkout_error(&work_package.project, &format!("{err:#}"));
                METRICS.inc_checkout_failures();
                let description = format!("error while checkout: {err:#}");
                let trace = format!("{description}\n\n{err:?}\n");
                let url = match self.publisher.publish_text(&trace).await {
                    Ok(url) => url,
                    Err(publish_err) => {
                        warn!(error = %publish_err, "failed to publish checkout diagnostic");
                        self.config.home_url.clone()
                    }
                };
                self.reporter
                    .report(
                        work_package,
                        &url,
                        CommitState::Error,
                        &description,
                        CHECKOUT_CONTEXT,
                    )
                    .await?;
                emit_checkout_finished(&work_package.project, false);
                Ok(false)
            }
        }
    }

    /// Clone or fetch, check out, update submodules. Returns the full
    /// commit message.
    pub async fn synchronize(
        &self,
        work_package: &WorkPackage,
        path: &Path,
    ) -> anyhow::Result<(SyncMode, String)> {
        contained_path(&self.config.workspace_dir, &[&work_package.project])?;

        let mode = if !path.exists() {
            let token = self
                .tokens
                .token(work_package.installation_id)
                .await
                .context("obtaining access token")?;
            let url = clone_url(&self.config.clone_url_template, &token, &work_package.project);
            info!(path = %path.display(), "cloning");
            git::clone_recursive(&url, path)
                .await
                .with_context(|| format!("cloning {}", work_package.project))?;
            SyncMode::Cloned
        } else {
            if !git::is_initialized(path) {
                anyhow::bail!("{} exists but is not a git repository", path.display());
            }
            info!(path = %path.display(), "fetching");
            git::fetch(path)
                .await
                .with_context(|| format!("fetching {}", work_package.project))?;
            SyncMode::Fetched
        };

        git::checkout(path, &work_package.commit_hash)
            .await
            .with_context(|| format!("checking out {}", work_package.commit_hash))?;

        self.update_submodules(path).await?;

        let message = git::head_message(path)
            .await
            .context("reading commit message")?;
        Ok((mode, message))
    }

    /// Fetch every initialized submodule on its own, then update the whole
    /// tree. A failing submodule fetch aborts the checkout.
    async fn update_submodules(&self, path: &Path) -> anyhow::Result<()> {
        for module in git::submodule_paths(path).await.context("walking submodules")? {
            let module_dir = path.join(&module);
            if !git::is_initialized(&module_dir) {
                debug!(submodule = %module, "submodule not initialized yet");
                continue;
            }
            git::fetch(&module_dir)
                .await
                .with_context(|| format!("fetching submodule {module}"))?;
        }
        git::submodule_update(path)
            .await
            .context("updating submodules")?;
        Ok(())
    }

    /// Run the configured clean command; failure is only logged.
    async fn clean(&self, path: &Path) {
        let Some(command) = self.config.clean_command.as_ref().filter(|c| !c.is_empty()) else {
            return;
        };
        info!(command = %command.join(" "), "cleaning");
        let status = Command::new(&command[0])
            .args(&command[1..])
            .current_dir(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(status = %status, "clean command failed"),
            Err(err) => warn!(error = %err, "clean command could not run"),
        }
    }
}
