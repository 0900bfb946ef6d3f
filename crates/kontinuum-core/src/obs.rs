//! Structured observability hooks for work package lifecycle events.
//!
//! This module provides:
//! - Package-scoped tracing spans via `package_span`
//! - Emission functions for key lifecycle events: claim, checkout, stage
//!   start/finish/skip, package finish
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).
//! For JSON output, start the daemon with `--json`.

use tracing::{info, warn};

/// Span tagging everything logged while a package is processed.
///
/// Attach it with `tracing::Instrument` so it survives across `.await`s.
///
/// # Example
///
/// ```ignore
/// process(wp).instrument(package_span("ligi/foo", "abc123")).await;
/// ```
pub fn package_span(project: &str, commit_hash: &str) -> tracing::Span {
    tracing::info_span!("kontinuum.package", project = %project, commit = %commit_hash)
}

/// Emit event: a pending package was claimed.
pub fn emit_package_claimed(project: &str, commit_hash: &str) {
    info!(event = "package.claimed", project = %project, commit = %commit_hash);
}

/// Emit event: checkout finished (successfully or not).
pub fn emit_checkout_finished(project: &str, success: bool) {
    info!(event = "checkout.finished", project = %project, success = success);
}

/// Emit event: checkout failed with `error` (warning level).
pub fn emit_checkout_error(project: &str, error: &dyn std::fmt::Display) {
    warn!(event = "checkout.error", project = %project, error = %error);
}

/// Emit event: stage started.
pub fn emit_stage_started(stage: &str) {
    info!(event = "stage.started", stage = %stage);
}

/// Emit event: stage finished with its verdict, duration and artifact URL.
pub fn emit_stage_finished(stage: &str, verdict: &str, duration_secs: i64, url: &str) {
    info!(
        event = "stage.finished",
        stage = %stage,
        verdict = %verdict,
        duration_secs = duration_secs,
        url = %url,
    );
}

/// Emit event: stage skipped because an earlier stage failed.
pub fn emit_stage_skipped(stage: &str) {
    info!(event = "stage.skipped", stage = %stage, reason = "earlier stage failed");
}

/// Emit event: package reached FINISHED.
pub fn emit_package_finished(project: &str, stages_run: usize, success: bool) {
    info!(
        event = "package.finished",
        project = %project,
        stages_run = stages_run,
        success = success,
    );
}

/// Emit event: a collaborator failed while processing a package (warning
/// level). The package is still finished.
pub fn emit_package_error(project: &str, error: &dyn std::fmt::Display) {
    warn!(event = "package.error", project = %project, error = %error);
}
