//! Integration tests for the stage pipeline with in-memory collaborators.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use kontinuum_ci::{
    Stage, StageConfig, StageContext, StagePipeline, StageRegistry, StageRunner, CONFIG_CONTEXT,
};
use kontinuum_core::fakes::{MemoryContentStore, RecordingStatusSink};
use kontinuum_core::{
    ArtifactPublisher, CommitState, FakeClock, MemoryQueue, StageStatus, StatusReporter,
    WorkPackage, WorkPackageQueue, WorkPackageStatus, REPO_CONFIG_PATH,
};

/// Stage that takes `seconds` of fake time and returns `verdict`.
struct Timed {
    clock: FakeClock,
    seconds: i64,
    verdict: CommitState,
}

#[async_trait]
impl Stage for Timed {
    async fn run(&self, ctx: &StageContext<'_>) -> anyhow::Result<CommitState> {
        self.clock.advance(self.seconds);
        std::fs::write(ctx.out_dir.join("log.txt"), "done")?;
        Ok(self.verdict)
    }
}

struct Harness {
    pipeline: StagePipeline,
    sink: Arc<RecordingStatusSink>,
    store: Arc<MemoryContentStore>,
    _out: Option<tempfile::TempDir>,
}

fn harness(registry: StageRegistry, clock: FakeClock) -> Harness {
    let out = tempfile::tempdir().unwrap();
    let mut harness = harness_at(registry, clock, out.path());
    harness._out = Some(out);
    harness
}

fn harness_at(registry: StageRegistry, clock: FakeClock, out_root: &Path) -> Harness {
    let sink = Arc::new(RecordingStatusSink::new());
    let store = Arc::new(MemoryContentStore::new());
    let runner = StageRunner::new(
        StatusReporter::new(sink.clone()),
        Arc::new(ArtifactPublisher::new(store.clone(), "cas")),
        out_root,
        "https://example.com/kontinuum",
    );
    let pipeline = StagePipeline::new(runner, Arc::new(registry), Arc::new(clock));
    Harness {
        pipeline,
        sink,
        store,
        _out: None,
    }
}

fn timed(clock: &FakeClock, seconds: i64, verdict: CommitState) -> Arc<dyn Stage> {
    Arc::new(Timed {
        clock: clock.clone(),
        seconds,
        verdict,
    })
}

fn stages(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn write_repo_config(work_tree: &Path, body: &str) {
    std::fs::create_dir_all(work_tree.join(".ci")).unwrap();
    std::fs::write(work_tree.join(REPO_CONFIG_PATH), body).unwrap();
}

/// Test: two passing stages are recorded in order with sane timestamps
#[tokio::test]
async fn test_all_stages_succeed() {
    let clock = FakeClock::new(1_000);
    let mut registry = StageRegistry::new();
    registry.register("build", timed(&clock, 30, CommitState::Success));
    registry.register("test", timed(&clock, 12, CommitState::Success));
    let h = harness(registry, clock);
    let tree = tempfile::tempdir().unwrap();
    let mut wp = WorkPackage::new("ligi/foo", "abc123", 7);

    let outcome = h
        .pipeline
        .run(&mut wp, tree.path(), &stages(&["build", "test"]))
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.attempted, 2);
    assert!(outcome.skipped.is_empty());

    let names: Vec<_> = wp.stage_info_list.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(names, vec!["build", "test"]);
    for info in &wp.stage_info_list {
        assert_eq!(info.status, StageStatus::Success);
        assert!(info.end_epoch_seconds.unwrap() >= info.start_epoch_seconds);
        assert!(info.info.starts_with("cas://"));
    }
    assert_eq!(wp.stage_info_list[0].duration_seconds(), Some(30));
    assert_eq!(wp.stage_info_list[1].start_epoch_seconds, 1_030);

    assert_eq!(h.sink.count("kontinuum/build", CommitState::Success), 1);
    assert_eq!(h.sink.count("kontinuum/test", CommitState::Success), 1);
}

/// Test: a failing stage stops the pipeline; later stages leave no trace
#[tokio::test]
async fn test_failure_short_circuits() {
    let clock = FakeClock::new(1_000);
    let mut registry = StageRegistry::new();
    registry.register("build", timed(&clock, 5, CommitState::Error));
    registry.register("test", timed(&clock, 5, CommitState::Success));
    let h = harness(registry, clock);
    let tree = tempfile::tempdir().unwrap();
    let mut wp = WorkPackage::new("ligi/foo", "abc123", 7);

    let outcome = h
        .pipeline
        .run(&mut wp, tree.path(), &stages(&["build", "test"]))
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.attempted, 1);
    assert_eq!(outcome.skipped, vec!["test".to_string()]);
    assert_eq!(wp.stage_info_list.len(), 1);
    assert_eq!(wp.stage_info_list[0].status, StageStatus::Error);
    assert!(h.sink.for_context("kontinuum/test").is_empty());
}

/// Test: a command stage's log is the published artifact
#[tokio::test]
async fn test_command_stage_log_published() {
    let clock = FakeClock::new(1_000);
    let mut registry = StageRegistry::new();
    registry.register_command(StageConfig::custom(
        "lint",
        vec!["sh".into(), "-c".into(), "echo lint-output".into()],
        60,
    ));
    let h = harness(registry, clock);
    let tree = tempfile::tempdir().unwrap();
    let mut wp = WorkPackage::new("ligi/foo", "abc123", 7);

    let outcome = h.pipeline.run(&mut wp, tree.path(), &stages(&["lint"])).await;

    assert!(outcome.success);
    let log = h.store.resolve_url(&wp.stage_info_list[0].info).unwrap();
    assert!(log.contains("lint-output"));
    assert!(log.contains("exit code 0"));
}

/// Test: a non-zero exit is an error verdict
#[tokio::test]
async fn test_command_stage_nonzero_exit_fails() {
    let clock = FakeClock::new(1_000);
    let mut registry = StageRegistry::new();
    registry.register_command(StageConfig::custom("build", vec!["false".into()], 60));
    let h = harness(registry, clock);
    let tree = tempfile::tempdir().unwrap();
    let mut wp = WorkPackage::new("ligi/foo", "abc123", 7);

    let outcome = h.pipeline.run(&mut wp, tree.path(), &stages(&["build"])).await;

    assert!(!outcome.success);
    assert_eq!(wp.stage_info_list[0].status, StageStatus::Error);
    assert_eq!(h.sink.count("kontinuum/build", CommitState::Error), 1);
}

/// Test: unknown stage names fail instead of being ignored
#[tokio::test]
async fn test_unknown_stage_fails() {
    let h = harness(StageRegistry::new(), FakeClock::new(1_000));
    let tree = tempfile::tempdir().unwrap();
    let mut wp = WorkPackage::new("ligi/foo", "abc123", 7);

    let outcome = h
        .pipeline
        .run(&mut wp, tree.path(), &stages(&["deploy"]))
        .await;

    assert!(!outcome.success);
    let log = h.store.resolve_url(&wp.stage_info_list[0].info).unwrap();
    assert!(log.contains("unknown stage: deploy"));
}

/// Test: missing repository config runs nothing and succeeds
#[tokio::test]
async fn test_missing_config_runs_nothing() {
    let h = harness(StageRegistry::new(), FakeClock::new(1_000));
    let tree = tempfile::tempdir().unwrap();
    let mut wp = WorkPackage::new("ligi/foo", "abc123", 7);

    let outcome = h.pipeline.run_configured(&mut wp, tree.path()).await;

    assert!(outcome.success);
    assert!(wp.stage_info_list.is_empty());
    assert!(h.sink.calls().is_empty());
}

/// Test: declared stages are loaded from the work tree
#[tokio::test]
async fn test_configured_stages_run_in_order() {
    let clock = FakeClock::new(1_000);
    let mut registry = StageRegistry::new();
    registry.register("test", timed(&clock, 1, CommitState::Success));
    registry.register("build", timed(&clock, 1, CommitState::Success));
    let h = harness(registry, clock);
    let tree = tempfile::tempdir().unwrap();
    write_repo_config(tree.path(), r#"{"stages": ["test", "build"]}"#);
    let mut wp = WorkPackage::new("ligi/foo", "abc123", 7);

    let outcome = h.pipeline.run_configured(&mut wp, tree.path()).await;

    assert!(outcome.success);
    let names: Vec<_> = wp.stage_info_list.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(names, vec!["test", "build"]);
}

/// Test: malformed repository config is reported on the config context
#[tokio::test]
async fn test_malformed_config_reported() {
    let h = harness(StageRegistry::new(), FakeClock::new(1_000));
    let tree = tempfile::tempdir().unwrap();
    write_repo_config(tree.path(), "{ not json");
    let mut wp = WorkPackage::new("ligi/foo", "abc123", 7);

    let outcome = h.pipeline.run_configured(&mut wp, tree.path()).await;

    assert!(!outcome.success);
    assert!(wp.stage_info_list.is_empty());
    let statuses = h.sink.for_context(&format!("kontinuum/{CONFIG_CONTEXT}"));
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].state, CommitState::Error);
    let diagnostic = h.store.resolve_url(&statuses[0].target_url).unwrap();
    assert!(diagnostic.contains(REPO_CONFIG_PATH));
}

/// Test: stage progress is written back to the queue
#[tokio::test]
async fn test_progress_saved_to_queue() {
    let clock = FakeClock::new(1_000);
    let mut registry = StageRegistry::new();
    registry.register("build", timed(&clock, 3, CommitState::Success));
    let h = harness(registry, clock);
    let queue = Arc::new(MemoryQueue::with_packages(vec![WorkPackage::new(
        "ligi/foo", "abc123", 7,
    )]));
    let pipeline = h.pipeline.with_progress(queue.clone());
    let tree = tempfile::tempdir().unwrap();

    let mut wp = queue.claim_next_pending().await.unwrap().unwrap();
    pipeline.run(&mut wp, tree.path(), &stages(&["build"])).await;

    let stored = &queue.snapshot().await.unwrap()[0];
    assert_eq!(stored.work_package_status, WorkPackageStatus::Processing);
    assert_eq!(stored.stage_info_list.len(), 1);
    assert_eq!(stored.stage_info_list[0].status, StageStatus::Success);
}

/// Test: a configured stage name cannot reach outside the output root
#[tokio::test]
async fn test_escaping_stage_name_is_an_error() {
    let base = tempfile::tempdir().unwrap();
    let out_root = base.path().join("out");
    let victim = base.path().join("victim");
    std::fs::create_dir_all(&victim).unwrap();
    std::fs::write(victim.join("precious.txt"), "keep").unwrap();

    let clock = FakeClock::new(1_000);
    let mut registry = StageRegistry::new();
    registry.register("build", timed(&clock, 1, CommitState::Success));
    let h = harness_at(registry, clock, &out_root);
    let tree = tempfile::tempdir().unwrap();
    write_repo_config(
        tree.path(),
        r#"{"stages": ["build", "../../../../victim", "/tmp"]}"#,
    );
    let mut wp = WorkPackage::new("ligi/foo", "abc", 7);

    let outcome = h.pipeline.run_configured(&mut wp, tree.path()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.attempted, 2);
    assert_eq!(outcome.skipped, vec!["/tmp".to_string()]);
    assert_eq!(wp.stage_info_list[1].status, StageStatus::Error);
    assert!(victim.join("precious.txt").exists());
    assert!(out_root.join("ligi/foo/abc/build").exists());
}
