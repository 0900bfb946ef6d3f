//! kontinuumd - Kontinuum CI worker daemon
//!
//! Drains the work package queue file one package at a time until Ctrl-C.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use kontinuum_ci::{
    EngineConfig, LifecycleEngine, RepositorySynchronizer, StagePipeline, StageRegistry,
    StageRunner, SyncConfig,
};
use kontinuum_core::publisher::default_rules;
use kontinuum_core::{
    init_tracing, ArtifactPublisher, FileQueue, FsContentStore, GithubConfig, GithubStatusSink,
    PrimaryArtifactRules, StaticTokenProvider, StatusReporter, SystemClock, TokenProvider,
    WorkPackageQueue,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use crate::config::DaemonConfig;

#[derive(Parser, Debug)]
#[command(name = "kontinuumd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Kontinuum continuous integration worker", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "KONTINUUM_CONFIG")]
    config: Option<PathBuf>,

    /// Override the work package queue file
    #[arg(long, env = "KONTINUUM_QUEUE_FILE")]
    queue_file: Option<PathBuf>,

    /// Override the work tree root
    #[arg(long, env = "KONTINUUM_WORKSPACE_DIR")]
    workspace_dir: Option<PathBuf>,

    /// Override the stage output root
    #[arg(long, env = "KONTINUUM_OUT_DIR_ROOT")]
    out_dir: Option<PathBuf>,

    /// Override the content store directory
    #[arg(long, env = "KONTINUUM_CAS_DIR")]
    cas_dir: Option<PathBuf>,

    /// Override the idle poll interval in seconds
    #[arg(long, env = "KONTINUUM_POLL_INTERVAL_SECS")]
    poll_interval_secs: Option<u64>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn apply(&self, config: &mut DaemonConfig) {
        if let Some(path) = &self.queue_file {
            config.queue_file = path.clone();
        }
        if let Some(path) = &self.workspace_dir {
            config.workspace_dir = path.clone();
        }
        if let Some(path) = &self.out_dir {
            config.out_dir = path.clone();
        }
        if let Some(path) = &self.cas_dir {
            config.cas_dir = path.clone();
        }
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    let mut config = DaemonConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    let engine = build_engine(&config)?;
    info!(
        version = kontinuum_core::VERSION,
        queue = %config.queue_file.display(),
        workspace = %config.workspace_dir.display(),
        "kontinuumd starting"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("shutdown requested, finishing current package");
                    cancel.cancel();
                }
                Err(err) => warn!(error = %err, "cannot listen for Ctrl-C"),
            }
        });
    }

    engine.run(cancel).await;
    Ok(())
}

fn tokens(config: &DaemonConfig) -> Result<Arc<dyn TokenProvider>> {
    let provider = match &config.github.token {
        Some(token) => StaticTokenProvider::new(token.clone()),
        None => StaticTokenProvider::from_env().context("no GitHub token configured")?,
    };
    Ok(Arc::new(provider))
}

fn artifact_rules(config: &DaemonConfig) -> Result<PrimaryArtifactRules> {
    let mut rules = default_rules();
    for (stage, pattern) in &config.artifacts.primary {
        rules = rules.with_rule(stage.clone(), pattern)?;
    }
    if let Some(pattern) = &config.artifacts.fallback {
        rules = rules.with_fallback(pattern)?;
    }
    Ok(rules)
}

fn stage_registry(config: &DaemonConfig) -> StageRegistry {
    let mut registry = StageRegistry::with_builtins(config.stage_timeout_secs);
    for stage in &config.stages {
        registry.register_command(stage.clone());
    }
    registry
}

/// Wire every collaborator from `config`.
fn build_engine(config: &DaemonConfig) -> Result<LifecycleEngine> {
    let tokens = tokens(config)?;
    let queue: Arc<dyn WorkPackageQueue> = Arc::new(FileQueue::new(&config.queue_file));
    let store = Arc::new(FsContentStore::new(&config.cas_dir)?);
    let publisher = Arc::new(
        ArtifactPublisher::new(store, config.url_scheme.clone()).with_rules(artifact_rules(config)?),
    );

    let github = GithubConfig {
        api_url: config.github.api_url.clone(),
        ..GithubConfig::default()
    };
    let sink = Arc::new(GithubStatusSink::new(github, tokens.clone())?);
    let reporter = StatusReporter::with_product(sink, config.product.clone());

    let synchronizer = RepositorySynchronizer::new(
        SyncConfig {
            workspace_dir: config.workspace_dir.clone(),
            clone_url_template: config.clone_url_template.clone(),
            home_url: config.home_url.clone(),
            clean_command: config.clean_command.clone(),
        },
        tokens,
        reporter.clone(),
        publisher.clone(),
    );
    let runner = StageRunner::new(
        reporter.clone(),
        publisher,
        config.out_dir.clone(),
        config.home_url.clone(),
    );
    let pipeline = StagePipeline::new(
        runner,
        Arc::new(stage_registry(config)),
        Arc::new(SystemClock),
    )
    .with_progress(queue.clone());

    Ok(LifecycleEngine::new(
        queue,
        synchronizer,
        pipeline,
        reporter,
        EngineConfig {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            home_url: config.home_url.clone(),
        },
    ))
}
