//! Kontinuum Core Library
//!
//! Domain model and collaborator interfaces for the Kontinuum CI worker:
//! work packages, the content-addressable store, commit-status reporting,
//! access tokens, the work package queue and git helpers.

pub mod auth;
pub mod cas;
pub mod clock;
pub mod domain;
pub mod fakes;
pub mod git;
pub mod github;
pub mod metrics;
pub mod obs;
pub mod publisher;
pub mod queue;
pub mod repo_config;
pub mod status;
pub mod telemetry;

pub use domain::{
    CommitState, CommitStatus, KontinuumError, Result, StageInfo, StageStatus, WorkPackage,
    WorkPackageStatus,
};

pub use auth::{clone_url, StaticTokenProvider, TokenProvider, DEFAULT_CLONE_URL_TEMPLATE};
pub use cas::fs::FsContentStore;
pub use cas::{AddedEntry, CasError, ContentHash, ContentStore};
pub use clock::{Clock, FakeClock, SystemClock};
pub use github::{GithubConfig, GithubStatusSink};
pub use publisher::{ArtifactPublisher, PrimaryArtifactRules};
pub use queue::{FileQueue, MemoryQueue, WorkPackageQueue};
pub use repo_config::{RepoConfig, REPO_CONFIG_PATH};
pub use status::{CommitStatusSink, StatusReporter, CHECKOUT_CONTEXT, DEFAULT_PRODUCT};

pub use metrics::METRICS;
pub use obs::{
    emit_checkout_error, emit_checkout_finished, emit_package_claimed, emit_package_error,
    emit_package_finished, emit_stage_finished, emit_stage_skipped, emit_stage_started,
    package_span,
};
pub use telemetry::init_tracing;

/// Kontinuum version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
