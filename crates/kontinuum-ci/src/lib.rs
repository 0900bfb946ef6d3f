//! Kontinuum CI
//!
//! Repository synchronization, stage execution and the work package
//! lifecycle engine that ties them together.

pub mod engine;
pub mod pipeline;
pub mod runner;
pub mod stage;
pub mod sync;

pub use engine::{EngineConfig, LifecycleEngine};
pub use pipeline::{PipelineOutcome, StagePipeline, CONFIG_CONTEXT};
pub use runner::{StageRunner, ERROR_FILE, RESULT_DESCRIPTION};
pub use stage::{
    BuiltinStage, CommandStage, Stage, StageConfig, StageContext, StageRegistry, StageResult,
    UnknownStage,
};
pub use sync::{RepositorySynchronizer, SyncConfig, SyncMode};
