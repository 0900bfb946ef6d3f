//! Domain models for Kontinuum.
//!
//! Canonical definitions for the core entities:
//! - `WorkPackage`: one queued build request and its lifecycle status
//! - `StageInfo`: execution record of one attempted stage
//! - `CommitStatus`: transient status tuple sent to the commit-status sink

pub mod commit_status;
pub mod error;
pub mod stage_info;
pub mod work_package;

pub use commit_status::{CommitState, CommitStatus};
pub use error::{KontinuumError, Result};
pub use stage_info::{StageInfo, StageStatus};
pub use work_package::{WorkPackage, WorkPackageStatus};
