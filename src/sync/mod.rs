//! Planning and executing content sync between a working tree and the
//! shared repository: candidate comparison, conflict resolution, and
//! atomic manifest persistence.

pub mod executor;
pub mod manifest;
pub mod planner;

pub use executor::{ExecutionError, ExecutionResult, FilesystemRemoteBackend, SyncBackend, SyncExecutor};
pub use manifest::{ManifestEntry, SyncDirection, SyncManifest};
pub use planner::{
    CandidateFile, ConflictPolicy, ConflictResolution, Direction, FileState, Operation,
    PlannedOperation, PlannerOptions, SyncPlan, plan_sync,
};
