//! Compares local + remote + manifest state and produces the minimal set of
//! create/update/delete/skip/conflict operations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::sync::manifest::{SyncManifest, SyncDirection as ManifestDirection};

/// Overall sync direction requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToShared,
    FromShared,
    Bidirectional,
}

/// State of a file on one side (local or remote), when present.
#[derive(Debug, Clone)]
pub struct FileState {
    pub hash: String,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

/// One file considered for planning, with its state on each side.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub path: String,
    pub local: Option<FileState>,
    pub remote: Option<FileState>,
}

/// How a conflict (both sides changed from the manifest) should be decided.
#[derive(Clone)]
pub enum ConflictPolicy {
    LocalWins,
    RemoteWins,
    /// Newer `modified_at` wins; ties favor the remote side.
    Newest,
    /// Caller-supplied resolver, matching the source's "prompt" policy. A
    /// non-interactive caller that has none should use a fixed policy
    /// instead of this variant.
    Prompt(Arc<dyn Fn(&CandidateFile) -> ConflictResolution + Send + Sync>),
}

impl std::fmt::Debug for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictPolicy::LocalWins => write!(f, "LocalWins"),
            ConflictPolicy::RemoteWins => write!(f, "RemoteWins"),
            ConflictPolicy::Newest => write!(f, "Newest"),
            ConflictPolicy::Prompt(_) => write!(f, "Prompt(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    KeepLocal,
    KeepRemote,
}

#[derive(Debug, Clone)]
pub struct PlannerOptions {
    pub dry_run: bool,
    /// Ignore timestamp comparisons; proceed as if every present file changed.
    pub force: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub conflict_policy: ConflictPolicy,
    /// Throughput assumption used to estimate total sync time.
    pub bytes_per_second: u64,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            force: false,
            include: Vec::new(),
            exclude: Vec::new(),
            conflict_policy: ConflictPolicy::Newest,
            bytes_per_second: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateRemote,
    CreateLocal,
    UpdateRemote,
    UpdateLocal,
    DeleteRemote,
    DeleteLocal,
    Skip,
    Conflict,
}

#[derive(Debug, Clone)]
pub struct PlannedOperation {
    pub path: String,
    pub operation: Operation,
    pub size: u64,
    /// Present only for resolved conflicts: which side the policy picked.
    pub conflict_resolution: Option<ConflictResolution>,
}

#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub operations: Vec<PlannedOperation>,
    pub total_bytes: u64,
    pub estimated_duration: Duration,
    pub conflicts: Vec<PlannedOperation>,
}

/// Deterministic for a given set of inputs.
pub fn plan_sync(
    org: &str,
    project: &str,
    candidates: &[CandidateFile],
    manifest: &SyncManifest,
    direction: Direction,
    options: &PlannerOptions,
) -> SyncPlan {
    let mut operations = Vec::new();
    let mut conflicts = Vec::new();
    let mut total_bytes = 0u64;

    for candidate in candidates {
        if !passes_include_exclude(&candidate.path, options) {
            continue;
        }

        let manifest_entry = manifest.get(org, project, &candidate.path);
        let decision = decide(candidate, manifest_entry, direction, options);

        let size = candidate
            .local
            .as_ref()
            .or(candidate.remote.as_ref())
            .map(|s| s.size)
            .unwrap_or(0);

        if decision.operation != Operation::Skip {
            total_bytes += size;
        }

        // `decide` always resolves a conflict into an Update* operation
        // before returning it, so a resolved conflict is identified by
        // `conflict_resolution`, not by the (now rewritten) operation kind.
        if decision.conflict_resolution.is_some() {
            conflicts.push(decision.clone());
        }
        operations.push(decision);
    }

    let estimated_duration = if options.bytes_per_second == 0 {
        Duration::from_secs(0)
    } else {
        Duration::from_secs_f64(total_bytes as f64 / options.bytes_per_second as f64)
    };

    SyncPlan {
        operations,
        total_bytes,
        estimated_duration,
        conflicts,
    }
}

fn passes_include_exclude(path: &str, options: &PlannerOptions) -> bool {
    use crate::types::glob_matches;

    if !options.include.is_empty() && !options.include.iter().any(|p| glob_matches(p, path)) {
        return false;
    }
    if options.exclude.iter().any(|p| glob_matches(p, path)) {
        return false;
    }
    true
}

fn decide(
    candidate: &CandidateFile,
    manifest_entry: Option<&crate::sync::manifest::ManifestEntry>,
    direction: Direction,
    options: &PlannerOptions,
) -> PlannedOperation {
    let path = candidate.path.clone();
    let size = candidate.local.as_ref().or(candidate.remote.as_ref()).map(|s| s.size).unwrap_or(0);

    let Some(manifest_entry) = manifest_entry else {
        let op = match (&candidate.local, &candidate.remote) {
            (Some(_), None) => Operation::CreateRemote,
            (None, Some(_)) => Operation::CreateLocal,
            (Some(l), Some(r)) if l.hash == r.hash => Operation::Skip,
            (Some(_), Some(_)) if direction == Direction::Bidirectional => Operation::Conflict,
            (Some(_), Some(_)) => Operation::Skip,
            (None, None) => Operation::Skip,
        };
        return finish(path, op, size, candidate, options);
    };

    let local_changed = options.force && candidate.local.is_some()
        || candidate.local.as_ref().is_some_and(|l| l.hash != manifest_entry.hash);
    let remote_changed = options.force && candidate.remote.is_some()
        || candidate.remote.as_ref().is_some_and(|r| r.hash != manifest_entry.hash);

    let op = match (&candidate.local, &candidate.remote, local_changed, remote_changed) {
        (None, Some(_), _, _) if direction == Direction::ToShared => Operation::DeleteRemote,
        (Some(_), None, _, _) if direction == Direction::FromShared => Operation::DeleteLocal,
        (_, _, true, true) if direction == Direction::Bidirectional => Operation::Conflict,
        (_, _, true, false) if direction == Direction::ToShared || direction == Direction::Bidirectional => Operation::UpdateRemote,
        (_, _, false, true) if direction == Direction::FromShared || direction == Direction::Bidirectional => Operation::UpdateLocal,
        _ => Operation::Skip,
    };

    finish(path, op, size, candidate, options)
}

fn finish(path: String, op: Operation, size: u64, candidate: &CandidateFile, options: &PlannerOptions) -> PlannedOperation {
    if op != Operation::Conflict {
        return PlannedOperation { path, operation: op, size, conflict_resolution: None };
    }

    let resolution = resolve_conflict(candidate, &options.conflict_policy);
    let resolved_op = match resolution {
        ConflictResolution::KeepLocal => Operation::UpdateRemote,
        ConflictResolution::KeepRemote => Operation::UpdateLocal,
    };
    PlannedOperation { path, operation: resolved_op, size, conflict_resolution: Some(resolution) }
}

fn resolve_conflict(candidate: &CandidateFile, policy: &ConflictPolicy) -> ConflictResolution {
    match policy {
        ConflictPolicy::LocalWins => ConflictResolution::KeepLocal,
        ConflictPolicy::RemoteWins => ConflictResolution::KeepRemote,
        ConflictPolicy::Newest => {
            match (&candidate.local, &candidate.remote) {
                (Some(l), Some(r)) if l.modified_at > r.modified_at => ConflictResolution::KeepLocal,
                _ => ConflictResolution::KeepRemote,
            }
        }
        ConflictPolicy::Prompt(resolver) => resolver(candidate),
    }
}

// Re-exported for planner callers that need to build manifest entries after
// execution, keeping the direction vocabulary consistent across modules.
pub use ManifestDirection as EntryDirection;
