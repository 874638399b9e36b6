//! Applies a sync plan's operations and persists the resulting manifest
//! atomically, serializing concurrent executions per working tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::sync::manifest::{ManifestEntry, SyncDirection, SyncManifest};
use crate::sync::planner::{Operation, PlannedOperation, SyncPlan};

/// Delegate that performs the actual local/remote write for one operation.
/// Remote writes are delegated to an external process per the core's
/// non-goal of not implementing VCS protocols itself.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    async fn write_local(&self, path: &str, content: &[u8]) -> Result<()>;
    async fn delete_local(&self, path: &str) -> Result<()>;
    async fn read_local(&self, path: &str) -> Result<Vec<u8>>;

    async fn write_remote(&self, path: &str, content: &[u8]) -> Result<()>;
    async fn delete_remote(&self, path: &str) -> Result<()>;
    async fn read_remote(&self, path: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct ExecutionError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub applied: usize,
    pub skipped: usize,
    pub errors: Vec<ExecutionError>,
}

impl ExecutionResult {
    /// A non-empty error list makes the overall result a partial success
    /// rather than an outright failure.
    pub fn is_partial_success(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Owns the manifest for the duration of one sync and serializes concurrent
/// executions against the same working tree.
pub struct SyncExecutor {
    backend: Arc<dyn SyncBackend>,
    manifest_path: PathBuf,
    org: String,
    project: String,
    in_progress: Arc<Mutex<()>>,
}

impl SyncExecutor {
    pub fn new(backend: Arc<dyn SyncBackend>, manifest_path: impl Into<PathBuf>, org: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            backend,
            manifest_path: manifest_path.into(),
            org: org.into(),
            project: project.into(),
            in_progress: Arc::new(Mutex::new(())),
        }
    }

    /// Execute `plan` in order. A second overlapping execution on the same
    /// executor fails fast with `SyncInProgress` rather than blocking.
    pub async fn execute(&self, plan: &SyncPlan) -> Result<ExecutionResult> {
        self.execute_cancellable(plan, None).await
    }

    /// Same as [`Self::execute`], but checked against `cancellation` between
    /// operations. Work already applied when cancellation fires is kept and
    /// recorded in the manifest; the returned error does not roll it back.
    pub async fn execute_cancellable(&self, plan: &SyncPlan, cancellation: Option<CancellationToken>) -> Result<ExecutionResult> {
        let guard = self
            .in_progress
            .try_lock()
            .map_err(|_| Error::SyncInProgress(format!("{}/{}", self.org, self.project)))?;

        info!(org = %self.org, project = %self.project, operations = plan.operations.len(), "starting sync execution");

        let mut manifest = SyncManifest::load(&self.manifest_path).await?;
        let mut errors = Vec::new();
        let mut applied = 0;
        let mut skipped = 0;
        let mut cancelled = false;

        for op in &plan.operations {
            if cancellation.as_ref().is_some_and(|t| t.is_cancelled()) {
                warn!(org = %self.org, project = %self.project, "sync execution cancelled, stopping before remaining operations");
                cancelled = true;
                break;
            }

            match self.apply_one(op, &mut manifest).await {
                Ok(true) => applied += 1,
                Ok(false) => skipped += 1,
                Err(e) => {
                    warn!(path = %op.path, error = %e, "sync operation failed, continuing with next");
                    errors.push(ExecutionError { path: op.path.clone(), message: e.to_string() });
                }
            }
        }

        // Written regardless of how the loop ended: a crash or cancellation
        // mid-loop leaves the working tree ahead of the manifest, reconciled
        // by the next planning pass, but already-applied work is recorded.
        manifest.save(&self.manifest_path).await?;
        drop(guard);

        info!(org = %self.org, project = %self.project, applied, skipped, errors = errors.len(), "sync execution complete");

        if cancelled {
            return Err(Error::Cancelled(format!("{}/{}", self.org, self.project)));
        }

        Ok(ExecutionResult { applied, skipped, errors })
    }

    async fn apply_one(&self, op: &PlannedOperation, manifest: &mut SyncManifest) -> Result<bool> {
        match op.operation {
            Operation::Skip => Ok(false),
            Operation::CreateRemote | Operation::UpdateRemote => {
                let content = self.backend.read_local(&op.path).await?;
                self.backend.write_remote(&op.path, &content).await?;
                self.record(manifest, &op.path, &content, SyncDirection::ToShared);
                Ok(true)
            }
            Operation::CreateLocal | Operation::UpdateLocal => {
                let content = self.backend.read_remote(&op.path).await?;
                self.backend.write_local(&op.path, &content).await?;
                self.record(manifest, &op.path, &content, SyncDirection::FromShared);
                Ok(true)
            }
            Operation::DeleteRemote => {
                self.backend.delete_remote(&op.path).await?;
                manifest.remove(&self.org, &self.project, &op.path);
                Ok(true)
            }
            Operation::DeleteLocal => {
                self.backend.delete_local(&op.path).await?;
                manifest.remove(&self.org, &self.project, &op.path);
                Ok(true)
            }
            Operation::Conflict => {
                // Conflicts are resolved into an update operation by the
                // planner before reaching the executor; an unresolved one
                // here indicates a planner bug, not a partial success.
                Err(Error::SyncConflict(op.path.clone()))
            }
        }
    }

    fn record(&self, manifest: &mut SyncManifest, path: &str, content: &[u8], direction: SyncDirection) {
        let hash = crate::cache::entry::content_hash(content);
        manifest.set(
            &self.org,
            &self.project,
            path,
            ManifestEntry {
                hash,
                size: content.len() as u64,
                last_synced_at: Utc::now(),
                direction,
            },
        );
    }
}

/// A [`SyncBackend`] backed by the local filesystem and an external helper
/// process for the remote side, array-argument only, no shell.
pub struct FilesystemRemoteBackend {
    local_root: PathBuf,
    remote_helper: PathBuf,
}

impl FilesystemRemoteBackend {
    pub fn new(local_root: impl Into<PathBuf>, remote_helper: impl Into<PathBuf>) -> Self {
        Self { local_root: local_root.into(), remote_helper: remote_helper.into() }
    }

    fn local_path(&self, path: &str) -> PathBuf {
        self.local_root.join(path)
    }
}

#[async_trait]
impl SyncBackend for FilesystemRemoteBackend {
    async fn write_local(&self, path: &str, content: &[u8]) -> Result<()> {
        let full = self.local_path(path);
        if let Some(dir) = full.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(full, content).await?;
        Ok(())
    }

    async fn delete_local(&self, path: &str) -> Result<()> {
        tokio::fs::remove_file(self.local_path(path)).await?;
        Ok(())
    }

    async fn read_local(&self, path: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.local_path(path)).await?)
    }

    async fn write_remote(&self, path: &str, content: &[u8]) -> Result<()> {
        run_helper(&self.remote_helper, &["put", path], Some(content)).await.map(|_| ())
    }

    async fn delete_remote(&self, path: &str) -> Result<()> {
        run_helper(&self.remote_helper, &["delete", path], None).await.map(|_| ())
    }

    async fn read_remote(&self, path: &str) -> Result<Vec<u8>> {
        run_helper(&self.remote_helper, &["get", path], None).await
    }
}

async fn run_helper(helper: &Path, args: &[&str], stdin_content: Option<&[u8]>) -> Result<Vec<u8>> {
    use tokio::io::AsyncWriteExt;
    use tokio::process::Command;

    let mut child = Command::new(helper)
        .args(args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| Error::Transport(format!("failed to spawn remote helper: {e}")))?;

    if let Some(content) = stdin_content {
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content).await.map_err(Error::from)?;
        }
    }

    let output = child.wait_with_output().await.map_err(|e| Error::Transport(e.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Transport(format!("remote helper exited with {}: {stderr}", output.status)));
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::planner::PlannedOperation;
    use std::collections::HashMap as StdHashMap;
    use tokio::sync::Mutex as TokioMutex;

    struct InMemoryBackend {
        local: TokioMutex<StdHashMap<String, Vec<u8>>>,
        remote: TokioMutex<StdHashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl SyncBackend for InMemoryBackend {
        async fn write_local(&self, path: &str, content: &[u8]) -> Result<()> {
            self.local.lock().await.insert(path.to_string(), content.to_vec());
            Ok(())
        }
        async fn delete_local(&self, path: &str) -> Result<()> {
            self.local.lock().await.remove(path);
            Ok(())
        }
        async fn read_local(&self, path: &str) -> Result<Vec<u8>> {
            self.local.lock().await.get(path).cloned().ok_or_else(|| Error::NotFound(path.to_string()))
        }
        async fn write_remote(&self, path: &str, content: &[u8]) -> Result<()> {
            self.remote.lock().await.insert(path.to_string(), content.to_vec());
            Ok(())
        }
        async fn delete_remote(&self, path: &str) -> Result<()> {
            self.remote.lock().await.remove(path);
            Ok(())
        }
        async fn read_remote(&self, path: &str) -> Result<Vec<u8>> {
            self.remote.lock().await.get(path).cloned().ok_or_else(|| Error::NotFound(path.to_string()))
        }
    }

    #[tokio::test]
    async fn create_remote_writes_and_records_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join(".fractary").join(".codex-sync-manifest.json");

        let backend = Arc::new(InMemoryBackend { local: TokioMutex::new(StdHashMap::new()), remote: TokioMutex::new(StdHashMap::new()) });
        backend.write_local("docs/guide.md", b"hello").await.unwrap();

        let executor = SyncExecutor::new(backend.clone(), &manifest_path, "acme", "widgets");
        let plan = SyncPlan {
            operations: vec![PlannedOperation { path: "docs/guide.md".to_string(), operation: Operation::CreateRemote, size: 5, conflict_resolution: None }],
            total_bytes: 5,
            estimated_duration: std::time::Duration::from_secs(0),
            conflicts: Vec::new(),
        };

        let result = executor.execute(&plan).await.unwrap();
        assert_eq!(result.applied, 1);
        assert!(result.errors.is_empty());
        assert_eq!(backend.remote.lock().await.get("docs/guide.md"), Some(&b"hello".to_vec()));

        let manifest = SyncManifest::load(&manifest_path).await.unwrap();
        assert!(manifest.get("acme", "widgets", "docs/guide.md").is_some());
    }

    #[tokio::test]
    async fn failed_operation_is_partial_success() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join(".fractary").join(".codex-sync-manifest.json");
        let backend = Arc::new(InMemoryBackend { local: TokioMutex::new(StdHashMap::new()), remote: TokioMutex::new(StdHashMap::new()) });

        let executor = SyncExecutor::new(backend, &manifest_path, "acme", "widgets");
        let plan = SyncPlan {
            operations: vec![PlannedOperation { path: "missing.md".to_string(), operation: Operation::CreateRemote, size: 0, conflict_resolution: None }],
            total_bytes: 0,
            estimated_duration: std::time::Duration::from_secs(0),
            conflicts: Vec::new(),
        };

        let result = executor.execute(&plan).await.unwrap();
        assert!(result.is_partial_success());
        assert_eq!(result.errors.len(), 1);
    }
}
