//! Plans and executes a small sync in one pass through the public API.

use std::collections::HashMap as StdHashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use codex_core::{
    plan_sync, CandidateFile, Direction, ExecutionResult, FileState, PlannerOptions, Result,
    SyncBackend, SyncExecutor, SyncManifest,
};
use tokio::sync::Mutex;

struct InMemoryBackend {
    local: Mutex<StdHashMap<String, Vec<u8>>>,
    remote: Mutex<StdHashMap<String, Vec<u8>>>,
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
        self.local
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| codex_core::Error::NotFound(path.to_string()))
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
        self.remote
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| codex_core::Error::NotFound(path.to_string()))
    }
}

#[tokio::test]
async fn new_local_file_plans_to_create_remote_and_executes() {
    let dir = tempfile::tempdir().unwrap();
    let manifest_path = dir.path().join(".fractary").join(".codex-sync-manifest.json");

    let backend = Arc::new(InMemoryBackend {
        local: Mutex::new(StdHashMap::new()),
        remote: Mutex::new(StdHashMap::new()),
    });
    backend.write_local("docs/guide.md", b"hello world").await.unwrap();

    let candidate = CandidateFile {
        path: "docs/guide.md".to_string(),
        local: Some(FileState { hash: "irrelevant-for-new-file".to_string(), size: 11, modified_at: Utc::now() }),
        remote: None,
    };
    let manifest = SyncManifest::new();
    let plan = plan_sync("acme", "widgets", &[candidate], &manifest, Direction::ToShared, &PlannerOptions::default());
    assert_eq!(plan.operations.len(), 1);

    let executor = SyncExecutor::new(backend.clone(), &manifest_path, "acme", "widgets");
    let ExecutionResult { applied, errors, .. } = executor.execute(&plan).await.unwrap();
    assert_eq!(applied, 1);
    assert!(errors.is_empty());

    assert_eq!(backend.remote.lock().await.get("docs/guide.md"), Some(&b"hello world".to_vec()));

    let saved = SyncManifest::load(&manifest_path).await.unwrap();
    assert!(saved.get("acme", "widgets", "docs/guide.md").is_some());
}
