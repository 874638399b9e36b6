//! Literal end-to-end scenarios from the reference/caching/routing
//! specification, exercised through the crate's public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codex_core::{
    CacheManager, FetchOptions, FetchResult, PlannerOptions, Reference, ResolutionContext,
    ResolvedReference, StorageManager, StorageProvider, TypeRegistry,
};

fn resolved_for(uri: &str) -> ResolvedReference {
    let reference = Reference::parse(uri).unwrap();
    let ctx = ResolutionContext::new("/cache", "other", "other", "/work");
    reference.resolve(&ctx)
}

#[test]
fn scenario_a_parse_round_trip() {
    let uri = "codex://acme/widgets/docs/guide.md";
    let parsed = Reference::parse(uri).unwrap();
    assert_eq!(parsed.org(), "acme");
    assert_eq!(parsed.project(), "widgets");
    assert_eq!(parsed.path(), "docs/guide.md");
    assert_eq!(parsed.to_uri(), uri);
}

#[tokio::test]
async fn scenario_b_cache_hit_after_set_makes_zero_provider_calls() {
    struct NeverCalled;

    #[async_trait]
    impl StorageProvider for NeverCalled {
        fn name(&self) -> &str {
            "never-called"
        }
        fn priority(&self) -> u32 {
            10
        }
        fn can_handle(&self, _resolved: &ResolvedReference) -> bool {
            true
        }
        async fn fetch(&self, _resolved: &ResolvedReference, _opts: &FetchOptions) -> codex_core::Result<FetchResult> {
            panic!("a cache hit must never reach the storage fabric");
        }
        async fn exists(&self, _resolved: &ResolvedReference) -> codex_core::Result<bool> {
            Ok(true)
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let manager = CacheManager::new(dir.path(), 512, 1024 * 1024);
    let resolved = resolved_for("codex://a/b/x.md");
    let set_result = FetchResult::new(b"hello".to_vec(), "text/markdown", "manual");
    manager.set(&resolved, &set_result, Some(3600)).await.unwrap();

    let mut storage_manager = StorageManager::new();
    storage_manager.register(Box::new(NeverCalled));
    let storage = Arc::new(storage_manager);
    let types = Arc::new(TypeRegistry::with_builtins());

    let fetched = manager.get(&resolved, &FetchOptions::default(), None, storage, types).await.unwrap();
    assert_eq!(fetched.content, b"hello");
    assert_eq!(fetched.size, 5);
}

#[tokio::test]
async fn scenario_c_stale_while_revalidate_single_flight() {
    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StorageProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }
        fn priority(&self) -> u32 {
            10
        }
        fn can_handle(&self, _resolved: &ResolvedReference) -> bool {
            true
        }
        async fn fetch(&self, _resolved: &ResolvedReference, _opts: &FetchOptions) -> codex_core::Result<FetchResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(FetchResult::new(b"refreshed".to_vec(), "text/markdown", "counting"))
        }
        async fn exists(&self, _resolved: &ResolvedReference) -> codex_core::Result<bool> {
            Ok(true)
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(CacheManager::new(dir.path(), 512, 1024 * 1024));
    let resolved = resolved_for("codex://a/b/stale.md");

    // A stale entry within the 5-minute stale window: expired 100s ago.
    let stale_result = FetchResult::new(b"stale-content".to_vec(), "text/markdown", "manual");
    manager.set(&resolved, &stale_result, Some(0)).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let mut storage_manager = StorageManager::new();
    storage_manager.register(Box::new(CountingProvider { calls: calls.clone() }));
    let storage = Arc::new(storage_manager);
    let types = Arc::new(TypeRegistry::with_builtins());

    let (a, b) = tokio::join!(
        manager.get(&resolved, &FetchOptions::default(), None, storage.clone(), types.clone()),
        manager.get(&resolved, &FetchOptions::default(), None, storage.clone(), types.clone()),
    );
    assert!(a.is_ok());
    assert!(b.is_ok());
    // The per-URI lock serializes the two calls: whichever observes the
    // entry as stale schedules exactly one refresh, and the other either
    // waits behind it or observes the now-fresh refreshed entry.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn scenario_e_exclude_overrides_include() {
    let metadata = codex_core::parse_front_matter(
        "---\ncodex_sync_include: [\"*\"]\ncodex_sync_exclude: [\"target-*\"]\n---\nbody",
    );
    assert!(!codex_core::should_sync_to(&metadata, "target-project"));
}

#[tokio::test]
async fn scenario_f_atomic_write_crash_injection() {
    let dir = tempfile::tempdir().unwrap();
    let manager = CacheManager::new(dir.path(), 512, 1024 * 1024);
    let resolved = resolved_for("codex://a/b/x.md");

    // Simulate a crash between the temp-file write and the rename: drop a
    // `.tmp` sibling at the documented content-path location without ever
    // calling `set`.
    let content_path = dir.path().join("a").join("b").join("x.md.cache.tmp");
    tokio::fs::create_dir_all(content_path.parent().unwrap()).await.unwrap();
    tokio::fs::write(&content_path, b"partial").await.unwrap();

    let mut storage_manager = StorageManager::new();
    struct AlwaysNotFound;
    #[async_trait]
    impl StorageProvider for AlwaysNotFound {
        fn name(&self) -> &str {
            "none"
        }
        fn priority(&self) -> u32 {
            10
        }
        fn can_handle(&self, _resolved: &ResolvedReference) -> bool {
            true
        }
        async fn fetch(&self, _resolved: &ResolvedReference, _opts: &FetchOptions) -> codex_core::Result<FetchResult> {
            Err(codex_core::Error::NotFound("nothing here".to_string()))
        }
        async fn exists(&self, _resolved: &ResolvedReference) -> codex_core::Result<bool> {
            Ok(false)
        }
    }
    storage_manager.register(Box::new(AlwaysNotFound));
    let storage = Arc::new(storage_manager);
    let types = Arc::new(TypeRegistry::with_builtins());

    let result = manager.get(&resolved, &FetchOptions::default(), None, storage, types).await;
    assert!(result.is_err());

    let stats = manager.get_stats().await.unwrap();
    assert_eq!(stats.entry_count, 0);

    let mut dir_entries = tokio::fs::read_dir(content_path.parent().unwrap()).await.unwrap();
    let mut only_the_tmp_we_planted = true;
    while let Some(entry) = dir_entries.next_entry().await.unwrap() {
        if entry.file_name() != "x.md.cache.tmp" {
            only_the_tmp_we_planted = false;
        }
    }
    assert!(only_the_tmp_we_planted, "no new orphan files should appear from a failed fetch");
}

#[test]
fn planner_defaults_use_newest_conflict_policy() {
    let options = PlannerOptions::default();
    assert!(matches!(options.conflict_policy, codex_core::ConflictPolicy::Newest));
}
