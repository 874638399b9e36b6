//! Two-tier (L1 memory + L2 disk) cache manager: LRU eviction,
//! stale-while-revalidate with single-flight background refresh, and
//! pattern-based invalidation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::cache::entry::CacheEntry;
use crate::cache::persistence::Persistence;
use crate::error::{Error, Result};
use crate::providers::{FetchOptions, FetchResult};
use crate::reference::ResolvedReference;
use crate::storage_manager::StorageManager;
use crate::types::TypeRegistry;

struct L1Store {
    entries: HashMap<String, CacheEntry>,
    /// Least-recently-used at the front, most-recently-used at the back.
    order: Vec<String>,
    total_bytes: u64,
}

impl L1Store {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            total_bytes: 0,
        }
    }

    fn touch(&mut self, uri: &str) {
        if let Some(pos) = self.order.iter().position(|u| u == uri) {
            let u = self.order.remove(pos);
            self.order.push(u);
        }
    }

    fn insert(&mut self, uri: String, entry: CacheEntry, max_entries: usize, max_bytes: u64) {
        if let Some(existing) = self.entries.remove(&uri) {
            self.total_bytes -= existing.memory_footprint();
            self.order.retain(|u| u != &uri);
        }
        self.total_bytes += entry.memory_footprint();
        self.order.push(uri.clone());
        self.entries.insert(uri, entry);
        self.evict_to_bounds(max_entries, max_bytes);
    }

    fn evict_to_bounds(&mut self, max_entries: usize, max_bytes: u64) {
        while self.entries.len() > max_entries || self.total_bytes > max_bytes {
            if self.order.is_empty() {
                break;
            }
            let victim = self.order.remove(0);
            if let Some(removed) = self.entries.remove(&victim) {
                self.total_bytes -= removed.memory_footprint();
            }
        }
    }

    fn remove(&mut self, uri: &str) -> bool {
        self.order.retain(|u| u != uri);
        if let Some(removed) = self.entries.remove(uri) {
            self.total_bytes -= removed.memory_footprint();
            true
        } else {
            false
        }
    }
}

/// Per-URI fine-grained lock registry: insertion into the registry is
/// itself mutex-protected, but the registry mutex is never held while the
/// per-URI lock is.
struct UriLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UriLocks {
    fn new() -> Self {
        Self { locks: Mutex::new(HashMap::new()) }
    }

    async fn lock_for(&self, uri: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(uri.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

/// Two-tier cache sitting in front of the [`StorageManager`].
pub struct CacheManager {
    l1: Arc<RwLock<L1Store>>,
    persistence: Arc<Persistence>,
    uri_locks: UriLocks,
    refreshing: Arc<Mutex<HashSet<String>>>,
    max_memory_entries: usize,
    max_memory_bytes: u64,
    default_ttl_secs: u64,
    stale_while_revalidate: bool,
}

impl CacheManager {
    pub fn new(cache_root: impl Into<std::path::PathBuf>, max_memory_entries: usize, max_memory_bytes: u64) -> Self {
        Self {
            l1: Arc::new(RwLock::new(L1Store::new())),
            persistence: Arc::new(Persistence::new(cache_root)),
            uri_locks: UriLocks::new(),
            refreshing: Arc::new(Mutex::new(HashSet::new())),
            max_memory_entries,
            max_memory_bytes,
            default_ttl_secs: 60 * 60,
            stale_while_revalidate: true,
        }
    }

    pub fn with_stale_while_revalidate(mut self, enabled: bool) -> Self {
        self.stale_while_revalidate = enabled;
        self
    }

    /// Resolve the TTL used for a fresh fetch: caller override, then the
    /// type registry's lookup for the path, then the manager default.
    fn resolve_ttl(&self, path: &str, override_ttl: Option<u64>, types: &TypeRegistry) -> u64 {
        override_ttl.unwrap_or_else(|| {
            let ttl = types.lookup_ttl(path);
            if ttl == 0 { self.default_ttl_secs } else { ttl }
        })
    }

    /// Contractual `get` algorithm: L1 hit, L2 promotion, stale-while-revalidate,
    /// or a foreground fetch through the storage manager.
    pub async fn get(
        &self,
        resolved: &ResolvedReference,
        opts: &FetchOptions,
        ttl_override: Option<u64>,
        storage: Arc<StorageManager>,
        types: Arc<TypeRegistry>,
    ) -> Result<FetchResult> {
        let uri = resolved.uri();
        let lock = self.uri_locks.lock_for(&uri).await;
        let guard = lock.lock().await;

        if let Some(entry) = self.l1_lookup(&uri).await {
            return self.handle_found(&uri, entry, resolved.clone(), opts.clone(), storage, types, guard).await;
        }

        if let Some(entry) = self.persistence.read(&resolved.reference).await? {
            self.promote_to_l1(uri.clone(), entry.clone()).await;
            return self.handle_found(&uri, entry, resolved.clone(), opts.clone(), storage, types, guard).await;
        }

        drop(guard);
        self.fetch_and_store(resolved, opts, ttl_override, storage, types).await
    }

    async fn l1_lookup(&self, uri: &str) -> Option<CacheEntry> {
        let l1 = self.l1.read().await;
        l1.entries.get(uri).cloned()
    }

    async fn promote_to_l1(&self, uri: String, entry: CacheEntry) {
        let mut l1 = self.l1.write().await;
        l1.insert(uri, entry, self.max_memory_entries, self.max_memory_bytes);
    }

    async fn handle_found<'a>(
        &self,
        uri: &str,
        entry: CacheEntry,
        resolved: ResolvedReference,
        opts: FetchOptions,
        storage: Arc<StorageManager>,
        types: Arc<TypeRegistry>,
        guard: tokio::sync::MutexGuard<'a, ()>,
    ) -> Result<FetchResult> {
        use crate::cache::entry::EntryStatus;

        match entry.metadata.status() {
            EntryStatus::Fresh => {
                let mut l1 = self.l1.write().await;
                l1.touch(uri);
                if let Some(e) = l1.entries.get_mut(uri) {
                    e.metadata.touch();
                }
                drop(guard);
                Ok(entry.as_fetch_result())
            }
            EntryStatus::Stale if self.stale_while_revalidate => {
                // Dropped before scheduling: the refresh must not hold the
                // per-URI lock, and the stale content is returned immediately.
                drop(guard);
                self.schedule_refresh(uri.to_string(), resolved, opts, storage, types).await;
                Ok(entry.as_fetch_result())
            }
            EntryStatus::Stale | EntryStatus::Expired => {
                let result = self.fetch_and_store(&resolved, &opts, None, storage, types).await;
                drop(guard);
                result
            }
        }
    }

    /// Checks (and claims) the single-flight marker, then spawns the actual
    /// refresh on the ambient runtime so this returns without waiting on the
    /// network. The per-URI lock is never held here; callers must drop it
    /// before invoking this.
    async fn schedule_refresh(
        &self,
        uri: String,
        resolved: ResolvedReference,
        opts: FetchOptions,
        storage: Arc<StorageManager>,
        types: Arc<TypeRegistry>,
    ) {
        let already_running = {
            let mut refreshing = self.refreshing.lock().await;
            if refreshing.contains(&uri) {
                true
            } else {
                refreshing.insert(uri.clone());
                false
            }
        };
        if already_running {
            return;
        }

        debug!(uri = %uri, "scheduling stale-while-revalidate background refresh");

        let ttl = self.resolve_ttl(resolved.reference.path(), None, &types);
        let l1 = self.l1.clone();
        let persistence = self.persistence.clone();
        let refreshing = self.refreshing.clone();
        let max_memory_entries = self.max_memory_entries;
        let max_memory_bytes = self.max_memory_bytes;

        tokio::spawn(async move {
            let fetch_result = storage.fetch(&resolved, &opts).await;

            match fetch_result {
                Ok(result) => {
                    let entry = CacheEntry::from_fetch_result(uri.clone(), &result, ttl);
                    if let Err(e) = persistence.write(&resolved.reference, &entry).await {
                        warn!(uri = %uri, error = %e, "background refresh failed to persist");
                    }
                    let mut l1 = l1.write().await;
                    l1.insert(uri.clone(), entry, max_memory_entries, max_memory_bytes);
                }
                Err(e) => {
                    // Background refresh errors are silently dropped; the stale
                    // entry remains available until it expires naturally.
                    debug!(uri = %uri, error = %e, "background refresh failed, keeping stale entry");
                }
            }

            refreshing.lock().await.remove(&uri);
        });
    }

    async fn fetch_and_store(
        &self,
        resolved: &ResolvedReference,
        opts: &FetchOptions,
        ttl_override: Option<u64>,
        storage: Arc<StorageManager>,
        types: Arc<TypeRegistry>,
    ) -> Result<FetchResult> {
        let result = storage.fetch(resolved, opts).await?;
        let ttl = self.resolve_ttl(resolved.reference.path(), ttl_override, &types);
        self.set(resolved, &result, Some(ttl)).await?;
        Ok(result)
    }

    /// Builds a fresh entry and stores it unconditionally in both tiers.
    pub async fn set(&self, resolved: &ResolvedReference, result: &FetchResult, ttl: Option<u64>) -> Result<()> {
        let uri = resolved.uri();
        let ttl_secs = ttl.unwrap_or(self.default_ttl_secs);
        let entry = CacheEntry::from_fetch_result(uri.clone(), result, ttl_secs);

        self.persistence.write(&resolved.reference, &entry).await?;

        let mut l1 = self.l1.write().await;
        l1.insert(uri, entry, self.max_memory_entries, self.max_memory_bytes);
        Ok(())
    }

    /// Removes both tiers; returns true iff anything was removed.
    pub async fn invalidate(&self, reference: &crate::reference::Reference) -> Result<bool> {
        let uri = reference.to_uri();
        let removed_l1 = {
            let mut l1 = self.l1.write().await;
            l1.remove(&uri)
        };
        let removed_l2 = self.persistence.remove(reference).await?;
        Ok(removed_l1 || removed_l2)
    }

    /// Iterates L1 keys and L2 listings, removing URIs matching `pattern`;
    /// returns the count removed.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let regex = Regex::new(pattern).map_err(|e| Error::ConfigInvalid(format!("invalid regex: {e}")))?;
        let mut matched: HashSet<String> = {
            let l1 = self.l1.read().await;
            l1.entries.keys().filter(|u| regex.is_match(u)).cloned().collect()
        };
        for uri in self.persistence.list().await? {
            if regex.is_match(&uri) {
                matched.insert(uri);
            }
        }

        let mut removed = 0;
        for uri in matched {
            let Ok(reference) = crate::reference::Reference::parse(&uri) else { continue };
            if self.invalidate(&reference).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn get_stats(&self) -> Result<crate::cache::persistence::CacheStats> {
        self.persistence.get_stats().await
    }

    pub async fn clear_expired(&self) -> Result<usize> {
        self.persistence.clear_expired().await
    }
}
