//! Facade wiring the type registry, storage fabric, cache and sync engine
//! into a single entry point for callers.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::CacheManager;
use crate::config::CoreConfig;
use crate::error::Result;
use tokio_util::sync::CancellationToken;

use crate::providers::{ArchiveProvider, FetchOptions, FetchResult, HttpProvider, LocalProvider, VersionControlProvider};
use crate::reference::{Reference, ResolutionContext, ResolvedReference};
use crate::routing::{scan_repository_cancellable, RoutedFileInfo, ScanStats};
use crate::storage_manager::StorageManager;
use crate::sync::{SyncBackend, SyncExecutor};
use crate::types::TypeRegistry;

/// Top-level handle for resolving, caching and syncing `codex://` references.
///
/// Construct via [`CodexClientBuilder`]; cheap to clone (every field is an
/// `Arc`) so callers can share one instance across tasks.
#[derive(Clone)]
pub struct CodexClient {
    config: Arc<CoreConfig>,
    types: Arc<TypeRegistry>,
    storage: Arc<StorageManager>,
    cache: Arc<CacheManager>,
    context: Arc<ResolutionContext>,
}

impl CodexClient {
    pub fn builder() -> CodexClientBuilder {
        CodexClientBuilder::default()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Parse and resolve `uri`, then fetch it through the cache, falling
    /// through to the storage fabric on a miss.
    pub async fn get(&self, uri: &str, options: FetchOptions) -> Result<FetchResult> {
        let reference = Reference::parse(uri)?;
        let resolved = reference.resolve(&self.context);
        let ttl = self.types.lookup_ttl(resolved.reference.path());
        self.cache
            .get(&resolved, &options, Some(ttl), self.storage.clone(), self.types.clone())
            .await
    }

    pub fn resolve(&self, uri: &str) -> Result<ResolvedReference> {
        let reference = Reference::parse(uri)?;
        Ok(reference.resolve(&self.context))
    }

    pub async fn invalidate(&self, uri: &str) -> Result<bool> {
        let reference = Reference::parse(uri)?;
        self.cache.invalidate(&reference).await
    }

    /// Scan `repo_root` for files whose front matter routes them to
    /// `target_project`.
    pub async fn scan_routes(
        &self,
        repo_root: impl Into<PathBuf>,
        target_project: impl Into<String>,
    ) -> Result<(Vec<RoutedFileInfo>, ScanStats)> {
        self.scan_routes_cancellable(repo_root, target_project, None).await
    }

    /// Same as [`Self::scan_routes`], but abortable mid-traversal via `cancellation`.
    pub async fn scan_routes_cancellable(
        &self,
        repo_root: impl Into<PathBuf>,
        target_project: impl Into<String>,
        cancellation: Option<CancellationToken>,
    ) -> Result<(Vec<RoutedFileInfo>, ScanStats)> {
        scan_repository_cancellable(repo_root, target_project, self.config.cache.max_artifact_size, cancellation).await
    }

    /// Build a sync executor bound to this client's org/project and a
    /// caller-supplied backend (local filesystem + remote helper, or a
    /// test double).
    pub fn sync_executor(
        &self,
        backend: Arc<dyn SyncBackend>,
        manifest_path: impl Into<PathBuf>,
        org: impl Into<String>,
        project: impl Into<String>,
    ) -> SyncExecutor {
        SyncExecutor::new(backend, manifest_path, org, project)
    }
}

#[derive(Default)]
pub struct CodexClientBuilder {
    config: Option<CoreConfig>,
    context: Option<ResolutionContext>,
    types: Option<TypeRegistry>,
}

impl CodexClientBuilder {
    pub fn config(mut self, config: CoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn context(mut self, context: ResolutionContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn types(mut self, types: TypeRegistry) -> Self {
        self.types = Some(types);
        self
    }

    pub fn build(self) -> Result<CodexClient> {
        let config = self.config.unwrap_or_default();
        let types = self.types.unwrap_or_else(TypeRegistry::with_builtins);
        let context = self.context.unwrap_or_else(|| {
            ResolutionContext::new(
                config.cache.cache_dir.clone(),
                String::new(),
                String::new(),
                config.providers.workspace_root.clone(),
            )
        });

        let mut storage = StorageManager::new();
        storage.register(Box::new(LocalProvider::new(config.providers.local_priority)));

        if let Some(base_url) = &config.providers.version_control_base_url {
            let mut vcs = VersionControlProvider::new(config.providers.version_control_priority, base_url.clone(), "main");
            if let Some(api_url) = &config.providers.version_control_api_base_url {
                vcs = vcs.with_metadata_api(api_url.clone());
            }
            if let Some(token) = &config.providers.auth_token {
                vcs = vcs.with_token(token.clone());
            }
            storage.register(Box::new(vcs));
        }

        if let Some(helper_path) = &config.archive.helper_path {
            let mut archive = ArchiveProvider::new(
                config.providers.archive_priority,
                helper_path.to_string_lossy().to_string(),
                config.archive.handler.clone(),
            )
            .with_patterns(config.archive.patterns.clone())
            .with_prefix(config.archive.prefix.clone())?;
            if let Some(bucket) = &config.archive.bucket {
                archive = archive.with_bucket(bucket.clone());
            }
            storage.register(Box::new(archive));
        }

        if let Some(base_url) = &config.providers.http_base_url {
            let mut http = HttpProvider::new(config.providers.http_priority, base_url.clone());
            if let Some(token) = &config.providers.auth_token {
                http = http.with_token(token.clone());
            }
            storage.register(Box::new(http));
        }

        let cache = CacheManager::new(
            config.cache.cache_dir.clone(),
            config.cache.max_memory_entries,
            config.cache.max_memory_bytes,
        );

        Ok(CodexClient {
            config: Arc::new(config),
            types: Arc::new(types),
            storage: Arc::new(storage),
            cache: Arc::new(cache),
            context: Arc::new(context),
        })
    }
}
