//! Ordered provider selection with failover.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::providers::{run_cancellable, FetchOptions, FetchResult, StorageProvider};
use crate::reference::ResolvedReference;

/// Holds the registered providers sorted by ascending priority (ties broken
/// by registration order) and iterates them on each fetch.
pub struct StorageManager {
    providers: Vec<Box<dyn StorageProvider>>,
}

impl StorageManager {
    pub fn new() -> Self {
        Self { providers: Vec::new() }
    }

    /// Register a provider. Providers are kept in a stable sort by
    /// `priority()`, which preserves relative registration order among
    /// equal priorities.
    pub fn register(&mut self, provider: Box<dyn StorageProvider>) {
        self.providers.push(provider);
        self.providers.sort_by_key(|p| p.priority());
    }

    /// Iterate claiming providers in priority order; fall through to the
    /// next on `NotFound`/`Transport`, fail fast on `Unauthorized` or
    /// `ContentTooLarge`, and fail with `NoProvider` if none claims it.
    pub async fn fetch(&self, resolved: &ResolvedReference, opts: &FetchOptions) -> Result<FetchResult> {
        let mut claimed_any = false;
        for provider in &self.providers {
            if !provider.can_handle(resolved) {
                continue;
            }
            claimed_any = true;
            debug!(uri = %resolved.uri(), provider = provider.name(), "attempting fetch");
            let fetch = provider.fetch(resolved, opts);
            match run_cancellable(opts.cancellation.as_ref(), &resolved.uri(), fetch).await {
                Ok(mut result) => {
                    result.source = provider.name().to_string();
                    return Ok(result);
                }
                Err(e @ (Error::NotFound(_) | Error::Transport(_))) => {
                    warn!(uri = %resolved.uri(), provider = provider.name(), error = %e, "provider failed, falling through");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        if claimed_any {
            Err(Error::NotFound(resolved.uri()))
        } else {
            Err(Error::NoProvider(resolved.uri()))
        }
    }

    /// Returns false as soon as any claiming provider reports absence, and
    /// true on the first positive. Does not fall through on `NotFound`.
    pub async fn exists(&self, resolved: &ResolvedReference) -> Result<bool> {
        for provider in &self.providers {
            if !provider.can_handle(resolved) {
                continue;
            }
            if provider.exists(resolved).await? {
                return Ok(true);
            }
            return Ok(false);
        }
        Ok(false)
    }
}

impl Default for StorageManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubProvider {
        name: &'static str,
        priority: u32,
        claims: bool,
        result: std::result::Result<FetchResult, Error>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StorageProvider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> u32 {
            self.priority
        }

        fn can_handle(&self, _resolved: &ResolvedReference) -> bool {
            self.claims
        }

        async fn fetch(&self, _resolved: &ResolvedReference, _opts: &FetchOptions) -> Result<FetchResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }

        async fn exists(&self, _resolved: &ResolvedReference) -> Result<bool> {
            Ok(self.claims)
        }
    }

    fn dummy_resolved() -> ResolvedReference {
        use crate::reference::{Reference, ResolutionContext};
        let reference = Reference::parse("codex://acme/widgets/x.md").unwrap();
        let ctx = ResolutionContext::new("/cache", "other", "other", "/work");
        reference.resolve(&ctx)
    }

    #[tokio::test]
    async fn falls_through_on_not_found() {
        let mut mgr = StorageManager::new();
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));

        mgr.register(Box::new(StubProvider {
            name: "a",
            priority: 10,
            claims: true,
            result: Err(Error::NotFound("x".to_string())),
            calls: calls_a.clone(),
        }));
        mgr.register(Box::new(StubProvider {
            name: "b",
            priority: 20,
            claims: true,
            result: Ok(FetchResult::new(b"hi".to_vec(), "text/plain", "b")),
            calls: calls_b.clone(),
        }));

        let resolved = dummy_resolved();
        let result = mgr.fetch(&resolved, &FetchOptions::default()).await.unwrap();
        assert_eq!(result.source, "b");
        assert_eq!(calls_a.load(Ordering::SeqCst), 1);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fails_fast_on_unauthorized() {
        let mut mgr = StorageManager::new();
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));

        mgr.register(Box::new(StubProvider {
            name: "a",
            priority: 10,
            claims: true,
            result: Err(Error::Unauthorized("x".to_string())),
            calls: calls_a.clone(),
        }));
        mgr.register(Box::new(StubProvider {
            name: "b",
            priority: 20,
            claims: true,
            result: Ok(FetchResult::new(b"hi".to_vec(), "text/plain", "b")),
            calls: calls_b.clone(),
        }));

        let resolved = dummy_resolved();
        let err = mgr.fetch(&resolved, &FetchOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
        assert_eq!(calls_b.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_provider_when_nothing_claims() {
        let mgr = StorageManager::new();
        let resolved = dummy_resolved();
        let err = mgr.fetch(&resolved, &FetchOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::NoProvider(_)));
    }
}
