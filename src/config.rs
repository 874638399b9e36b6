//! Plain configuration types handed in by the caller.
//!
//! This crate never reads a config file itself (config-file bootstrapping and
//! validation are the responsibility of the CLI front-end); these structs are
//! the already-validated shape that front-end hands to [`crate::client::CodexClient`].

use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for a [`crate::client::CodexClient`].
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub cache: CacheConfig,
    pub providers: ProviderConfig,
    pub archive: ArchiveConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            providers: ProviderConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

impl CoreConfig {
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_providers(mut self, providers: ProviderConfig) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_archive(mut self, archive: ArchiveConfig) -> Self {
        self.archive = archive;
        self
    }
}

/// Two-tier cache sizing and on-disk location.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory for the on-disk (L2) cache. Defaults to `.fractary/codex/cache`.
    pub cache_dir: PathBuf,
    /// Maximum number of entries held in the in-memory (L1) tier.
    pub max_memory_entries: usize,
    /// Maximum total bytes held in the in-memory (L1) tier.
    pub max_memory_bytes: u64,
    /// Window after which a fresh entry becomes stale but is still served
    /// while a background refresh runs. Fixed at 5 minutes per the resolver's
    /// staleness contract.
    pub stale_after: Duration,
    /// Maximum size of any single fetched artifact before `ContentTooLarge`.
    pub max_artifact_size: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".fractary/codex/cache"),
            max_memory_entries: 512,
            max_memory_bytes: 64 * 1024 * 1024,
            stale_after: Duration::from_secs(5 * 60),
            max_artifact_size: 10 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_max_memory_entries(mut self, n: usize) -> Self {
        self.max_memory_entries = n;
        self
    }

    pub fn with_max_memory_bytes(mut self, n: u64) -> Self {
        self.max_memory_bytes = n;
        self
    }
}

/// Per-provider enable/priority overrides. Lower priority numbers are tried first.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub local_priority: u32,
    pub archive_priority: u32,
    pub version_control_priority: u32,
    pub http_priority: u32,
    /// Local workspace root the local-filesystem provider resolves paths against.
    pub workspace_root: PathBuf,
    /// Base URL for the version-control remote provider's raw-content endpoint.
    pub version_control_base_url: Option<String>,
    /// Fallback metadata-API base URL used when raw-content fetch 404s.
    pub version_control_api_base_url: Option<String>,
    /// Bearer token for authenticated version-control/HTTP requests.
    pub auth_token: Option<String>,
    /// Base URL prefix the plain HTTP provider claims references under.
    /// The provider is only registered when this is set.
    pub http_base_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            local_priority: 10,
            archive_priority: 20,
            version_control_priority: 50,
            http_priority: 100,
            workspace_root: PathBuf::from("."),
            version_control_base_url: None,
            version_control_api_base_url: None,
            auth_token: None,
            http_base_url: None,
        }
    }
}

impl ProviderConfig {
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_http_base_url(mut self, url: impl Into<String>) -> Self {
        self.http_base_url = Some(url.into());
        self
    }
}

/// Archive provider's external subprocess helper contract.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Path to the helper binary invoked with array arguments (no shell).
    pub helper_path: Option<PathBuf>,
    /// Timeout for a single helper invocation.
    pub timeout: Duration,
    /// Storage backend the helper talks to: `s3`, `r2`, `gcs`, or `local`.
    pub handler: String,
    /// Optional bucket/container name passed through to the helper.
    pub bucket: Option<String>,
    /// Archive key prefix; must be non-empty and non-whitespace.
    pub prefix: String,
    /// Globs a path must match for the archive provider to claim it.
    /// Empty means the archive tier is disabled (the provider never claims).
    pub patterns: Vec<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            helper_path: None,
            timeout: Duration::from_secs(30),
            handler: "s3".to_string(),
            bucket: None,
            prefix: "archive/".to_string(),
            patterns: Vec::new(),
        }
    }
}

impl ArchiveConfig {
    pub fn with_helper_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.helper_path = Some(path.into());
        self
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = handler.into();
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_layout() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.cache.cache_dir, PathBuf::from(".fractary/codex/cache"));
        assert_eq!(cfg.cache.stale_after, Duration::from_secs(300));
        assert_eq!(cfg.providers.local_priority, 10);
        assert_eq!(cfg.providers.http_priority, 100);
    }

    #[test]
    fn builders_override_fields() {
        let cache = CacheConfig::default().with_cache_dir("/tmp/codex-cache");
        assert_eq!(cache.cache_dir, PathBuf::from("/tmp/codex-cache"));
    }
}
