//! Storage provider fabric: a uniform fetch/exists contract over local
//! filesystem, version-controlled remotes, plain HTTP, and an S3-compatible
//! archive tier, with ordered fallback implemented as a trait object list
//! rather than an inheritance hierarchy.

mod archive;
mod http;
mod local;
mod vcs;

pub use archive::ArchiveProvider;
pub use http::HttpProvider;
pub use local::LocalProvider;
pub use vcs::VersionControlProvider;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::reference::ResolvedReference;

/// Options accepted by every provider's `fetch`/`exists` call.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Irrelevant to the provider itself; passed through for telemetry.
    pub bypass_cache: bool,
    pub timeout: Duration,
    pub max_size: u64,
    pub follow_redirects: bool,
    /// Applicable only to the version-control provider.
    pub branch: Option<String>,
    /// Overrides any provider-level credential.
    pub token: Option<String>,
    /// External cancellation signal. `None` means the fetch runs to
    /// completion or timeout with no external abort path.
    pub cancellation: Option<CancellationToken>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            bypass_cache: false,
            timeout: Duration::from_millis(30_000),
            max_size: 100 * 1024 * 1024,
            follow_redirects: true,
            branch: None,
            token: None,
            cancellation: None,
        }
    }
}

impl FetchOptions {
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Races `fut` against `token`, if any; returns `Error::Cancelled` on abort.
pub(crate) async fn run_cancellable<T>(
    token: Option<&CancellationToken>,
    label: &str,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match token {
        Some(token) => {
            tokio::select! {
                result = fut => result,
                _ = token.cancelled() => Err(Error::Cancelled(label.to_string())),
            }
        }
        None => fut.await,
    }
}

/// The immutable outcome of a successful provider fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub content: Vec<u8>,
    pub content_type: String,
    pub size: usize,
    pub source: String,
    pub provider_metadata: HashMap<String, String>,
}

impl FetchResult {
    pub fn new(content: Vec<u8>, content_type: impl Into<String>, source: impl Into<String>) -> Self {
        let size = content.len();
        Self {
            content,
            content_type: content_type.into(),
            size,
            source: source.into(),
            provider_metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.provider_metadata.insert(key.into(), value.into());
        self
    }
}

/// Shared capability set implemented by every storage backend.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Stable name recorded on a successful fetch result for telemetry.
    fn name(&self) -> &str;

    /// Lower wins; ties broken by registration order in the Storage Manager.
    fn priority(&self) -> u32;

    /// Whether this provider claims the given resolved reference.
    fn can_handle(&self, resolved: &ResolvedReference) -> bool;

    /// Fetch the reference's content. Callers must check `can_handle` first.
    async fn fetch(&self, resolved: &ResolvedReference, opts: &FetchOptions) -> Result<FetchResult>;

    /// Whether the reference exists, without necessarily fetching its content.
    async fn exists(&self, resolved: &ResolvedReference) -> Result<bool>;
}

pub(crate) fn content_type_for_path(path: &str) -> String {
    match path.rsplit('.').next() {
        Some("md") => "text/markdown",
        Some("json") => "application/json",
        Some("yaml") | Some("yml") => "application/yaml",
        Some("toml") => "application/toml",
        Some("txt") => "text/plain",
        Some("log") => "text/plain",
        _ => "application/octet-stream",
    }
    .to_string()
}
