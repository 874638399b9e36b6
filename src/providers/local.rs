use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::reference::{ResolvedReference, SourceType};

use super::{content_type_for_path, FetchOptions, FetchResult, StorageProvider};

/// Claims references whose resolved source type is `local` or `file-plugin`
/// and reads bytes directly off the local filesystem.
pub struct LocalProvider {
    priority: u32,
}

impl LocalProvider {
    pub fn new(priority: u32) -> Self {
        Self { priority }
    }
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn can_handle(&self, resolved: &ResolvedReference) -> bool {
        matches!(resolved.source_type, SourceType::Local | SourceType::FilePlugin)
    }

    async fn fetch(&self, resolved: &ResolvedReference, opts: &FetchOptions) -> Result<FetchResult> {
        let path = resolved
            .local_path()
            .ok_or_else(|| Error::NotFound(resolved.uri()))?;

        let content = tokio::fs::read(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::NotFound(resolved.uri()),
                _ => Error::Io(e.to_string()),
            })?;

        if content.len() as u64 > opts.max_size {
            return Err(Error::ContentTooLarge(format!(
                "{} bytes exceeds max_size {}",
                content.len(),
                opts.max_size
            )));
        }

        let content_type = content_type_for_path(resolved.reference.path());
        Ok(FetchResult::new(content, content_type, self.name()))
    }

    async fn exists(&self, resolved: &ResolvedReference) -> Result<bool> {
        let Some(path) = resolved.local_path() else {
            return Ok(false);
        };
        Ok(tokio::fs::metadata(path).await.is_ok())
    }
}
