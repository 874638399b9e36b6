use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::reference::ResolvedReference;
use crate::types::glob_matches;

use super::{content_type_for_path, FetchOptions, FetchResult, StorageProvider};

/// Claims references for the current project with archive configuration
/// enabled and a matching glob. Delegates the actual fetch to an external
/// helper process; read-only.
pub struct ArchiveProvider {
    priority: u32,
    helper_path: String,
    handler: String,
    bucket: Option<String>,
    prefix: String,
    patterns: Vec<String>,
}

impl ArchiveProvider {
    pub fn new(priority: u32, helper_path: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            priority,
            helper_path: helper_path.into(),
            handler: handler.into(),
            bucket: None,
            prefix: "archive/".to_string(),
            patterns: Vec::new(),
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.trim().is_empty() {
            return Err(Error::ConfigInvalid("archive prefix must be non-empty and non-whitespace".to_string()));
        }
        self.prefix = prefix;
        Ok(self)
    }

    pub fn with_patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    fn archive_type(path: &str) -> &'static str {
        match path.split('/').next().unwrap_or("") {
            "specs" => "specs",
            "docs" => "docs",
            "logs" => "logs",
            _ => "misc",
        }
    }

    fn archive_key(&self, resolved: &ResolvedReference) -> String {
        let path = resolved.reference.path();
        format!(
            "{}{}/{}/{}/{}",
            self.prefix,
            Self::archive_type(path),
            resolved.reference.org(),
            resolved.reference.project(),
            path,
        )
    }

    async fn run_helper(&self, key: &str, opts: &FetchOptions) -> Result<Vec<u8>> {
        let mut args: Vec<String> = vec![
            "file".to_string(),
            "read".to_string(),
            "--remote-path".to_string(),
            key.to_string(),
            "--handler".to_string(),
            self.handler.clone(),
        ];
        if let Some(bucket) = &self.bucket {
            args.push("--bucket".to_string());
            args.push(bucket.clone());
        }

        let output = tokio::time::timeout(opts.timeout, Command::new(&self.helper_path).args(&args).output())
            .await
            .map_err(|_| Error::Transport(format!("archive helper timed out for {key}")))?
            .map_err(|e| Error::Transport(format!("failed to spawn archive helper: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Transport(format!(
                "archive helper exited with {}: {stderr}",
                output.status
            )));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl StorageProvider for ArchiveProvider {
    fn name(&self) -> &str {
        "archive"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn can_handle(&self, resolved: &ResolvedReference) -> bool {
        resolved.is_current_project
            && !self.patterns.is_empty()
            && self.patterns.iter().any(|p| glob_matches(p, resolved.reference.path()))
    }

    async fn fetch(&self, resolved: &ResolvedReference, opts: &FetchOptions) -> Result<FetchResult> {
        let key = self.archive_key(resolved);
        let content = self.run_helper(&key, opts).await?;

        if content.len() as u64 > opts.max_size {
            return Err(Error::ContentTooLarge(format!("{} bytes for {key}", content.len())));
        }

        let content_type = content_type_for_path(resolved.reference.path());
        Ok(FetchResult::new(content, content_type, self.name()).with_metadata("archive_key", key))
    }

    /// Expensive: the helper contract has no `head`/`stat` capability, so
    /// existence is checked by a fetch-and-discard. Callers should avoid
    /// this in hot paths.
    async fn exists(&self, resolved: &ResolvedReference) -> Result<bool> {
        match self.fetch(resolved, &FetchOptions::default()).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) | Err(Error::Transport(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
