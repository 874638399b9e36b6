//! On-disk metadata/content pair with atomic writes, grounded on the
//! temp-file-then-rename pattern used for completion-signal writes.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::cache::entry::{CacheEntry, CacheMetadata, EntryStatus};
use crate::error::{Error, Result};
use crate::reference::Reference;

/// Aggregate counts returned by [`Persistence::get_stats`].
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_bytes: u64,
    pub fresh_count: usize,
    pub stale_count: usize,
    pub expired_count: usize,
}

/// Owns the on-disk cache root and performs atomic metadata/content writes.
pub struct Persistence {
    root: PathBuf,
}

impl Persistence {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn content_path(&self, reference: &Reference) -> PathBuf {
        self.root
            .join(reference.org())
            .join(reference.project())
            .join(format!("{}.cache", reference.path()))
    }

    fn metadata_path(&self, reference: &Reference) -> PathBuf {
        self.root
            .join(reference.org())
            .join(reference.project())
            .join(format!("{}.meta.json", reference.path()))
    }

    /// A content-file stat suffices; metadata is never parsed here.
    pub async fn exists(&self, reference: &Reference) -> bool {
        fs::metadata(self.content_path(reference)).await.is_ok()
    }

    /// Write the metadata/content pair atomically: write to sibling `.tmp`
    /// files, then rename both into place. On any failure, both temp files
    /// are removed so no partial pair is ever observable.
    pub async fn write(&self, reference: &Reference, entry: &CacheEntry) -> Result<()> {
        let content_path = self.content_path(reference);
        let metadata_path = self.metadata_path(reference);
        if let Some(dir) = content_path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let content_tmp = tmp_path(&content_path);
        let metadata_tmp = tmp_path(&metadata_path);

        let result = self
            .write_pair(&content_tmp, &metadata_tmp, entry)
            .await;

        match result {
            Ok(()) => {
                fs::rename(&content_tmp, &content_path).await?;
                if let Err(e) = fs::rename(&metadata_tmp, &metadata_path).await {
                    let _ = fs::remove_file(&content_path).await;
                    return Err(Error::from(e));
                }
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&content_tmp).await;
                let _ = fs::remove_file(&metadata_tmp).await;
                Err(e)
            }
        }
    }

    async fn write_pair(&self, content_tmp: &Path, metadata_tmp: &Path, entry: &CacheEntry) -> Result<()> {
        fs::write(content_tmp, &entry.content).await?;
        let json = serde_json::to_string_pretty(&entry.metadata)?;
        fs::write(metadata_tmp, json).await?;
        Ok(())
    }

    /// Load both files together. Either missing, or the metadata file
    /// unparseable, means the entry is treated as absent rather than
    /// returning a partially-reconstructed entry.
    pub async fn read(&self, reference: &Reference) -> Result<Option<CacheEntry>> {
        let content_path = self.content_path(reference);
        let metadata_path = self.metadata_path(reference);

        let content = match fs::read(&content_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::from(e)),
        };

        let metadata_bytes = match fs::read(&metadata_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::from(e)),
        };

        let metadata: CacheMetadata = match serde_json::from_slice(&metadata_bytes) {
            Ok(m) => m,
            Err(_) => return Ok(None),
        };

        Ok(Some(CacheEntry { metadata, content }))
    }

    pub async fn remove(&self, reference: &Reference) -> Result<bool> {
        let content_path = self.content_path(reference);
        let metadata_path = self.metadata_path(reference);
        let had_content = fs::remove_file(&content_path).await.is_ok();
        let had_metadata = fs::remove_file(&metadata_path).await.is_ok();
        Ok(had_content || had_metadata)
    }

    /// Walk `<root>/<org>/<project>/` subtrees and yield each content file's
    /// corresponding URI.
    pub async fn list(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let mut uris = Vec::new();
            if !root.exists() {
                return uris;
            }
            for entry in walkdir::WalkDir::new(&root).into_iter().filter_map(std::result::Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !name.ends_with(".cache") {
                    continue;
                }
                if let Some(uri) = uri_from_content_path(&root, path) {
                    uris.push(uri);
                }
            }
            uris
        })
        .await
        .map_err(|e| Error::Io(e.to_string()))
    }

    pub async fn clear_expired(&self) -> Result<usize> {
        let mut removed = 0;
        for uri in self.list().await? {
            let Ok(reference) = Reference::parse(&uri) else { continue };
            if let Some(entry) = self.read(&reference).await? {
                if entry.metadata.status() == EntryStatus::Expired {
                    self.remove(&reference).await?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    pub async fn get_stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for uri in self.list().await? {
            let Ok(reference) = Reference::parse(&uri) else { continue };
            if let Some(entry) = self.read(&reference).await? {
                stats.entry_count += 1;
                stats.total_bytes += entry.content.len() as u64;
                match entry.metadata.status() {
                    EntryStatus::Fresh => stats.fresh_count += 1,
                    EntryStatus::Stale => stats.stale_count += 1,
                    EntryStatus::Expired => stats.expired_count += 1,
                }
            }
        }
        Ok(stats)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

fn uri_from_content_path(root: &Path, content_path: &Path) -> Option<String> {
    let rel = content_path.strip_prefix(root).ok()?;
    let rel_str = rel.to_str()?.strip_suffix(".cache")?;
    let mut components = rel_str.splitn(3, std::path::MAIN_SEPARATOR);
    let org = components.next()?;
    let project = components.next()?;
    let path = components.next().unwrap_or("");
    Some(format!("codex://{org}/{project}/{path}"))
}
