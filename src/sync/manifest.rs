//! Durable sync manifest: last-known content state between a working tree
//! and the shared repository, used to compute minimal sync plans.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    ToShared,
    FromShared,
}

/// One manifest record, keyed by `(org, project, local-relative-path)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub hash: String,
    pub size: u64,
    #[serde(rename = "lastSyncedAt")]
    pub last_synced_at: DateTime<Utc>,
    pub direction: SyncDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestRecord {
    path: String,
    hash: String,
    size: u64,
    #[serde(rename = "lastSyncedAt")]
    last_synced_at: DateTime<Utc>,
    direction: SyncDirection,
}

/// Keyed by `org/project/path` so the on-disk array stays sorted and diffs
/// between runs stay small.
#[derive(Debug, Clone, Default)]
pub struct SyncManifest {
    entries: BTreeMap<String, ManifestEntry>,
}

fn key(org: &str, project: &str, path: &str) -> String {
    format!("{org}/{project}/{path}")
}

impl SyncManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, org: &str, project: &str, path: &str) -> Option<&ManifestEntry> {
        self.entries.get(&key(org, project, path))
    }

    pub fn set(&mut self, org: &str, project: &str, path: &str, entry: ManifestEntry) {
        self.entries.insert(key(org, project, path), entry);
    }

    pub fn remove(&mut self, org: &str, project: &str, path: &str) {
        self.entries.remove(&key(org, project, path));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Default manifest path: `<working-dir>/.fractary/.codex-sync-manifest.json`.
    pub fn default_path(working_dir: impl AsRef<Path>) -> PathBuf {
        working_dir.as_ref().join(".fractary").join(".codex-sync-manifest.json")
    }

    /// Load the manifest at `path`, or an empty manifest if it does not exist.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = match fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(Error::from(e)),
        };
        let records: Vec<ManifestRecord> = serde_json::from_slice(&bytes)?;
        let mut entries = BTreeMap::new();
        for record in records {
            entries.insert(
                record.path,
                ManifestEntry {
                    hash: record.hash,
                    size: record.size,
                    last_synced_at: record.last_synced_at,
                    direction: record.direction,
                },
            );
        }
        Ok(Self { entries })
    }

    /// Write the manifest atomically: temp file + rename, never partially
    /// updated. Records are emitted sorted by key for small diffs.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let records: Vec<ManifestRecord> = self
            .entries
            .iter()
            .map(|(path, entry)| ManifestRecord {
                path: path.clone(),
                hash: entry.hash.clone(),
                size: entry.size,
                last_synced_at: entry.last_synced_at,
                direction: entry.direction,
            })
            .collect();

        let json = serde_json::to_string_pretty(&records)?;
        let tmp = tmp_path(path);
        let write_result = fs::write(&tmp, json).await;
        match write_result {
            Ok(()) => {
                fs::rename(&tmp, path).await?;
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                Err(Error::from(e))
            }
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".fractary").join(".codex-sync-manifest.json");

        let mut manifest = SyncManifest::new();
        manifest.set(
            "acme",
            "widgets",
            "docs/guide.md",
            ManifestEntry {
                hash: "abcd1234".to_string(),
                size: 42,
                last_synced_at: Utc::now(),
                direction: SyncDirection::ToShared,
            },
        );
        manifest.save(&path).await.unwrap();

        let loaded = SyncManifest::load(&path).await.unwrap();
        assert_eq!(loaded.len(), 1);
        let entry = loaded.get("acme", "widgets", "docs/guide.md").unwrap();
        assert_eq!(entry.hash, "abcd1234");
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let manifest = SyncManifest::load(&path).await.unwrap();
        assert!(manifest.is_empty());
    }
}
