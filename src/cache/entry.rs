//! Cache entry data model: a (metadata, content) pair with a derived status.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::providers::FetchResult;

/// Window after which a fresh entry becomes stale but is still served while
/// a background refresh runs.
pub const STALE_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Digest used as the cache entry's content hash: the first 8 hex characters
/// of the content's SHA-256 digest.
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let full = hex::encode(hasher.finalize());
    full[..8].to_string()
}

/// Persisted, human-readable metadata for one cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub uri: String,
    #[serde(rename = "cachedAt")]
    pub cached_at: DateTime<Utc>,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
    pub ttl: u64,
    #[serde(rename = "contentHash")]
    pub content_hash: String,
    pub size: usize,
    #[serde(rename = "contentType")]
    pub content_type: String,
    pub source: String,
    #[serde(rename = "accessCount")]
    pub access_count: u64,
    #[serde(rename = "lastAccessedAt")]
    pub last_accessed_at: DateTime<Utc>,
    #[serde(rename = "providerMetadata", skip_serializing_if = "HashMap::is_empty", default)]
    pub provider_metadata: HashMap<String, String>,
}

/// Derived, never-stored freshness classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Fresh,
    Stale,
    Expired,
}

impl CacheMetadata {
    pub fn status_at(&self, now: DateTime<Utc>) -> EntryStatus {
        if now < self.expires_at {
            EntryStatus::Fresh
        } else if now < self.expires_at + chrono::Duration::from_std(STALE_WINDOW).unwrap() {
            EntryStatus::Stale
        } else {
            EntryStatus::Expired
        }
    }

    pub fn status(&self) -> EntryStatus {
        self.status_at(Utc::now())
    }

    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed_at = Utc::now();
    }
}

/// A cache entry: its metadata alongside the raw content bytes.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub metadata: CacheMetadata,
    pub content: Vec<u8>,
}

impl CacheEntry {
    /// Build a fresh entry from a fetch result, stamping `cachedAt`/`expiresAt`
    /// from the given TTL.
    pub fn from_fetch_result(uri: impl Into<String>, result: &FetchResult, ttl_secs: u64) -> Self {
        let now = Utc::now();
        let hash = content_hash(&result.content);
        Self {
            metadata: CacheMetadata {
                uri: uri.into(),
                cached_at: now,
                expires_at: now + chrono::Duration::seconds(ttl_secs as i64),
                ttl: ttl_secs,
                content_hash: hash,
                size: result.content.len(),
                content_type: result.content_type.clone(),
                source: result.source.clone(),
                access_count: 0,
                last_accessed_at: now,
                provider_metadata: result.provider_metadata.clone(),
            },
            content: result.content.clone(),
        }
    }

    pub fn as_fetch_result(&self) -> FetchResult {
        FetchResult {
            content: self.content.clone(),
            content_type: self.metadata.content_type.clone(),
            size: self.metadata.size,
            source: self.metadata.source.clone(),
            provider_metadata: self.metadata.provider_metadata.clone(),
        }
    }

    pub fn memory_footprint(&self) -> u64 {
        self.content.len() as u64
    }
}
