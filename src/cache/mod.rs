//! Two-tier cache: in-memory (L1) plus atomic on-disk persistence (L2).

pub mod entry;
pub mod manager;
pub mod persistence;

pub use entry::{content_hash, CacheEntry, CacheMetadata, EntryStatus, STALE_WINDOW};
pub use manager::CacheManager;
pub use persistence::{CacheStats, Persistence};
