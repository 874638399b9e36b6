//! Repository traversal: discover candidate files, parse their routing
//! metadata, and evaluate them against a target project.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::WalkDir;

use crate::cache::entry::content_hash;
use crate::error::{Error, Result};
use crate::metadata::{parse_front_matter, FileMetadata};
use crate::routing::evaluator::should_sync_to;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Transient scanner output for one routed file.
#[derive(Debug, Clone)]
pub struct RoutedFileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub hash: String,
    pub modified_time: SystemTime,
    pub metadata: FileMetadata,
    pub source_project: String,
}

/// Aggregate statistics for one scan pass.
#[derive(Debug, Clone)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub files_matched: usize,
    pub source_projects: HashSet<String>,
    pub duration: Duration,
}

fn is_skipped_dir(name: &str) -> bool {
    name.starts_with('.') || name == "node_modules"
}

fn is_markdown(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("md") | Some("markdown"))
}

/// Traverse `root` (expected to contain `<org>/<project>/...` directories),
/// routing each eligible file against `target_project`. Self-sync (a file
/// whose source project equals the target) is always skipped.
///
/// `cancellation`, if given, is polled between directory entries; a scan of
/// a very large tree can be aborted without waiting for it to finish.
pub async fn scan_repository(
    root: impl Into<PathBuf>,
    target_project: impl Into<String>,
    max_file_size: u64,
) -> Result<(Vec<RoutedFileInfo>, ScanStats)> {
    scan_repository_cancellable(root, target_project, max_file_size, None).await
}

pub async fn scan_repository_cancellable(
    root: impl Into<PathBuf>,
    target_project: impl Into<String>,
    max_file_size: u64,
    cancellation: Option<CancellationToken>,
) -> Result<(Vec<RoutedFileInfo>, ScanStats)> {
    let root = root.into();
    let target_project = target_project.into();

    tokio::task::spawn_blocking(move || scan_repository_blocking(&root, &target_project, max_file_size, cancellation.as_ref()))
        .await
        .map_err(|e| Error::Io(e.to_string()))?
}

fn scan_repository_blocking(
    root: &Path,
    target_project: &str,
    max_file_size: u64,
    cancellation: Option<&CancellationToken>,
) -> Result<(Vec<RoutedFileInfo>, ScanStats)> {
    let start = Instant::now();
    let mut routed = Vec::new();
    let mut files_scanned = 0usize;
    let mut source_projects = HashSet::new();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.file_type().is_dir() {
            entry
                .file_name()
                .to_str()
                .map(|n| entry.depth() == 0 || !is_skipped_dir(n))
                .unwrap_or(true)
        } else {
            true
        }
    });

    for entry in walker {
        if cancellation.is_some_and(|t| t.is_cancelled()) {
            return Err(Error::Cancelled(format!("scan of {} for {target_project}", root.display())));
        }

        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(rel) = entry.path().strip_prefix(root) else { continue };
        let mut components = rel.components();
        let Some(_org) = components.next() else { continue };
        let Some(source_project_component) = components.next() else { continue };
        let source_project = source_project_component.as_os_str().to_string_lossy().to_string();

        if !is_markdown(entry.path()) {
            continue;
        }

        files_scanned += 1;

        let Ok(fs_metadata) = entry.metadata() else { continue };
        if fs_metadata.len() > max_file_size {
            continue;
        }

        if source_project == target_project {
            // prevent-self-sync: never route a file back into its own project.
            continue;
        }

        let Ok(content) = std::fs::read_to_string(entry.path()) else { continue };
        let file_metadata = parse_front_matter(&content);

        if !should_sync_to(&file_metadata, target_project) {
            continue;
        }

        source_projects.insert(source_project.clone());
        routed.push(RoutedFileInfo {
            path: rel.to_path_buf(),
            size: fs_metadata.len(),
            hash: content_hash(content.as_bytes()),
            modified_time: fs_metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            metadata: file_metadata,
            source_project,
        });
    }

    let files_matched = routed.len();
    let duration = start.elapsed();
    debug!(target_project, files_scanned, files_matched, ?duration, "routing scan complete");
    Ok((
        routed,
        ScanStats {
            files_scanned,
            files_matched,
            source_projects,
            duration,
        },
    ))
}
