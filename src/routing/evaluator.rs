//! Decide whether a file routes to a given target project.

use crate::metadata::FileMetadata;
use crate::types::glob_matches;

/// A file routes to `target_project` iff its include list is non-empty, at
/// least one include glob matches the target, and no exclude glob matches
/// it. Absence (or emptiness) of `codex_sync_include` is the safe default:
/// do not route anywhere.
///
/// `**` is equivalent to `*` here since project names never contain `/`.
pub fn should_sync_to(metadata: &FileMetadata, target_project: &str) -> bool {
    if metadata.include.is_empty() {
        return false;
    }

    let included = metadata.include.iter().any(|pattern| glob_matches(pattern, target_project));
    if !included {
        return false;
    }

    !metadata.exclude.iter().any(|pattern| glob_matches(pattern, target_project))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(include: &[&str], exclude: &[&str]) -> FileMetadata {
        FileMetadata {
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_include_never_routes() {
        assert!(!should_sync_to(&meta(&[], &[]), "target-project"));
    }

    #[test]
    fn wildcard_include_matches_any_target() {
        assert!(should_sync_to(&meta(&["*"], &[]), "target-project"));
    }

    #[test]
    fn exclude_overrides_include() {
        assert!(!should_sync_to(&meta(&["*"], &["target-*"]), "target-project"));
    }

    #[test]
    fn specific_include_pattern() {
        assert!(should_sync_to(&meta(&["target-*"], &[]), "target-project"));
        assert!(!should_sync_to(&meta(&["target-*"], &[]), "other-project"));
    }
}
