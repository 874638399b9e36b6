//! Artifact type classification: maps a path to a type and a default TTL.

use globset::{GlobBuilder, GlobMatcher};

use crate::error::{Error, Result};

/// Compile one glob pattern with the shared semantics used across the crate:
/// `*` never crosses `/`, `**` does, `?` matches one non-separator character.
pub(crate) fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(Error::from)?;
    Ok(glob.compile_matcher())
}

/// Whether `path` matches `pattern` under the shared glob semantics.
pub fn glob_matches(pattern: &str, path: &str) -> bool {
    match compile_glob(pattern) {
        Ok(matcher) => matcher.is_match(path),
        Err(_) => false,
    }
}

/// A named artifact classification: ordered glob patterns, a default TTL, and
/// optional archival configuration.
#[derive(Debug, Clone)]
pub struct ArtifactType {
    pub name: String,
    pub patterns: Vec<String>,
    pub default_ttl_secs: u64,
    pub archive_after_days: Option<u32>,
    pub archive_storage: Option<String>,
    pub builtin: bool,
    compiled: Vec<GlobMatcher>,
}

impl ArtifactType {
    pub fn new(name: impl Into<String>, patterns: Vec<String>, default_ttl_secs: u64) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|p| compile_glob(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: name.into(),
            patterns,
            default_ttl_secs,
            archive_after_days: None,
            archive_storage: None,
            builtin: false,
            compiled,
        })
    }

    pub fn with_archive(mut self, after_days: u32, storage: impl Into<String>) -> Self {
        self.archive_after_days = Some(after_days);
        self.archive_storage = Some(storage.into());
        self
    }

    fn matches(&self, path: &str) -> bool {
        self.compiled.iter().any(|m| m.is_match(path))
    }

    fn builtin_named(name: &str, patterns: &[&str], ttl_secs: u64) -> Self {
        let mut t = Self::new(
            name,
            patterns.iter().map(|p| p.to_string()).collect(),
            ttl_secs,
        )
        .expect("builtin glob patterns are always valid");
        t.builtin = true;
        t
    }
}

const DEFAULT_TTL_SECS: u64 = 60 * 60;

/// The sentinel type returned when no registered type matches a path.
fn default_type() -> ArtifactType {
    ArtifactType {
        name: "default".to_string(),
        patterns: Vec::new(),
        default_ttl_secs: DEFAULT_TTL_SECS,
        archive_after_days: None,
        archive_storage: None,
        builtin: true,
        compiled: Vec::new(),
    }
}

/// Ordered registry of artifact types: custom types outrank built-ins; ties
/// are broken by registration order.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    custom: Vec<ArtifactType>,
    builtins: Vec<ArtifactType>,
}

impl TypeRegistry {
    /// A registry preloaded with the five mandatory built-in types.
    pub fn with_builtins() -> Self {
        Self {
            custom: Vec::new(),
            builtins: vec![
                ArtifactType::builtin_named("docs", &["**/docs/**/*.md", "**/*.md"], 24 * 60 * 60),
                ArtifactType::builtin_named("specs", &["**/specs/**/*"], 7 * 24 * 60 * 60),
                ArtifactType::builtin_named(
                    "config",
                    &["**/*.toml", "**/*.yaml", "**/*.yml", "**/*.json"],
                    60 * 60,
                ),
                ArtifactType::builtin_named("logs", &["**/*.log", "**/logs/**/*"], 60 * 60),
                ArtifactType::builtin_named("schemas", &["**/schemas/**/*", "**/*.schema.json"], 7 * 24 * 60 * 60),
            ],
        }
    }

    pub fn register(&mut self, artifact_type: ArtifactType) {
        self.custom.push(artifact_type);
    }

    pub fn unregister(&mut self, name: &str) -> Result<()> {
        if self.builtins.iter().any(|t| t.name == name) {
            return Err(Error::ConfigInvalid(format!("BuiltinImmutable: {name}")));
        }
        let before = self.custom.len();
        self.custom.retain(|t| t.name != name);
        if self.custom.len() == before {
            return Err(Error::ConfigInvalid(format!("unknown type: {name}")));
        }
        Ok(())
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.iter().any(|t| t.name == name)
    }

    /// All registered types in priority order: custom first, then built-ins,
    /// each in registration order.
    pub fn list(&self) -> Vec<&ArtifactType> {
        self.custom.iter().chain(self.builtins.iter()).collect()
    }

    /// First-match-wins lookup across types in priority order, patterns in
    /// declaration order within a type.
    pub fn lookup_type(&self, path: &str) -> ArtifactType {
        for t in self.custom.iter().chain(self.builtins.iter()) {
            if t.matches(path) {
                return t.clone();
            }
        }
        default_type()
    }

    pub fn lookup_ttl(&self, path: &str) -> u64 {
        self.lookup_type(path).default_ttl_secs
    }

    /// Reset-and-rebuild path for custom type mutation, per the registry's
    /// "effectively immutable after startup" contract.
    pub fn rebuild_custom(&mut self, types: Vec<ArtifactType>) {
        self.custom = types;
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_]{1,8}"
    }

    proptest! {
        /// `**` matches any chain of intermediate segments, but a single
        /// `*` never crosses a `/` — the implementation must not confuse
        /// one glob form for the other, for any number of middle segments.
        #[test]
        fn double_star_matches_any_depth_single_star_only_one_segment(
            middle in prop::collection::vec(segment(), 0..5),
        ) {
            let path = if middle.is_empty() {
                "a/c".to_string()
            } else {
                format!("a/{}/c", middle.join("/"))
            };

            prop_assert!(glob_matches("a/**/c", &path));

            let single_star_should_match = middle.len() == 1;
            prop_assert_eq!(glob_matches("a/*/c", &path), single_star_should_match);
        }

        /// A literal path segment always matches itself under `*` and is
        /// never accidentally matched by an unrelated literal pattern.
        #[test]
        fn literal_segment_self_matches(seg in segment()) {
            prop_assert!(glob_matches(&seg, &seg));
            prop_assert!(glob_matches("*", &seg));
        }
    }
}
