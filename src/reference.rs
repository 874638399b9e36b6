//! Parsing, building and resolving `codex://` references.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Source backend a resolved reference will eventually be fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Local,
    FilePlugin,
    RemoteVcs,
    Http,
    Archive,
}

/// A parsed `codex://<org>/<project>[/<path>]` reference.
///
/// Two parsed references are equal iff all three fields are equal byte-wise
/// after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    org: String,
    project: String,
    path: String,
}

impl Reference {
    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The URI this reference was (or would be) parsed from.
    pub fn to_uri(&self) -> String {
        build(&self.org, &self.project, &self.path)
            .expect("a parsed Reference's components are always buildable")
    }

    /// Parse a `codex://` URI into its three components.
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("codex://")
            .ok_or_else(|| Error::InvalidUri(format!("missing codex:// prefix: {uri}")))?;

        let mut parts = rest.splitn(3, '/');
        let org = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidUri(format!("missing org: {uri}")))?;
        let project = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidUri(format!("missing project: {uri}")))?;
        if org.contains('/') || project.contains('/') {
            return Err(Error::InvalidUri(format!("org/project must not contain '/': {uri}")));
        }

        let raw_path = parts.next().unwrap_or("");
        let path = normalize_path(raw_path)?;

        Ok(Self {
            org: org.to_string(),
            project: project.to_string(),
            path,
        })
    }

    /// Inverse of [`Reference::parse`]: build a reference from components,
    /// rejecting any empty `org`/`project` and stripping a leading `/` from
    /// `path`.
    pub fn build(org: &str, project: &str, path: &str) -> Result<Self> {
        build(org, project, path)?;
        if org.is_empty() || project.is_empty() {
            return Err(Error::InvalidUri("org and project must be non-empty".to_string()));
        }
        let path = path.strip_prefix('/').unwrap_or(path);
        let path = normalize_path(path)?;
        Ok(Self {
            org: org.to_string(),
            project: project.to_string(),
            path,
        })
    }

    /// Pure predicate, equivalent to `parse(uri).is_ok()`.
    pub fn validate(uri: &str) -> bool {
        Self::parse(uri).is_ok()
    }

    /// Resolve this reference against a caller-supplied context.
    pub fn resolve(&self, ctx: &ResolutionContext) -> ResolvedReference {
        let is_current_project = self.org == ctx.current_org && self.project == ctx.current_project;

        let (local_path, source_type) = if is_current_project {
            if let Some(base) = ctx
                .file_source_map
                .iter()
                .find(|(prefix, _)| self.path.starts_with(prefix.as_str()))
            {
                (Some(base.1.join(&self.path)), SourceType::FilePlugin)
            } else {
                (Some(ctx.working_dir.join(&self.path)), SourceType::Local)
            }
        } else {
            (None, SourceType::RemoteVcs)
        };

        let cache_path = ctx
            .cache_root
            .join(&self.org)
            .join(&self.project)
            .join(format!("{}.cache", self.path));

        ResolvedReference {
            reference: self.clone(),
            cache_path,
            is_current_project,
            local_path,
            source_type,
        }
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

fn build(org: &str, project: &str, path: &str) -> Result<String> {
    if org.is_empty() || project.is_empty() {
        return Err(Error::InvalidUri("org and project must be non-empty".to_string()));
    }
    let path = path.strip_prefix('/').unwrap_or(path);
    Ok(if path.is_empty() {
        format!("codex://{org}/{project}")
    } else {
        format!("codex://{org}/{project}/{path}")
    })
}

fn normalize_path(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Ok(String::new());
    }
    for segment in raw.split('/') {
        if segment == ".." {
            return Err(Error::InvalidPath(format!("path traversal segment in: {raw}")));
        }
        if segment.contains("%2f") || segment.contains("%2F") {
            return Err(Error::InvalidPath(format!("percent-encoded separator in: {raw}")));
        }
    }
    Ok(raw.to_string())
}

/// Context supplied by the caller to [`Reference::resolve`].
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cache_root: PathBuf,
    pub current_org: String,
    pub current_project: String,
    pub working_dir: PathBuf,
    /// Base paths (as `path` prefixes) that map into a plugin-provided file
    /// source instead of the plain working directory.
    pub file_source_map: Vec<(String, PathBuf)>,
}

impl ResolutionContext {
    pub fn new(
        cache_root: impl Into<PathBuf>,
        current_org: impl Into<String>,
        current_project: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache_root: cache_root.into(),
            current_org: current_org.into(),
            current_project: current_project.into(),
            working_dir: working_dir.into(),
            file_source_map: Vec::new(),
        }
    }

    pub fn with_file_source(mut self, path_prefix: impl Into<String>, base: impl Into<PathBuf>) -> Self {
        self.file_source_map.push((path_prefix.into(), base.into()));
        self
    }
}

/// A [`Reference`] augmented with resolution-time information.
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    pub reference: Reference,
    pub cache_path: PathBuf,
    pub is_current_project: bool,
    pub local_path: Option<PathBuf>,
    pub source_type: SourceType,
}

impl ResolvedReference {
    pub fn uri(&self) -> String {
        self.reference.to_uri()
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        let uri = "codex://acme/widgets/docs/guide.md";
        let parsed = Reference::parse(uri).unwrap();
        assert_eq!(parsed.org(), "acme");
        assert_eq!(parsed.project(), "widgets");
        assert_eq!(parsed.path(), "docs/guide.md");
        assert_eq!(parsed.to_uri(), uri);
    }

    #[test]
    fn parse_rejects_missing_prefix() {
        assert!(Reference::parse("acme/widgets/x.md").is_err());
    }

    #[test]
    fn parse_rejects_path_traversal() {
        assert!(matches!(
            Reference::parse("codex://acme/widgets/../secret.md"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn parse_allows_empty_path_as_project_root() {
        let r = Reference::parse("codex://acme/widgets").unwrap();
        assert_eq!(r.path(), "");
        assert_eq!(r.to_uri(), "codex://acme/widgets");
    }

    #[test]
    fn build_rejects_empty_components() {
        assert!(Reference::build("", "widgets", "x.md").is_err());
    }

    #[test]
    fn build_strips_leading_slash() {
        let r = Reference::build("acme", "widgets", "/docs/guide.md").unwrap();
        assert_eq!(r.path(), "docs/guide.md");
    }

    #[test]
    fn resolve_marks_current_project_local() {
        let reference = Reference::parse("codex://acme/widgets/docs/guide.md").unwrap();
        let ctx = ResolutionContext::new("/cache", "acme", "widgets", "/work");
        let resolved = reference.resolve(&ctx);
        assert!(resolved.is_current_project);
        assert_eq!(resolved.source_type, SourceType::Local);
        assert_eq!(resolved.local_path(), Some(Path::new("/work/docs/guide.md")));
    }

    #[test]
    fn resolve_leaves_remote_reference_unset_locally() {
        let reference = Reference::parse("codex://other/thing/x.md").unwrap();
        let ctx = ResolutionContext::new("/cache", "acme", "widgets", "/work");
        let resolved = reference.resolve(&ctx);
        assert!(!resolved.is_current_project);
        assert_eq!(resolved.source_type, SourceType::RemoteVcs);
        assert!(resolved.local_path().is_none());
    }

    #[test]
    fn resolve_prefers_file_source_map() {
        let reference = Reference::parse("codex://acme/widgets/plugin/x.md").unwrap();
        let ctx = ResolutionContext::new("/cache", "acme", "widgets", "/work")
            .with_file_source("plugin/", "/plugins/widgets");
        let resolved = reference.resolve(&ctx);
        assert_eq!(resolved.source_type, SourceType::FilePlugin);
        assert_eq!(
            resolved.local_path(),
            Some(Path::new("/plugins/widgets/plugin/x.md"))
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// `org`/`project` segments and path segments drawn from an alphabet
    /// that can never itself trigger a parse error, so every generated URI
    /// is guaranteed valid input.
    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_-]{1,12}"
    }

    fn path_segments() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(segment(), 0..4)
    }

    proptest! {
        /// For all valid URIs `u`: `parse(build(parse(u).components)) = parse(u)`.
        #[test]
        fn parse_build_parse_round_trips(org in segment(), project in segment(), segments in path_segments()) {
            let path = segments.join("/");
            let uri = if path.is_empty() {
                format!("codex://{org}/{project}")
            } else {
                format!("codex://{org}/{project}/{path}")
            };

            let parsed = Reference::parse(&uri).unwrap();
            let rebuilt_uri = parsed.to_uri();
            let reparsed = Reference::parse(&rebuilt_uri).unwrap();
            prop_assert_eq!(parsed, reparsed);
        }

        /// `build` followed by `parse` recovers the same components for any
        /// non-empty, separator-free org/project and any traversal-free path.
        #[test]
        fn build_then_parse_recovers_components(org in segment(), project in segment(), segments in path_segments()) {
            let path = segments.join("/");
            let built = Reference::build(&org, &project, &path).unwrap();
            let reparsed = Reference::parse(&built.to_uri()).unwrap();
            prop_assert_eq!(built.org(), reparsed.org());
            prop_assert_eq!(built.project(), reparsed.project());
            prop_assert_eq!(built.path(), reparsed.path());
        }

        /// Any path containing a literal `..` segment is always rejected,
        /// regardless of what surrounds it.
        #[test]
        fn traversal_segment_always_rejected(prefix in path_segments(), suffix in path_segments()) {
            let mut segments = prefix;
            segments.push("..".to_string());
            segments.extend(suffix);
            let uri = format!("codex://acme/widgets/{}", segments.join("/"));
            prop_assert!(Reference::parse(&uri).is_err());
        }
    }
}
