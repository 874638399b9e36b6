//! Front-matter metadata block extraction: `---`-delimited header key-value
//! data at the top of a text file, read for routing keys and otherwise
//! passed through opaquely.

use std::collections::HashMap;

/// Parsed front-matter. Only `codex_sync_include`/`codex_sync_exclude` are
/// interpreted by the core; every other key is preserved as an opaque
/// string-or-list value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileMetadata {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub other: HashMap<String, MetadataValue>,
    /// Set when the block was present but malformed; never an error.
    pub malformed_warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Scalar(String),
    List(Vec<String>),
}

/// Extract the header block. If the file does not begin with a `---` line,
/// metadata is empty and no error is raised. A missing closing `---`
/// degrades to metadata-less with a warning, never a hard failure.
pub fn parse_front_matter(content: &str) -> FileMetadata {
    let mut lines = content.lines();

    let Some(first) = lines.next() else {
        return FileMetadata::default();
    };
    if first.trim_end() != "---" {
        return FileMetadata::default();
    }

    let mut block_lines = Vec::new();
    let mut closed = false;
    for line in lines {
        if line.trim_end() == "---" {
            closed = true;
            break;
        }
        block_lines.push(line);
    }

    if !closed {
        return FileMetadata {
            malformed_warning: Some("missing closing '---' delimiter".to_string()),
            ..Default::default()
        };
    }

    parse_block(&block_lines)
}

fn parse_block(lines: &[&str]) -> FileMetadata {
    let mut metadata = FileMetadata::default();
    let mut iter = lines.iter().peekable();

    while let Some(line) = iter.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some((key, rest)) = trimmed.split_once(':') else {
            metadata.malformed_warning = Some(format!("unparseable line: {trimmed}"));
            continue;
        };
        let key = key.trim();
        let rest = rest.trim();

        let value = if rest.is_empty() {
            // YAML-style nested list: subsequent `- item` lines.
            let mut items = Vec::new();
            while let Some(next) = iter.peek() {
                let next_trimmed = next.trim();
                if let Some(item) = next_trimmed.strip_prefix("- ") {
                    items.push(unquote(item));
                    iter.next();
                } else {
                    break;
                }
            }
            MetadataValue::List(items)
        } else if rest.starts_with('[') && rest.ends_with(']') {
            let inner = &rest[1..rest.len() - 1];
            let items = inner
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(unquote)
                .collect();
            MetadataValue::List(items)
        } else {
            MetadataValue::Scalar(unquote(rest))
        };

        match (key, &value) {
            ("codex_sync_include", MetadataValue::List(items)) => metadata.include = items.clone(),
            ("codex_sync_exclude", MetadataValue::List(items)) => metadata.exclude = items.clone(),
            ("codex_sync_include", MetadataValue::Scalar(s)) => metadata.include = vec![s.clone()],
            ("codex_sync_exclude", MetadataValue::Scalar(s)) => metadata.exclude = vec![s.clone()],
            _ => {
                metadata.other.insert(key.to_string(), value);
            }
        }
    }

    metadata
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_leading_delimiter_yields_empty_metadata() {
        let meta = parse_front_matter("# Just a heading\nbody text");
        assert_eq!(meta, FileMetadata::default());
    }

    #[test]
    fn missing_closing_delimiter_is_malformed_not_error() {
        let meta = parse_front_matter("---\ncodex_sync_include: [\"*\"]\nbody without closing fence");
        assert!(meta.malformed_warning.is_some());
        assert!(meta.include.is_empty());
    }

    #[test]
    fn parses_inline_list_syntax() {
        let meta = parse_front_matter("---\ncodex_sync_include: [\"target-*\", \"other\"]\n---\nbody");
        assert_eq!(meta.include, vec!["target-*", "other"]);
    }

    #[test]
    fn parses_yaml_block_list_syntax() {
        let content = "---\ncodex_sync_include:\n  - target-*\n  - other\ncodex_sync_exclude:\n  - secret-*\n---\nbody";
        let meta = parse_front_matter(content);
        assert_eq!(meta.include, vec!["target-*", "other"]);
        assert_eq!(meta.exclude, vec!["secret-*"]);
    }

    #[test]
    fn unknown_keys_pass_through() {
        let meta = parse_front_matter("---\ntitle: \"My Doc\"\n---\nbody");
        assert_eq!(
            meta.other.get("title"),
            Some(&MetadataValue::Scalar("My Doc".to_string()))
        );
    }
}
