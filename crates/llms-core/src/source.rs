//! Source documents: discovery under the configured source directory and
//! the optional front matter authors use to steer generation.

use crate::config::Config;
use crate::document::split_front_matter;
use crate::error::{LlmsError, Result};
use crate::paths;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

pub const DEFAULT_CATEGORY: &str = "general";

/// Author-controlled keys read from a source's front matter. Anything else in
/// the block is ignored.
#[derive(Debug, Default, Deserialize)]
struct SourceMeta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default)]
    llms: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub id: String,
    /// Relative to the project root.
    pub path: PathBuf,
    pub category: String,
    pub title: String,
    pub raw_text: String,
    pub priority_override: Option<u8>,
    /// Directory levels below the source root.
    pub depth: usize,
}

impl SourceDocument {
    /// Build a source from its text. `rel_to_sources` is the path below the
    /// source directory and drives the default id, category and depth.
    /// Returns `None` when the front matter opts out with `llms: false`.
    pub fn from_text(path: PathBuf, rel_to_sources: &Path, raw_text: String) -> Result<Option<Self>> {
        let meta = match split_front_matter(&raw_text) {
            Some((yaml, _)) if !yaml.trim().is_empty() => {
                serde_yaml::from_str::<SourceMeta>(yaml).unwrap_or_else(|e| {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable front matter");
                    SourceMeta::default()
                })
            }
            _ => SourceMeta::default(),
        };
        if meta.llms == Some(false) {
            return Ok(None);
        }

        let dirs: Vec<String> = rel_to_sources
            .parent()
            .map(|p| {
                p.components()
                    .filter_map(|c| match c {
                        Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let id = match meta.id.as_deref() {
            Some(explicit) => paths::slugify(explicit),
            None => paths::slugify(&paths::to_git_path(&rel_to_sources.with_extension(""))),
        };
        paths::validate_slug("id", &id)?;

        let category = meta
            .category
            .as_deref()
            .map(paths::slugify)
            .or_else(|| dirs.first().map(|d| paths::slugify(d)))
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let mut doc = Self {
            id,
            path,
            category,
            title: String::new(),
            raw_text,
            priority_override: meta.priority.map(|p| p.clamp(0, 100) as u8),
            depth: dirs.len(),
        };
        doc.title = meta
            .title
            .filter(|t| !t.trim().is_empty())
            .or_else(|| first_heading(doc.body()))
            .unwrap_or_else(|| doc.id.clone());
        Ok(Some(doc))
    }

    /// Text handed to the summarizer: everything after the front matter.
    pub fn body(&self) -> &str {
        match split_front_matter(&self.raw_text) {
            Some((_, body)) => body,
            None => &self.raw_text,
        }
    }

    /// Walk `sources.dir` and load every matching file, sorted by id.
    pub fn discover(root: &Path, config: &Config) -> Result<Vec<Self>> {
        let source_dir = root.join(&config.sources.dir);
        if !source_dir.is_dir() {
            return Err(LlmsError::SourceDirMissing(source_dir));
        }
        let output_dir = root.join(&config.output.dir);
        let extensions: Vec<String> = config
            .sources
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();

        let walker = WalkDir::new(&source_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || (!e.file_name().to_string_lossy().starts_with('.') && e.path() != output_dir)
            });

        let mut by_id: BTreeMap<String, SourceDocument> = BTreeMap::new();
        for entry in walker {
            let entry = entry.map_err(|e| LlmsError::Io(std::io::Error::other(e.to_string())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let matches_ext = entry
                .path()
                .extension()
                .map(|ext| extensions.contains(&ext.to_string_lossy().to_lowercase()))
                .unwrap_or(false);
            if !matches_ext {
                continue;
            }

            let raw_text = match std::fs::read_to_string(entry.path()) {
                Ok(t) => t,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    tracing::warn!(path = %entry.path().display(), "skipping non-UTF-8 source");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let rel_to_sources = entry
                .path()
                .strip_prefix(&source_dir)
                .unwrap_or(entry.path())
                .to_path_buf();
            let rel_to_root = config.sources.dir.join(&rel_to_sources);

            let Some(doc) = Self::from_text(rel_to_root, &rel_to_sources, raw_text)? else {
                tracing::debug!(path = %entry.path().display(), "source opted out");
                continue;
            };
            if let Some(existing) = by_id.get(&doc.id) {
                return Err(LlmsError::DuplicateDocument {
                    id: doc.id.clone(),
                    first: existing.path.clone(),
                    second: doc.path,
                });
            }
            by_id.insert(doc.id.clone(), doc);
        }
        Ok(by_id.into_values().collect())
    }
}

fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, text).unwrap();
    }

    #[test]
    fn defaults_from_path() {
        let doc = SourceDocument::from_text(
            PathBuf::from("docs/guides/Getting Started.md"),
            Path::new("guides/Getting Started.md"),
            "# Getting started\n\nHello.\n".to_string(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(doc.id, "guides-getting-started");
        assert_eq!(doc.category, "guides");
        assert_eq!(doc.title, "Getting started");
        assert_eq!(doc.depth, 1);
        assert_eq!(doc.priority_override, None);
    }

    #[test]
    fn front_matter_overrides() {
        let text = "---\nid: Auth\ncategory: API Reference\ntitle: Auth API\npriority: 150\n---\n# Ignored\n";
        let doc = SourceDocument::from_text(PathBuf::from("docs/a.md"), Path::new("a.md"), text.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(doc.id, "auth");
        assert_eq!(doc.category, "api-reference");
        assert_eq!(doc.title, "Auth API");
        assert_eq!(doc.priority_override, Some(100));
        assert_eq!(doc.body(), "# Ignored\n");
    }

    #[test]
    fn opt_out_is_skipped() {
        let text = "---\nllms: false\n---\nprivate\n";
        let doc = SourceDocument::from_text(PathBuf::from("docs/a.md"), Path::new("a.md"), text.to_string()).unwrap();
        assert!(doc.is_none());
    }

    #[test]
    fn top_level_source_is_general() {
        let doc = SourceDocument::from_text(PathBuf::from("docs/faq.md"), Path::new("faq.md"), "text".to_string())
            .unwrap()
            .unwrap();
        assert_eq!(doc.category, DEFAULT_CATEGORY);
        assert_eq!(doc.title, "faq");
        assert_eq!(doc.depth, 0);
    }

    #[test]
    fn discover_walks_and_filters() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "docs/intro.md", "# Intro\n");
        write(root, "docs/guides/setup.mdx", "# Setup\n");
        write(root, "docs/guides/image.png", "binary-ish");
        write(root, "docs/.drafts/wip.md", "# WIP\n");
        let cfg = Config::new("p");
        let docs = SourceDocument::discover(root, &cfg).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["guides-setup", "intro"]);
        assert_eq!(docs[0].path, PathBuf::from("docs/guides/setup.mdx"));
    }

    #[test]
    fn discover_skips_output_dir_inside_sources() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "docs/intro.md", "# Intro\n");
        write(root, "docs/llms/general/intro.1000.md", "derived");
        let mut cfg = Config::new("p");
        cfg.output.dir = PathBuf::from("docs/llms");
        let docs = SourceDocument::discover(root, &cfg).unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn discover_rejects_duplicate_ids() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "docs/a-b.md", "x");
        write(root, "docs/a/b.md", "y");
        let err = SourceDocument::discover(root, &Config::new("p")).unwrap_err();
        assert!(matches!(err, LlmsError::DuplicateDocument { ref id, .. } if id == "a-b"));
    }

    #[test]
    fn discover_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            SourceDocument::discover(dir.path(), &Config::new("p")),
            Err(LlmsError::SourceDirMissing(_))
        ));
    }
}
