//! `llms.txt`: the entry point listing every source and its derived files.
//!
//! Rendered from registry state only. No timestamps, so re-running over an
//! unchanged registry produces a byte-identical file.

use crate::config::Config;
use crate::error::Result;
use crate::io;
use crate::paths;
use crate::registry::Registry;
use crate::score::{self, Priority};
use crate::types::PriorityTier;
use std::fmt::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub title: String,
    pub priority: Priority,
    /// `(limit, link)` pairs, ascending by limit. Links are relative to the
    /// output directory.
    pub files: Vec<(usize, String)>,
}

/// One entry per source that has at least one derived file on disk.
pub fn entries(registry: &Registry, config: &Config) -> Vec<IndexEntry> {
    let mut out: Vec<IndexEntry> = registry
        .list_sources()
        .iter()
        .filter_map(|source| {
            let mut files: Vec<(usize, String)> = registry
                .for_document(&source.id)
                .into_iter()
                .filter_map(|doc| {
                    let location = registry.location(&doc.key())?;
                    let link = location.strip_prefix(registry.output_dir()).unwrap_or(location);
                    Some((doc.character_limit, paths::to_git_path(link)))
                })
                .collect();
            if files.is_empty() {
                return None;
            }
            files.sort();
            Some(IndexEntry {
                id: source.id.clone(),
                title: source.title.clone(),
                priority: score::score(source, &config.priority),
                files,
            })
        })
        .collect();
    out.sort_by(|a, b| {
        b.priority
            .score
            .cmp(&a.priority.score)
            .then_with(|| a.id.cmp(&b.id))
    });
    out
}

pub fn render(config: &Config, entries: &[IndexEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", config.project.name);
    if let Some(desc) = config.project.description.as_deref().filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(out, "\n> {}", desc.trim());
    }

    for tier in PriorityTier::all().iter().rev() {
        let in_tier: Vec<&IndexEntry> = entries.iter().filter(|e| e.priority.tier == *tier).collect();
        if in_tier.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n## {}\n", tier.heading());
        for entry in in_tier {
            let links: Vec<String> = entry
                .files
                .iter()
                .map(|(limit, link)| format!("[{limit}]({link})"))
                .collect();
            let _ = writeln!(out, "- {} (`{}`): {}", entry.title, entry.id, links.join(" "));
        }
    }
    out
}

/// Write or remove the index according to `output.index`. Returns the index
/// path when the file on disk changed.
pub fn update(registry: &Registry, config: &Config) -> Result<Option<PathBuf>> {
    let rel = paths::index_rel_path(&config.output.dir);
    let abs = registry.root().join(&rel);

    if !config.output.index {
        return Ok(io::remove_if_exists(&abs)?.then_some(rel));
    }

    let text = render(config, &entries(registry, config));
    let current = std::fs::read_to_string(&abs).ok();
    if current.as_deref() == Some(text.as_str()) {
        return Ok(None);
    }
    io::atomic_write(&abs, text.as_bytes())?;
    tracing::debug!(path = %rel.display(), "index updated");
    Ok(Some(rel))
}
