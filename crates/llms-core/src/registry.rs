//! Document registry: the catalog of sources and their derived documents for
//! one process run. Passed explicitly to every component that needs it.

use crate::config::Config;
use crate::document::{DerivedDocument, DocKey};
use crate::error::Result;
use crate::io;
use crate::paths;
use crate::source::SourceDocument;
use crate::types::PriorityTier;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug)]
pub struct Registry {
    root: PathBuf,
    /// Relative to `root`.
    output_dir: PathBuf,
    sources: Vec<SourceDocument>,
    derived: BTreeMap<DocKey, DerivedDocument>,
    /// Where each derived document currently lives on disk, relative to root.
    locations: BTreeMap<DocKey, PathBuf>,
    /// Derived files deleted or moved during this run.
    removed: BTreeSet<PathBuf>,
}

impl Registry {
    pub fn new(root: &Path, output_dir: &Path, sources: Vec<SourceDocument>) -> Self {
        Self {
            root: root.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            sources,
            derived: BTreeMap::new(),
            locations: BTreeMap::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Discover sources and read every derived document already on disk.
    pub fn load(root: &Path, config: &Config) -> Result<Self> {
        let sources = SourceDocument::discover(root, config)?;
        let mut registry = Self::new(root, &config.output.dir, sources);
        registry.load_derived()?;
        Ok(registry)
    }

    fn load_derived(&mut self) -> Result<()> {
        let dir = self.root.join(&self.output_dir);
        if !dir.is_dir() {
            return Ok(());
        }
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
            let is_derived_ext = entry
                .path()
                .extension()
                .is_some_and(|e| e == paths::DERIVED_EXTENSION);
            if !entry.file_type().is_file() || !is_derived_ext {
                continue;
            }
            let doc = match DerivedDocument::load(entry.path()) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::debug!(path = %entry.path().display(), error = %e, "not a derived document");
                    continue;
                }
            };
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_path_buf();
            let key = doc.key();
            if let Some(existing) = self.locations.get(&key) {
                tracing::warn!(
                    key = %key,
                    kept = %existing.display(),
                    ignored = %rel.display(),
                    "duplicate derived document"
                );
                continue;
            }
            self.locations.insert(key.clone(), rel);
            self.derived.insert(key, doc);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn list_sources(&self) -> &[SourceDocument] {
        &self.sources
    }

    pub fn source(&self, id: &str) -> Option<&SourceDocument> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn get_derived(&self, document_id: &str, limit: usize) -> Option<&DerivedDocument> {
        self.derived.get(&DocKey::new(document_id, limit))
    }

    pub fn get_derived_mut(&mut self, key: &DocKey) -> Option<&mut DerivedDocument> {
        self.derived.get_mut(key)
    }

    pub fn derived(&self) -> impl Iterator<Item = &DerivedDocument> {
        self.derived.values()
    }

    pub fn for_document(&self, document_id: &str) -> Vec<&DerivedDocument> {
        self.derived
            .values()
            .filter(|d| d.document_id == document_id)
            .collect()
    }

    pub fn by_category_tier(&self, category: &str, tier: PriorityTier) -> Vec<&DerivedDocument> {
        self.derived
            .values()
            .filter(|d| d.category == category && d.priority_tier == tier)
            .collect()
    }

    /// Canonical repo-relative path for a derived document.
    pub fn derived_path(&self, doc: &DerivedDocument) -> PathBuf {
        paths::derived_rel_path(&self.output_dir, &doc.category, &doc.document_id, doc.character_limit)
    }

    /// Where the document currently lives, if it has ever been written.
    pub fn location(&self, key: &DocKey) -> Option<&Path> {
        self.locations.get(key).map(PathBuf::as_path)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Insert or replace the in-memory record. Returns the previous record.
    pub fn upsert_derived(&mut self, doc: DerivedDocument) -> Option<DerivedDocument> {
        self.derived.insert(doc.key(), doc)
    }

    /// The record for `key`, inserted as a fresh `pending` document if absent.
    pub fn derived_entry(&mut self, key: &DocKey, category: &str) -> &mut DerivedDocument {
        self.derived.entry(key.clone()).or_insert_with(|| {
            DerivedDocument::new(key.document_id.clone(), category, key.character_limit)
        })
    }

    /// Write a derived document to its canonical path. The write is atomic;
    /// on failure the previous file is untouched. A copy left at an older
    /// location (category change) is removed afterwards.
    pub fn persist(&mut self, doc: &DerivedDocument) -> Result<PathBuf> {
        let rel = self.derived_path(doc);
        let text = doc.render()?;
        io::atomic_write(&self.root.join(&rel), text.as_bytes())?;

        let key = doc.key();
        if let Some(old) = self.locations.insert(key, rel.clone()) {
            if old != rel {
                self.remove_file(&old)?;
            }
        }
        Ok(rel)
    }

    /// Delete derived files whose source is gone or whose limit is no longer
    /// configured. Returns the removed keys with their former paths.
    pub fn prune_orphans(&mut self, limits: &[usize]) -> Result<Vec<(DocKey, PathBuf)>> {
        let ids: HashSet<&str> = self.sources.iter().map(|s| s.id.as_str()).collect();
        let orphans: Vec<DocKey> = self
            .derived
            .keys()
            .filter(|k| !ids.contains(k.document_id.as_str()) || !limits.contains(&k.character_limit))
            .cloned()
            .collect();

        let mut pruned = Vec::new();
        for key in orphans {
            self.derived.remove(&key);
            if let Some(path) = self.locations.remove(&key) {
                self.remove_file(&path)?;
                tracing::info!(key = %key, path = %path.display(), "pruned orphaned derived document");
                pruned.push((key, path));
            }
        }
        Ok(pruned)
    }

    fn remove_file(&mut self, rel: &Path) -> Result<()> {
        let abs = self.root.join(rel);
        io::remove_if_exists(&abs)?;
        if let Some(parent) = abs.parent() {
            io::prune_empty_dirs(parent, &self.root.join(&self.output_dir));
        }
        self.removed.insert(rel.to_path_buf());
        Ok(())
    }

    /// Paths deleted during this run, still to be reported as changes.
    pub fn removed_paths(&self) -> &BTreeSet<PathBuf> {
        &self.removed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, text).unwrap();
    }

    fn completed(id: &str, category: &str, limit: usize, content: &str) -> DerivedDocument {
        let mut doc = DerivedDocument::new(id, category, limit);
        doc.mark_completed(content.to_string(), 50, PriorityTier::Medium, Utc::now())
            .unwrap();
        doc
    }

    #[test]
    fn load_reads_sources_and_derived() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "docs/intro.md", "# Intro\n");
        let mut reg = Registry::load(root, &Config::new("p")).unwrap();
        let doc = completed("intro", "general", 1000, "# Intro");
        reg.persist(&doc).unwrap();
        write(root, "llms/notes.md", "not a derived document");

        let reg = Registry::load(root, &Config::new("p")).unwrap();
        assert_eq!(reg.list_sources().len(), 1);
        assert_eq!(reg.source("intro").unwrap().title, "Intro");
        assert!(reg.source("missing").is_none());
        assert_eq!(reg.get_derived("intro", 1000).unwrap().content, "# Intro");
        assert_eq!(reg.derived().count(), 1);
        assert!(root.join("llms/notes.md").exists());
    }

    #[test]
    fn upsert_and_lookup() {
        let dir = TempDir::new().unwrap();
        let mut reg = Registry::new(dir.path(), Path::new("llms"), Vec::new());
        assert!(reg.upsert_derived(completed("a", "api", 100, "x")).is_none());
        assert!(reg.upsert_derived(completed("a", "api", 100, "y")).is_some());
        reg.upsert_derived(completed("a", "api", 500, "z"));
        assert_eq!(reg.get_derived("a", 100).unwrap().content, "y");
        assert_eq!(reg.for_document("a").len(), 2);
        assert_eq!(reg.by_category_tier("api", PriorityTier::Medium).len(), 2);
        assert!(reg.by_category_tier("api", PriorityTier::High).is_empty());
    }

    #[test]
    fn persist_moves_file_on_category_change() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let mut reg = Registry::new(root, Path::new("llms"), Vec::new());
        let old = reg.persist(&completed("a", "api", 100, "x")).unwrap();
        assert_eq!(old, PathBuf::from("llms/api/a.100.md"));

        let new = reg.persist(&completed("a", "guides", 100, "x")).unwrap();
        assert_eq!(new, PathBuf::from("llms/guides/a.100.md"));
        assert!(!root.join(&old).exists());
        assert!(!root.join("llms/api").exists());
        assert!(reg.removed_paths().contains(&old));
    }

    #[test]
    fn prune_removes_unknown_sources_and_limits() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "docs/keep.md", "# Keep\n");
        let mut reg = Registry::load(root, &Config::new("p")).unwrap();
        reg.persist(&completed("keep", "general", 1000, "k")).unwrap();
        reg.persist(&completed("keep", "general", 9999, "k")).unwrap();
        reg.persist(&completed("gone", "general", 1000, "g")).unwrap();

        let mut reg = Registry::load(root, &Config::new("p")).unwrap();
        let pruned = reg.prune_orphans(&[1000]).unwrap();
        let keys: Vec<String> = pruned.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["gone@1000", "keep@9999"]);
        assert!(root.join("llms/general/keep.1000.md").exists());
        assert!(!root.join("llms/general/gone.1000.md").exists());
        assert_eq!(reg.removed_paths().len(), 2);
    }
}
