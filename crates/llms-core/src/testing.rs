//! In-memory [`Vcs`] for tests.
//!
//! The working tree is a real directory, so code that writes files through the
//! filesystem is observed as usual. HEAD, the index and the commit log live in
//! memory. Failures can be injected per operation.

use crate::error::{LlmsError, Result};
use crate::vcs::{self, CommitResult, Fingerprint, Vcs};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug, Clone)]
pub struct MemoryCommit {
    pub id: String,
    pub message: String,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct State {
    head: BTreeMap<PathBuf, Vec<u8>>,
    /// Staged entries; `None` is a staged deletion.
    index: BTreeMap<PathBuf, Option<Vec<u8>>>,
    commits: Vec<MemoryCommit>,
    fail_stage: bool,
    fail_commit: bool,
    ignore_stage: bool,
    fail_guard: bool,
    fail_fingerprint: BTreeSet<PathBuf>,
    unstaged: Vec<PathBuf>,
}

pub struct MemoryVcs {
    root: PathBuf,
    _dir: Option<TempDir>,
    state: RefCell<State>,
}

impl MemoryVcs {
    /// Backed by a fresh temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        Self {
            root: dir.path().to_path_buf(),
            _dir: Some(dir),
            state: RefCell::default(),
        }
    }

    /// Working tree at an existing directory.
    pub fn at(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            _dir: None,
            state: RefCell::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write(&self, rel: &str, text: &str) {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    /// Put `text` at `rel` in HEAD without touching the working tree.
    pub fn commit_file(&self, rel: &str, text: &str) {
        self.state
            .borrow_mut()
            .head
            .insert(PathBuf::from(rel), text.as_bytes().to_vec());
    }

    /// Record a commit made by someone else, e.g. the commit that fired the hook.
    pub fn user_commit(&self, message: &str) {
        let mut state = self.state.borrow_mut();
        let id = format!("c{}", state.commits.len() + 1);
        state.commits.push(MemoryCommit {
            id,
            message: message.to_string(),
            paths: Vec::new(),
        });
    }

    pub fn fail_stage(&self) {
        self.state.borrow_mut().fail_stage = true;
    }

    pub fn fail_commit(&self) {
        self.state.borrow_mut().fail_commit = true;
    }

    /// `stage` succeeds but records nothing.
    pub fn ignore_stage(&self) {
        self.state.borrow_mut().ignore_stage = true;
    }

    pub fn fail_guard(&self) {
        self.state.borrow_mut().fail_guard = true;
    }

    pub fn fail_fingerprint(&self, rel: &str) {
        self.state
            .borrow_mut()
            .fail_fingerprint
            .insert(PathBuf::from(rel));
    }

    pub fn commits(&self) -> Vec<MemoryCommit> {
        self.state.borrow().commits.clone()
    }

    pub fn sync_commits(&self) -> Vec<MemoryCommit> {
        self.commits()
            .into_iter()
            .filter(|c| vcs::sync_trailer(&c.message).is_some())
            .collect()
    }

    pub fn staged(&self) -> Vec<PathBuf> {
        self.state.borrow().index.keys().cloned().collect()
    }

    /// Paths passed to `unstage`, in call order.
    pub fn unstaged(&self) -> Vec<PathBuf> {
        self.state.borrow().unstaged.clone()
    }

    pub fn head_has(&self, rel: &str) -> bool {
        self.state.borrow().head.contains_key(Path::new(rel))
    }
}

impl Default for MemoryVcs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vcs for MemoryVcs {
    fn head_commit_id(&self) -> Result<Option<String>> {
        Ok(self.state.borrow().commits.last().map(|c| c.id.clone()))
    }

    fn current_commit_is_sync_commit(&self) -> Result<bool> {
        let state = self.state.borrow();
        if state.fail_guard {
            return Err(LlmsError::Vcs("log unavailable".to_string()));
        }
        Ok(state
            .commits
            .last()
            .is_some_and(|c| vcs::sync_trailer(&c.message).is_some()))
    }

    fn working_tree_fingerprint(&self, path: &Path) -> Result<Option<Fingerprint>> {
        if self.state.borrow().fail_fingerprint.contains(path) {
            return Err(LlmsError::Detection {
                path: path.to_path_buf(),
                reason: "injected".to_string(),
            });
        }
        match std::fs::read(self.root.join(path)) {
            Ok(bytes) => Ok(Some(Fingerprint::of(&bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn last_commit_fingerprint(&self, path: &Path) -> Result<Option<Fingerprint>> {
        Ok(self.state.borrow().head.get(path).map(|b| Fingerprint::of(b)))
    }

    fn stage(&self, paths: &[PathBuf]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_stage {
            return Err(LlmsError::Vcs("index.lock exists".to_string()));
        }
        if state.ignore_stage {
            return Ok(());
        }
        for path in paths {
            match std::fs::read(self.root.join(path)) {
                Ok(bytes) => {
                    state.index.insert(path.clone(), Some(bytes));
                }
                Err(_) if state.head.contains_key(path) => {
                    state.index.insert(path.clone(), None);
                }
                Err(_) => {}
            }
        }
        Ok(())
    }

    fn staged_paths(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let state = self.state.borrow();
        Ok(paths
            .iter()
            .filter(|p| match state.index.get(*p) {
                Some(entry) => entry.as_ref() != state.head.get(*p),
                None => false,
            })
            .cloned()
            .collect())
    }

    fn unstage(&self, paths: &[PathBuf]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        for path in paths {
            state.index.remove(path);
            state.unstaged.push(path.clone());
        }
        Ok(())
    }

    fn commit(&self, message: &str, tag: &str, paths: &[PathBuf]) -> Result<CommitResult> {
        let mut state = self.state.borrow_mut();
        if state.fail_commit {
            return Ok(CommitResult {
                ok: false,
                commit_id: None,
            });
        }
        for path in paths {
            match state.index.remove(path) {
                Some(Some(bytes)) => {
                    state.head.insert(path.clone(), bytes);
                }
                Some(None) => {
                    state.head.remove(path);
                }
                None => {}
            }
        }
        let id = format!("c{}", state.commits.len() + 1);
        state.commits.push(MemoryCommit {
            id: id.clone(),
            message: vcs::sync_commit_message(message, tag),
            paths: paths.to_vec(),
        });
        Ok(CommitResult {
            ok: true,
            commit_id: Some(id),
        })
    }
}
