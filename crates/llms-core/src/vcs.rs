//! Version-control seam used by change detection and the sync orchestrator.

use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Commit trailer key marking a sync commit.
pub const SYNC_TRAILER: &str = "LLMS-Sync";

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// Content identity of one file version: byte length plus SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub len: u64,
    pub sha256: String,
}

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let sha256 = digest.iter().map(|b| format!("{b:02x}")).collect();
        Self {
            len: bytes.len() as u64,
            sha256,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.len, &self.sha256[..self.sha256.len().min(12)])
    }
}

// ---------------------------------------------------------------------------
// CommitResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    pub ok: bool,
    pub commit_id: Option<String>,
}

/// Full commit message for a sync commit: the configured subject plus the
/// trailer the recursion guard looks for.
pub fn sync_commit_message(message: &str, tag: &str) -> String {
    format!("{}\n\n{SYNC_TRAILER}: {tag}\n", message.trim_end())
}

static TRAILER_RE: OnceLock<Regex> = OnceLock::new();

/// The trailer value if `message` belongs to a sync commit.
pub fn sync_trailer(message: &str) -> Option<&str> {
    let re = TRAILER_RE.get_or_init(|| Regex::new(r"(?m)^LLMS-Sync:[ \t]*(\S+)[ \t]*$").unwrap());
    re.captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

// ---------------------------------------------------------------------------
// Vcs
// ---------------------------------------------------------------------------

/// All paths are repo-relative.
pub trait Vcs {
    fn head_commit_id(&self) -> Result<Option<String>>;

    /// True when HEAD was created by a sync run.
    fn current_commit_is_sync_commit(&self) -> Result<bool>;

    /// `None` when the path is missing from the working tree.
    fn working_tree_fingerprint(&self, path: &Path) -> Result<Option<Fingerprint>>;

    /// `None` when the path did not exist at the last commit.
    fn last_commit_fingerprint(&self, path: &Path) -> Result<Option<Fingerprint>>;

    /// Stage the given paths. Paths missing from the working tree are staged
    /// as deletions.
    fn stage(&self, paths: &[PathBuf]) -> Result<()>;

    /// The subset of `paths` with staged changes.
    fn staged_paths(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>>;

    /// Remove the given paths from the index, restoring their HEAD entries.
    fn unstage(&self, paths: &[PathBuf]) -> Result<()>;

    /// Commit exactly `paths`, leaving anything else staged alone.
    fn commit(&self, message: &str, tag: &str, paths: &[PathBuf]) -> Result<CommitResult>;
}
