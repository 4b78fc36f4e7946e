use crate::paths;
use crate::vcs::Vcs;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A path whose fingerprint could not be computed. Counted as changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectionError {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    /// Sorted, deduplicated, repo-relative.
    pub changed: Vec<PathBuf>,
    /// Candidates outside the output directory. Never staged.
    pub ignored: Vec<PathBuf>,
    pub errors: Vec<DetectionError>,
}

impl ChangeSet {
    pub fn any_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn is_changed(&self, path: &Path) -> bool {
        self.changed.iter().any(|p| p == path)
    }
}

/// Compare each candidate's working-tree fingerprint against the last commit.
///
/// A path is changed when the fingerprints differ, when it is new since the
/// last commit, or when it was deleted from the working tree. A path missing
/// on both sides is not a change.
pub fn detect_changes<'a, V, I>(vcs: &V, output_dir: &Path, candidates: I) -> ChangeSet
where
    V: Vcs + ?Sized,
    I: IntoIterator<Item = &'a PathBuf>,
{
    let unique: BTreeSet<&PathBuf> = candidates.into_iter().collect();
    let mut set = ChangeSet::default();

    for path in unique {
        if !paths::is_within(path, output_dir) {
            tracing::warn!(path = %path.display(), "ignoring change outside the output directory");
            set.ignored.push(path.clone());
            continue;
        }
        let compared = vcs
            .working_tree_fingerprint(path)
            .and_then(|tree| Ok((tree, vcs.last_commit_fingerprint(path)?)));
        match compared {
            Ok((None, None)) => {}
            Ok((tree, head)) if tree == head => {}
            Ok(_) => set.changed.push(path.clone()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "fingerprint failed; treating as changed");
                set.errors.push(DetectionError {
                    path: path.clone(),
                    reason: e.to_string(),
                });
                set.changed.push(path.clone());
            }
        }
    }
    set
}
