//! The single global run lock, `.llms/sync.lock`.
//!
//! Taken with an exclusive create so two hook invocations racing on the same
//! repository cannot both generate. The file records who holds it; a lock
//! older than `sync.lock_stale_minutes` is assumed abandoned by a crashed run
//! and is reclaimed. Released on drop.

use crate::error::{LlmsError, Result};
use crate::io;
use crate::paths;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    info: LockInfo,
}

impl RunLock {
    /// `stale_minutes == 0` disables reclaiming.
    pub fn acquire(root: &Path, stale_minutes: u64) -> Result<Self> {
        let path = paths::lock_path(root);
        io::ensure_dir(&paths::llms_dir(root))?;

        let mut reclaimed = false;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let info = LockInfo {
                        pid: std::process::id(),
                        acquired_at: Utc::now(),
                    };
                    file.write_all(serde_yaml::to_string(&info)?.as_bytes())?;
                    tracing::debug!(path = %path.display(), pid = info.pid, "run lock acquired");
                    return Ok(Self { path, info });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if reclaimed || !is_stale(&path, stale_minutes) {
                        return Err(LlmsError::RunInProgress(path));
                    }
                    tracing::warn!(path = %path.display(), "reclaiming stale run lock");
                    io::remove_if_exists(&path)?;
                    reclaimed = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Current holder, if the lock file exists and is readable.
    pub fn holder(root: &Path) -> Option<LockInfo> {
        let text = std::fs::read_to_string(paths::lock_path(root)).ok()?;
        serde_yaml::from_str(&text).ok()
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}

fn is_stale(path: &Path, stale_minutes: u64) -> bool {
    if stale_minutes == 0 {
        return false;
    }
    // Beyond what a timestamp can express: never stale.
    let Some(window) = i64::try_from(stale_minutes).ok().and_then(Duration::try_minutes) else {
        return false;
    };
    let acquired_at = std::fs::read_to_string(path)
        .ok()
        .and_then(|t| serde_yaml::from_str::<LockInfo>(&t).ok())
        .map(|info| info.acquired_at)
        .or_else(|| {
            // Unreadable contents: a writer that died mid-write. Fall back to mtime.
            let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
            Some(DateTime::<Utc>::from(modified))
        });
    match acquired_at {
        Some(at) => Utc::now() - at > window,
        None => false,
    }
}
