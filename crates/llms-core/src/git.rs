//! [`Vcs`] backed by the `git` executable.
//!
//! Every command runs from the project root with a per-command deadline; a
//! command that overruns is killed and reported as `VcsTimeout`, except
//! `git commit`, which once issued runs to completion (hooks included). Paths handed
//! in are root-relative, so `HEAD:./path` and `--relative` keep lookups
//! correct when the project root is a subdirectory of the repository.

use crate::error::{LlmsError, Result};
use crate::paths::to_git_path;
use crate::vcs::{self, CommitResult, Fingerprint, Vcs};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Output {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Output {
    fn stderr_hint(&self) -> String {
        let text: String = String::from_utf8_lossy(&self.stderr).chars().take(500).collect();
        text.trim().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct GitCli {
    git: PathBuf,
    root: PathBuf,
    timeout: Duration,
    no_verify: bool,
}

impl GitCli {
    pub fn new(root: &Path, timeout_seconds: u64, no_verify: bool) -> Result<Self> {
        let git = which::which("git").map_err(|_| LlmsError::GitNotFound)?;
        Ok(Self {
            git,
            root: root.to_path_buf(),
            timeout: Duration::from_secs(timeout_seconds.max(1)),
            no_verify,
        })
    }

    /// True if `root` is inside a git work tree.
    pub fn is_repository(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Absolute path of the repository's hooks directory.
    pub fn hooks_dir(&self) -> Result<PathBuf> {
        let out = self.git(&["rev-parse", "--git-path", "hooks"])?;
        let path = PathBuf::from(String::from_utf8_lossy(&out).trim());
        Ok(if path.is_absolute() {
            path
        } else {
            self.root.join(path)
        })
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        self.run_until(args, Some(self.timeout))
    }

    /// `None` waits for the command however long it takes.
    fn run_until(&self, args: &[&str], timeout: Option<Duration>) -> Result<Output> {
        tracing::debug!(args = ?args, "git");
        let mut child = Command::new(&self.git)
            .args(args)
            .current_dir(&self.root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LlmsError::Vcs(format!("failed to spawn git: {e}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let out_reader = thread::spawn(move || drain(stdout));
        let err_reader = thread::spawn(move || drain(stderr));

        let status = match timeout {
            None => child.wait()?,
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(LlmsError::VcsTimeout {
                            command: format!("git {}", args.join(" ")),
                            seconds: timeout.as_secs(),
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        };

        Ok(Output {
            status,
            stdout: out_reader.join().unwrap_or_default(),
            stderr: err_reader.join().unwrap_or_default(),
        })
    }

    /// Run and require success; returns stdout.
    fn git(&self, args: &[&str]) -> Result<Vec<u8>> {
        let out = self.run(args)?;
        if !out.status.success() {
            return Err(LlmsError::Vcs(format!(
                "git {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                out.status,
                out.stderr_hint()
            )));
        }
        Ok(out.stdout)
    }

    fn with_paths<'a>(base: &[&'a str], paths: &'a [String]) -> Vec<&'a str> {
        let mut args = base.to_vec();
        args.push("--");
        args.extend(paths.iter().map(String::as_str));
        args
    }
}

fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

fn git_paths(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| to_git_path(p)).collect()
}

impl Vcs for GitCli {
    fn head_commit_id(&self) -> Result<Option<String>> {
        let out = self.run(&["rev-parse", "--verify", "-q", "HEAD"])?;
        if !out.status.success() {
            return Ok(None);
        }
        let id = String::from_utf8_lossy(&out.stdout).trim().to_string();
        Ok((!id.is_empty()).then_some(id))
    }

    fn current_commit_is_sync_commit(&self) -> Result<bool> {
        if self.head_commit_id()?.is_none() {
            return Ok(false);
        }
        let message = self.git(&["log", "-1", "--format=%B", "HEAD"])?;
        Ok(vcs::sync_trailer(&String::from_utf8_lossy(&message)).is_some())
    }

    fn working_tree_fingerprint(&self, path: &Path) -> Result<Option<Fingerprint>> {
        match std::fs::read(self.root.join(path)) {
            Ok(bytes) => Ok(Some(Fingerprint::of(&bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LlmsError::Detection {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    fn last_commit_fingerprint(&self, path: &Path) -> Result<Option<Fingerprint>> {
        if self.head_commit_id()?.is_none() {
            return Ok(None);
        }
        let object = format!("HEAD:./{}", to_git_path(path));
        if !self.run(&["cat-file", "-e", &object])?.status.success() {
            return Ok(None);
        }
        let blob = self.git(&["cat-file", "blob", &object])?;
        Ok(Some(Fingerprint::of(&blob)))
    }

    fn stage(&self, paths: &[PathBuf]) -> Result<()> {
        let (present, missing): (Vec<PathBuf>, Vec<PathBuf>) =
            paths.iter().cloned().partition(|p| self.root.join(p).exists());
        if !present.is_empty() {
            let present = git_paths(&present);
            self.git(&Self::with_paths(&["add"], &present))?;
        }
        if !missing.is_empty() {
            let missing = git_paths(&missing);
            self.git(&Self::with_paths(
                &["rm", "--cached", "--ignore-unmatch", "-q"],
                &missing,
            ))?;
        }
        Ok(())
    }

    fn staged_paths(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let wanted = git_paths(paths);
        let out = self.git(&Self::with_paths(
            &["diff", "--cached", "--name-only", "--relative", "-z"],
            &wanted,
        ))?;
        Ok(String::from_utf8_lossy(&out)
            .split('\0')
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    fn unstage(&self, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let paths = git_paths(paths);
        if self.head_commit_id()?.is_some() {
            self.git(&Self::with_paths(&["reset", "-q"], &paths))?;
        } else {
            self.git(&Self::with_paths(
                &["rm", "--cached", "--ignore-unmatch", "-q", "-r"],
                &paths,
            ))?;
        }
        Ok(())
    }

    fn commit(&self, message: &str, tag: &str, paths: &[PathBuf]) -> Result<CommitResult> {
        let full = vcs::sync_commit_message(message, tag);
        let paths = git_paths(paths);
        let mut base = vec!["commit", "-q", "-m", full.as_str()];
        if self.no_verify {
            base.push("--no-verify");
        }
        let out = self.run_until(&Self::with_paths(&base, &paths), None)?;
        if !out.status.success() {
            tracing::warn!(status = %out.status, stderr = %out.stderr_hint(), "git commit failed");
            return Ok(CommitResult {
                ok: false,
                commit_id: None,
            });
        }
        Ok(CommitResult {
            ok: true,
            commit_id: self.head_commit_id()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
