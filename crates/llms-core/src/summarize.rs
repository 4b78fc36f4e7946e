//! The summarizer seam.
//!
//! Generation only needs `summarize(source, limit) -> text`. Two
//! implementations ship: [`OutlineSummarizer`], a deterministic outline of
//! headings and lead sentences, and [`CommandSummarizer`], which pipes the
//! source through an external program. Closures implement the trait too.

use crate::config::SummarizerConfig;
use crate::truncate::char_len;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Environment variable carrying the limit to a command summarizer.
pub const LIMIT_ENV: &str = "LLMS_CHARACTER_LIMIT";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SummarizeError(pub String);

pub trait Summarizer: Send + Sync {
    /// Reduce `source` to roughly `limit` characters. Overshooting is
    /// tolerated; the generator enforces the hard bound afterwards.
    fn summarize(&self, source: &str, limit: usize) -> Result<String, SummarizeError>;
}

impl<F> Summarizer for F
where
    F: Fn(&str, usize) -> Result<String, SummarizeError> + Send + Sync,
{
    fn summarize(&self, source: &str, limit: usize) -> Result<String, SummarizeError> {
        self(source, limit)
    }
}

/// Build the configured summarizer. Command programs run with `root` as
/// their working directory and are killed after `timeout`.
pub fn from_config(config: &SummarizerConfig, root: &Path, timeout: Duration) -> Arc<dyn Summarizer> {
    match config {
        SummarizerConfig::Outline => Arc::new(OutlineSummarizer),
        SummarizerConfig::Command { program, args } => Arc::new(CommandSummarizer {
            program: program.clone(),
            args: args.clone(),
            cwd: root.to_path_buf(),
            timeout,
        }),
    }
}

// ---------------------------------------------------------------------------
// OutlineSummarizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct OutlineSummarizer;

impl Summarizer for OutlineSummarizer {
    fn summarize(&self, source: &str, limit: usize) -> Result<String, SummarizeError> {
        let trimmed = source.trim();
        if char_len(trimmed) <= limit {
            return Ok(trimmed.to_string());
        }

        let mut out = String::new();
        let mut used = 0;
        for block in outline_blocks(trimmed) {
            let sep = if out.is_empty() { 0 } else { 2 };
            let len = char_len(&block);
            if used + sep + len > limit {
                break;
            }
            if sep > 0 {
                out.push_str("\n\n");
            }
            out.push_str(&block);
            used += sep + len;
        }

        if out.is_empty() {
            // Nothing fits whole; hand back the text and let truncation cut it.
            return Ok(trimmed.to_string());
        }
        Ok(out)
    }
}

/// Headings verbatim, then the first sentence of each prose paragraph and the
/// first item of each list. Fenced code is dropped.
fn outline_blocks(text: &str) -> Vec<String> {
    let mut paragraphs: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        let t = line.trim();
        if t.starts_with("```") || t.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if t.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        if t.starts_with('#') && !current.is_empty() {
            paragraphs.push(std::mem::take(&mut current));
        }
        current.push(t);
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    let mut blocks = Vec::new();
    for para in paragraphs {
        let mut lines = para.as_slice();
        if let Some(first) = lines.first() {
            if first.starts_with('#') {
                blocks.push(first.to_string());
                lines = &lines[1..];
            }
        }
        let Some(first) = lines.first() else {
            continue;
        };
        if is_list_item(first) {
            blocks.push(first.to_string());
        } else {
            blocks.push(first_sentence(&lines.join(" ")));
        }
    }
    blocks
}

fn is_list_item(line: &str) -> bool {
    line.starts_with("- ")
        || line.starts_with("* ")
        || line
            .split_once(". ")
            .map(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
}

fn first_sentence(text: &str) -> String {
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'?' | b'!') && bytes.get(i + 1).map_or(true, |n| *n == b' ') {
            return text[..=i].to_string();
        }
    }
    text.to_string()
}

// ---------------------------------------------------------------------------
// CommandSummarizer
// ---------------------------------------------------------------------------

/// Runs `program args...` with the source on stdin and `LLMS_CHARACTER_LIMIT`
/// set; stdout is the summary. A non-zero exit is a failure. A program still
/// running after `timeout` is killed.
#[derive(Debug, Clone)]
pub struct CommandSummarizer {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

impl Summarizer for CommandSummarizer {
    fn summarize(&self, source: &str, limit: usize) -> Result<String, SummarizeError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.cwd)
            .env(LIMIT_ENV, limit.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SummarizeError(format!("failed to spawn '{}': {e}", self.program)))?;

        // Feed stdin and drain both pipes on their own threads so a chatty
        // child can't deadlock against a full pipe.
        if let Some(mut stdin) = child.stdin.take() {
            let input = source.to_string();
            // A child that exits without reading all input is not an error by itself.
            thread::spawn(move || stdin.write_all(input.as_bytes()));
        }
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let out_reader = thread::spawn(move || drain(stdout));
        let err_reader = thread::spawn(move || drain(stderr));

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SummarizeError(format!(
                        "'{}' killed after {}s",
                        self.program,
                        self.timeout.as_secs()
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(SummarizeError(format!("failed to wait for '{}': {e}", self.program)));
                }
            }
        };
        let stdout = out_reader.join().unwrap_or_default();
        let stderr = err_reader.join().unwrap_or_default();

        if !status.success() {
            let hint: String = String::from_utf8_lossy(&stderr).chars().take(500).collect();
            return Err(SummarizeError(format!(
                "'{}' exited with {}: {}",
                self.program,
                status,
                hint.trim()
            )));
        }
        String::from_utf8(stdout)
            .map_err(|_| SummarizeError(format!("'{}' wrote non-UTF-8 output", self.program)))
    }
}

fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Install\n\nRun the installer. It takes a minute.\n\n```sh\ncurl example | sh\n```\n\n## Configure\n\n- set the token\n- restart\n\nThen verify the setup works! More text follows here.\n";

    #[test]
    fn short_source_returned_trimmed() {
        let out = OutlineSummarizer.summarize("  tiny doc \n", 100).unwrap();
        assert_eq!(out, "tiny doc");
    }

    #[test]
    fn outline_keeps_headings_and_leads() {
        let out = OutlineSummarizer.summarize(DOC, 120).unwrap();
        assert_eq!(
            out,
            "# Install\n\nRun the installer.\n\n## Configure\n\n- set the token\n\nThen verify the setup works!"
        );
        assert!(!out.contains("curl"));
    }

    #[test]
    fn outline_stops_at_budget() {
        let out = OutlineSummarizer.summarize(DOC, 30).unwrap();
        assert_eq!(out, "# Install\n\nRun the installer.");
    }

    #[test]
    fn outline_is_deterministic() {
        let a = OutlineSummarizer.summarize(DOC, 60).unwrap();
        let b = OutlineSummarizer.summarize(DOC, 60).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn closures_are_summarizers() {
        let s = |src: &str, limit: usize| -> Result<String, SummarizeError> {
            Ok(src.chars().take(limit).collect())
        };
        assert_eq!(s.summarize("abcdef", 3).unwrap(), "abc");
    }

    #[test]
    fn from_config_builds_outline() {
        let s = from_config(&SummarizerConfig::Outline, Path::new("."), Duration::from_secs(5));
        assert_eq!(s.summarize("x", 10).unwrap(), "x");
    }

    #[cfg(unix)]
    #[test]
    fn command_summarizer_pipes_stdin() {
        let s = CommandSummarizer {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "head -c \"$LLMS_CHARACTER_LIMIT\"".to_string()],
            cwd: std::env::temp_dir(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(s.summarize("abcdefgh", 4).unwrap(), "abcd");
    }

    #[cfg(unix)]
    #[test]
    fn command_summarizer_reports_failure() {
        let s = CommandSummarizer {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
            cwd: std::env::temp_dir(),
            timeout: Duration::from_secs(30),
        };
        let err = s.summarize("abc", 10).unwrap_err();
        assert!(err.0.contains("boom"));
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let s = CommandSummarizer {
            program: "definitely-not-a-real-summarizer-binary".to_string(),
            args: vec![],
            cwd: std::env::temp_dir(),
            timeout: Duration::from_secs(30),
        };
        assert!(s.summarize("abc", 10).unwrap_err().0.contains("failed to spawn"));
    }

    #[cfg(unix)]
    #[test]
    fn overrunning_command_is_killed() {
        let dir = tempfile::TempDir::new().unwrap();
        let s = CommandSummarizer {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 1; touch finished".to_string()],
            cwd: dir.path().to_path_buf(),
            timeout: Duration::from_millis(100),
        };
        let err = s.summarize("abc", 10).unwrap_err();
        assert!(err.0.contains("killed"), "{}", err.0);

        std::thread::sleep(Duration::from_millis(1500));
        assert!(!dir.path().join("finished").exists());
    }
}
