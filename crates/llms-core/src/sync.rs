//! Post-commit sync orchestration.
//!
//! One run: guard against our own commits, take the run lock, generate,
//! detect what changed under the output directory, and commit exactly those
//! paths in a single follow-up commit.
//!
//! ```text
//! Idle ──▶ Generating ──▶ DetectingChanges ──▶ Committing ──▶ Done
//!  │  └──────────────────────────────┐   └────────────────────────▶ Done
//!  └─▶ Done (skipped)                ▼                  │
//!                                  Failed ◀─────────────┘
//! ```

use crate::config::Config;
use crate::detect::{detect_changes, ChangeSet, DetectionError};
use crate::error::{CommitError, LlmsError, Result};
use crate::generator::{Generator, JobStatus};
use crate::lock::RunLock;
use crate::registry::Registry;
use crate::state::WorkflowTracker;
use crate::summarize::Summarizer;
use crate::types::WorkflowState;
use crate::vcs::{CommitResult, Vcs};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Phase / outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Generating,
    DetectingChanges,
    Committing,
    Done,
    Failed,
}

impl SyncPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Generating => "generating",
            SyncPhase::DetectingChanges => "detecting_changes",
            SyncPhase::Committing => "committing",
            SyncPhase::Done => "done",
            SyncPhase::Failed => "failed",
        }
    }

    pub fn can_advance(self, to: SyncPhase) -> bool {
        use SyncPhase::*;
        matches!(
            (self, to),
            (Idle, Generating | Done)
                | (Generating, DetectingChanges)
                | (DetectingChanges, Committing | Done)
                | (Committing, Done)
                | (Idle | Generating | DetectingChanges | Committing, Failed)
        )
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Nothing under the output directory differs from HEAD.
    NoChange,
    Committed,
    Failed,
    /// HEAD is a sync commit; the run did nothing.
    Skipped,
    /// Generate-only run that left changes in the working tree.
    Uncommitted,
}

impl SyncOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncOutcome::NoChange => "no_change",
            SyncOutcome::Committed => "committed",
            SyncOutcome::Failed => "failed",
            SyncOutcome::Skipped => "skipped",
            SyncOutcome::Uncommitted => "uncommitted",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Full run, ending in a sync commit when anything changed.
    Commit,
    /// Generate and detect only; never stages or commits.
    GenerateOnly,
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation, checked between phases.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// SyncRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    /// Phase the run was in when it failed.
    pub phase: SyncPhase,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationSummary {
    pub attempted: usize,
    pub generated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub pruned: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<JobFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    pub document: String,
    pub error: String,
}

/// Record of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub mode: SyncMode,
    pub triggering_commit: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub phase: SyncPhase,
    /// Every phase entered, in order, starting with `idle`.
    pub phases: Vec<SyncPhase>,
    pub outcome: SyncOutcome,
    pub changed_paths: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub committed_paths: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored_paths: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detection_errors: Vec<DetectionError>,
    pub commit_id: Option<String>,
    pub generation: Option<GenerationSummary>,
    pub failure: Option<RunFailure>,
}

impl SyncRun {
    fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            triggering_commit: None,
            started_at: Utc::now(),
            finished_at: None,
            phase: SyncPhase::Idle,
            phases: vec![SyncPhase::Idle],
            outcome: SyncOutcome::NoChange,
            changed_paths: Vec::new(),
            committed_paths: Vec::new(),
            ignored_paths: Vec::new(),
            detection_errors: Vec::new(),
            commit_id: None,
            generation: None,
            failure: None,
        }
    }

    fn advance(&mut self, to: SyncPhase) -> Result<()> {
        if !self.phase.can_advance(to) {
            return Err(LlmsError::InvalidTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
                reason: "not a sync phase transition".to_string(),
            });
        }
        tracing::debug!(from = %self.phase, to = %to, "sync phase");
        self.phase = to;
        self.phases.push(to);
        Ok(())
    }

    fn finish(&mut self, outcome: SyncOutcome) -> Result<()> {
        self.advance(SyncPhase::Done)?;
        self.outcome = outcome;
        Ok(())
    }

    fn fail(&mut self, error: &LlmsError) {
        tracing::warn!(phase = %self.phase, error = %error, "sync run failed");
        self.failure = Some(RunFailure {
            phase: self.phase,
            message: error.to_string(),
        });
        self.phase = SyncPhase::Failed;
        self.phases.push(SyncPhase::Failed);
        self.outcome = SyncOutcome::Failed;
    }

    /// Process exit status for this run: non-zero only on failure.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            SyncOutcome::Failed => 1,
            _ => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// SyncOrchestrator
// ---------------------------------------------------------------------------

pub struct SyncOrchestrator<'a, V: Vcs + ?Sized> {
    root: PathBuf,
    config: &'a Config,
    vcs: &'a V,
    summarizer: Arc<dyn Summarizer>,
    cancel: CancelFlag,
    mode: SyncMode,
}

impl<'a, V: Vcs + ?Sized> SyncOrchestrator<'a, V> {
    pub fn new(root: &Path, config: &'a Config, vcs: &'a V, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            vcs,
            summarizer,
            cancel: CancelFlag::new(),
            mode: SyncMode::Commit,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    /// Execute one run to completion. Never panics on run errors: failures are
    /// reported in the returned record with the phase they happened in.
    pub fn run(&self) -> SyncRun {
        let mut run = SyncRun::new(self.mode);
        if let Err(e) = self.try_run(&mut run) {
            run.fail(&e);
        }
        run.finished_at = Some(Utc::now());
        tracing::info!(
            outcome = %run.outcome,
            changed = run.changed_paths.len(),
            commit = run.commit_id.as_deref().unwrap_or("-"),
            "sync finished"
        );
        run
    }

    fn try_run(&self, run: &mut SyncRun) -> Result<()> {
        self.config.ensure_valid()?;
        run.triggering_commit = self.vcs.head_commit_id()?;

        if self.mode == SyncMode::Commit && self.vcs.current_commit_is_sync_commit()? {
            tracing::info!(
                commit = run.triggering_commit.as_deref().unwrap_or("-"),
                "HEAD is a sync commit; nothing to do"
            );
            return run.finish(SyncOutcome::Skipped);
        }

        self.check_cancel(SyncPhase::Generating)?;
        let _lock = RunLock::acquire(&self.root, self.config.sync.lock_stale_minutes)?;
        run.advance(SyncPhase::Generating)?;

        let mut registry = Registry::load(&self.root, self.config)?;
        let mut tracker = WorkflowTracker::load(&self.root)?;
        let report = Generator::new(self.config, Arc::clone(&self.summarizer))
            .run(&mut registry, &mut tracker)?;
        run.generation = Some(GenerationSummary {
            attempted: report.attempted(),
            generated: report.count(JobStatus::Generated),
            unchanged: report.count(JobStatus::Unchanged),
            failed: report.count(JobStatus::Failed),
            pruned: report.pruned.len(),
            failures: report
                .failures()
                .map(|o| JobFailure {
                    document: o.document.clone(),
                    error: o.error.clone().unwrap_or_default(),
                })
                .collect(),
        });
        if report.is_total_failure() {
            return Err(LlmsError::TotalGenerationFailure(report.attempted()));
        }

        self.check_cancel(SyncPhase::DetectingChanges)?;
        run.advance(SyncPhase::DetectingChanges)?;
        let changes = detect_changes(self.vcs, &self.config.output.dir, &report.candidates);
        run.changed_paths = changes.changed.clone();
        run.ignored_paths = changes.ignored.clone();
        run.detection_errors = changes.errors.clone();

        // Generated files already identical to HEAD are in sync.
        let in_sync: Vec<&PathBuf> = report
            .candidates
            .iter()
            .filter(|p| !changes.is_changed(p))
            .collect();
        mark_synced(&mut registry, &mut tracker, in_sync)?;
        tracker.save(&self.root)?;

        if !changes.any_changes() {
            return run.finish(SyncOutcome::NoChange);
        }
        if self.mode == SyncMode::GenerateOnly {
            return run.finish(SyncOutcome::Uncommitted);
        }

        self.check_cancel(SyncPhase::Committing)?;
        run.advance(SyncPhase::Committing)?;
        let (commit_id, committed) = self.commit(&changes)?;
        mark_synced(&mut registry, &mut tracker, &committed)?;
        tracker.save(&self.root)?;
        tracing::info!(
            commit = commit_id.as_deref().unwrap_or("-"),
            paths = committed.len(),
            "committed derived documents"
        );
        run.commit_id = commit_id;
        run.committed_paths = committed;
        run.finish(SyncOutcome::Committed)
    }

    fn check_cancel(&self, next: SyncPhase) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LlmsError::Cancelled(next.to_string()));
        }
        Ok(())
    }

    /// Stage, verify and commit. Any failure unstages what this run staged.
    fn commit(&self, changes: &ChangeSet) -> Result<(Option<String>, Vec<PathBuf>)> {
        let paths = &changes.changed;
        let attempt = || -> std::result::Result<(Option<String>, Vec<PathBuf>), CommitError> {
            self.vcs
                .stage(paths)
                .map_err(|e| CommitError::Stage(e.to_string()))?;
            let staged = self
                .vcs
                .staged_paths(paths)
                .map_err(|e| CommitError::Stage(e.to_string()))?;
            if staged.is_empty() {
                return Err(CommitError::NothingStaged(paths.len()));
            }
            let sync = &self.config.sync;
            match self.vcs.commit(&sync.commit_message, &sync.tag, &staged) {
                Ok(CommitResult {
                    ok: true,
                    commit_id,
                }) => Ok((commit_id, staged)),
                Ok(_) => Err(CommitError::Commit("vcs reported an unsuccessful commit".to_string())),
                Err(e) => Err(CommitError::Commit(e.to_string())),
            }
        };

        attempt().map_err(|e| {
            if let Err(unstage) = self.vcs.unstage(paths) {
                tracing::warn!(error = %unstage, "failed to unstage after commit failure");
            }
            LlmsError::from(e)
        })
    }
}

/// Move `content_generated` entries tracked at `paths` to `synced`.
fn mark_synced<'p, I>(registry: &mut Registry, tracker: &mut WorkflowTracker, paths: I) -> Result<()>
where
    I: IntoIterator<Item = &'p PathBuf>,
{
    for path in paths {
        for key in tracker.keys_at(path) {
            if tracker.state_of(&key) != WorkflowState::ContentGenerated {
                continue;
            }
            tracker.record_synced(&key)?;
            if let Some(doc) = registry.get_derived_mut(&key) {
                doc.mark_synced();
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DerivedDocument;
    use crate::paths;
    use crate::summarize::{OutlineSummarizer, SummarizeError};
    use crate::testing::MemoryVcs;
    use crate::truncate::char_len;

    fn project(files: &[(&str, &str)]) -> (MemoryVcs, Config) {
        let vcs = MemoryVcs::new();
        for (rel, text) in files {
            vcs.write(rel, text);
        }
        let mut config = Config::new("demo");
        config.limits = vec![40, 400];
        config.save(vcs.root()).unwrap();
        vcs.user_commit("docs: add pages");
        (vcs, config)
    }

    fn run(vcs: &MemoryVcs, config: &Config) -> SyncRun {
        SyncOrchestrator::new(vcs.root(), config, vcs, Arc::new(OutlineSummarizer)).run()
    }

    fn state(vcs: &MemoryVcs, id: &str, limit: usize) -> WorkflowState {
        WorkflowTracker::load(vcs.root())
            .unwrap()
            .state_of(&crate::document::DocKey::new(id, limit))
    }

    const GUIDE: &str = "# Guide\n\nInstall the tool first. Then run it.\n\n## Usage\n\nCall sync after every commit so agents see fresh docs.\n";

    #[test]
    fn first_run_commits_every_derived_file() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE), ("docs/faq.md", "# FAQ\n\nAsk.\n")]);
        let run = run(&vcs, &config);

        assert_eq!(run.outcome, SyncOutcome::Committed, "{:?}", run.failure);
        assert_eq!(
            run.phases,
            vec![
                SyncPhase::Idle,
                SyncPhase::Generating,
                SyncPhase::DetectingChanges,
                SyncPhase::Committing,
                SyncPhase::Done
            ]
        );
        let commits = vcs.sync_commits();
        assert_eq!(commits.len(), 1);
        // 2 sources x 2 limits + index
        assert_eq!(commits[0].paths.len(), 5);
        assert_eq!(commits[0].paths, run.changed_paths);
        assert!(commits[0].paths.iter().all(|p| p.starts_with("llms")));
        assert_eq!(run.commit_id, Some(commits[0].id.clone()));
        assert_eq!(state(&vcs, "guide", 40), WorkflowState::Synced);
        assert!(vcs.staged().is_empty());
    }

    #[test]
    fn invalid_config_fails_before_generating() {
        let (vcs, mut config) = project(&[("docs/guide.md", GUIDE)]);
        config.sources.dir = PathBuf::from("llms");
        vcs.write("llms/notes.md", "# Notes\n\nKept by hand.\n");

        let run = run(&vcs, &config);
        assert_eq!(run.outcome, SyncOutcome::Failed);
        let failure = run.failure.unwrap();
        assert_eq!(failure.phase, SyncPhase::Idle);
        assert!(failure.message.contains("sources.dir"), "{}", failure.message);
        assert!(run.generation.is_none());
        assert!(vcs.sync_commits().is_empty());
        assert!(!vcs.root().join("llms/general").exists());
        assert!(!paths::lock_path(vcs.root()).exists());
    }

    #[test]
    fn every_derived_file_within_limit() {
        let long = format!("# Long\n\n{}", "A sentence that goes on. ".repeat(200));
        let (vcs, config) = project(&[("docs/long.md", &long)]);
        run(&vcs, &config);
        for limit in [40, 400] {
            let path = vcs
                .root()
                .join(paths::derived_rel_path(Path::new("llms"), "general", "long", limit));
            let doc = DerivedDocument::load(&path).unwrap();
            assert!(char_len(&doc.content) <= limit);
        }
    }

    #[test]
    fn sync_commit_head_is_skipped() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE)]);
        run(&vcs, &config);
        vcs.write("docs/guide.md", "# Guide\n\nRewritten entirely.\n");

        let second = run(&vcs, &config);
        assert_eq!(second.outcome, SyncOutcome::Skipped);
        assert_eq!(second.phases, vec![SyncPhase::Idle, SyncPhase::Done]);
        assert!(second.generation.is_none());
        assert_eq!(vcs.sync_commits().len(), 1);
        assert!(vcs.staged().is_empty());
        // Nothing regenerated.
        let doc = DerivedDocument::load(&vcs.root().join("llms/general/guide.400.md")).unwrap();
        assert!(!doc.content.contains("Rewritten"));
    }

    #[test]
    fn unchanged_sources_produce_no_commit() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE)]);
        run(&vcs, &config);

        vcs.user_commit("chore: unrelated");
        let second = run(&vcs, &config);
        assert_eq!(second.outcome, SyncOutcome::NoChange);
        assert!(second.changed_paths.is_empty());
        assert_eq!(second.generation.as_ref().unwrap().unchanged, 2);

        vcs.user_commit("chore: unrelated again");
        assert_eq!(run(&vcs, &config).outcome, SyncOutcome::NoChange);
        assert_eq!(vcs.sync_commits().len(), 1);
    }

    #[test]
    fn edit_commits_only_affected_paths() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE), ("docs/faq.md", "# FAQ\n\nAsk.\n")]);
        run(&vcs, &config);

        vcs.write("docs/faq.md", "# FAQ\n\nAsk anything at all.\n");
        vcs.user_commit("docs: expand faq");
        let second = run(&vcs, &config);

        assert_eq!(second.outcome, SyncOutcome::Committed);
        let commits = vcs.sync_commits();
        assert_eq!(commits.len(), 2);
        assert_eq!(
            commits[1].paths,
            vec![
                PathBuf::from("llms/general/faq.40.md"),
                PathBuf::from("llms/general/faq.400.md"),
            ]
        );
        assert_eq!(second.committed_paths, commits[1].paths);
    }

    #[test]
    fn one_failing_document_does_not_block_others() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE), ("docs/broken.md", "# Broken\n")]);
        let summarizer: Arc<dyn Summarizer> = Arc::new(|src: &str, limit: usize| {
            if src.contains("Broken") {
                Err(SummarizeError("refused".to_string()))
            } else {
                OutlineSummarizer.summarize(src, limit)
            }
        });
        let run = SyncOrchestrator::new(vcs.root(), &config, &vcs, summarizer).run();

        assert_eq!(run.outcome, SyncOutcome::Committed);
        let summary = run.generation.unwrap();
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.generated, 2);
        assert!(vcs.head_has("llms/general/guide.40.md"));
        assert!(!vcs.head_has("llms/general/broken.40.md"));
        assert_eq!(state(&vcs, "broken", 40), WorkflowState::Failed);
        assert_eq!(state(&vcs, "guide", 40), WorkflowState::Synced);
    }

    #[test]
    fn total_failure_fails_in_generating() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE)]);
        let broken: Arc<dyn Summarizer> =
            Arc::new(|_: &str, _: usize| Err(SummarizeError("down".to_string())));
        let run = SyncOrchestrator::new(vcs.root(), &config, &vcs, broken).run();

        assert_eq!(run.outcome, SyncOutcome::Failed);
        assert_eq!(run.failure.as_ref().unwrap().phase, SyncPhase::Generating);
        assert_eq!(run.exit_code(), 1);
        assert!(vcs.sync_commits().is_empty());
    }

    #[test]
    fn deleted_source_commits_removal() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE), ("docs/old.md", "# Old\n\nGone soon.\n")]);
        run(&vcs, &config);
        assert!(vcs.head_has("llms/general/old.40.md"));

        std::fs::remove_file(vcs.root().join("docs/old.md")).unwrap();
        vcs.user_commit("docs: drop old page");
        let second = run(&vcs, &config);

        assert_eq!(second.outcome, SyncOutcome::Committed);
        assert!(!vcs.head_has("llms/general/old.40.md"));
        assert!(!vcs.head_has("llms/general/old.400.md"));
        assert!(second.changed_paths.contains(&PathBuf::from("llms/general/old.40.md")));
        assert!(second.changed_paths.contains(&PathBuf::from("llms/llms.txt")));
    }

    #[test]
    fn commit_failure_unstages_and_fails() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE)]);
        vcs.fail_commit();
        let run = run(&vcs, &config);

        assert_eq!(run.outcome, SyncOutcome::Failed);
        assert_eq!(run.failure.as_ref().unwrap().phase, SyncPhase::Committing);
        assert!(vcs.staged().is_empty());
        assert_eq!(vcs.unstaged(), run.changed_paths);
        assert_eq!(vcs.commits().len(), 1);
        assert_eq!(state(&vcs, "guide", 40), WorkflowState::ContentGenerated);
    }

    #[test]
    fn stage_failure_is_commit_error() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE)]);
        vcs.fail_stage();
        let run = run(&vcs, &config);
        assert_eq!(run.outcome, SyncOutcome::Failed);
        assert!(run.failure.unwrap().message.contains("staging failed"));
    }

    #[test]
    fn nothing_staged_fails() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE)]);
        vcs.ignore_stage();
        let run = run(&vcs, &config);
        assert_eq!(run.outcome, SyncOutcome::Failed);
        assert!(run.failure.unwrap().message.contains("nothing staged"));
        assert!(vcs.sync_commits().is_empty());
    }

    #[test]
    fn guard_failure_fails_in_idle() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE)]);
        vcs.fail_guard();
        let run = run(&vcs, &config);
        assert_eq!(run.outcome, SyncOutcome::Failed);
        assert_eq!(run.failure.unwrap().phase, SyncPhase::Idle);
        assert!(!vcs.root().join("llms").exists());
    }

    #[test]
    fn held_lock_rejects_run() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE)]);
        let _held = RunLock::acquire(vcs.root(), 30).unwrap();
        let run = run(&vcs, &config);
        assert_eq!(run.outcome, SyncOutcome::Failed);
        assert!(run.failure.unwrap().message.contains("lock"));
        assert!(!vcs.root().join("llms").exists());
    }

    #[test]
    fn lock_released_after_run() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE)]);
        run(&vcs, &config);
        assert!(!paths::lock_path(vcs.root()).exists());
    }

    #[test]
    fn cancelled_before_generating() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE)]);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let run = SyncOrchestrator::new(vcs.root(), &config, &vcs, Arc::new(OutlineSummarizer))
            .with_cancel(cancel)
            .run();
        assert_eq!(run.outcome, SyncOutcome::Failed);
        let failure = run.failure.unwrap();
        assert_eq!(failure.phase, SyncPhase::Idle);
        assert!(failure.message.contains("generating"));
        assert!(!vcs.root().join("llms").exists());
    }

    #[test]
    fn cancelled_during_generation_stops_before_detection() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE)]);
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let summarizer: Arc<dyn Summarizer> = Arc::new(move |src: &str, limit: usize| {
            trigger.cancel();
            OutlineSummarizer.summarize(src, limit)
        });
        let run = SyncOrchestrator::new(vcs.root(), &config, &vcs, summarizer)
            .with_cancel(cancel)
            .run();
        assert_eq!(run.failure.unwrap().phase, SyncPhase::Generating);
        assert!(vcs.sync_commits().is_empty());
        assert!(vcs.staged().is_empty());
    }

    #[test]
    fn generate_only_leaves_changes_uncommitted() {
        let (vcs, config) = project(&[("docs/guide.md", GUIDE)]);
        let run = SyncOrchestrator::new(vcs.root(), &config, &vcs, Arc::new(OutlineSummarizer))
            .with_mode(SyncMode::GenerateOnly)
            .run();
        assert_eq!(run.outcome, SyncOutcome::Uncommitted);
        assert_eq!(run.exit_code(), 0);
        assert!(!run.changed_paths.is_empty());
        assert!(vcs.staged().is_empty());
        assert!(vcs.sync_commits().is_empty());
    }

    #[test]
    fn phase_transitions_are_validated() {
        use SyncPhase::*;
        assert!(Idle.can_advance(Generating));
        assert!(DetectingChanges.can_advance(Done));
        assert!(!Idle.can_advance(Committing));
        assert!(!Generating.can_advance(Committing));
        assert!(!Done.can_advance(Failed));
        assert!(!Failed.can_advance(Idle));
    }
}
