//! Character-limit generation.
//!
//! Builds the plan (every source at every configured limit), runs the
//! summarizer with bounded fan-out, enforces the length bound, and applies
//! results one at a time to the registry and the tracker. A failed job only
//! affects its own document.

use crate::config::Config;
use crate::document::{DerivedDocument, DocKey};
use crate::error::{GenerationError, Result};
use crate::index;
use crate::registry::Registry;
use crate::score::{self, Priority};
use crate::state::WorkflowTracker;
use crate::summarize::Summarizer;
use crate::truncate::enforce_limit;
use crate::types::WorkflowState;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// One `(source, limit)` unit of work.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub key: DocKey,
    pub category: String,
    pub body: String,
    pub priority: Priority,
    /// Registry record as it was before this run touched it.
    pub previous: Option<DerivedDocument>,
}

/// Ordered by score descending, then id, then limit.
pub fn plan(registry: &Registry, config: &Config) -> Vec<GenerationJob> {
    let limits = config.effective_limits();
    let mut jobs = Vec::with_capacity(registry.list_sources().len() * limits.len());
    for source in registry.list_sources() {
        let priority = score::score(source, &config.priority);
        for &limit in &limits {
            jobs.push(GenerationJob {
                key: DocKey::new(source.id.clone(), limit),
                category: source.category.clone(),
                body: source.body().to_string(),
                priority,
                previous: registry.get_derived(&source.id, limit).cloned(),
            });
        }
    }
    jobs.sort_by(|a, b| {
        b.priority
            .score
            .cmp(&a.priority.score)
            .then_with(|| a.key.cmp(&b.key))
    });
    jobs
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// New content written.
    Generated,
    /// Output identical to the file on disk; nothing written.
    Unchanged,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub document: String,
    pub path: PathBuf,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    pub outcomes: Vec<JobOutcome>,
    /// Derived files removed because their source or limit is gone.
    pub pruned: Vec<PathBuf>,
    /// Set when `llms.txt` was rewritten or removed.
    pub index: Option<PathBuf>,
    /// Every path this run may have touched, for change detection.
    #[serde(skip)]
    pub candidates: BTreeSet<PathBuf>,
}

impl GenerationReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| o.status == JobStatus::Failed)
    }

    /// At least one job ran and none produced usable content.
    pub fn is_total_failure(&self) -> bool {
        self.attempted() > 0 && self.count(JobStatus::Failed) == self.attempted()
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

type JobResult = std::result::Result<String, GenerationError>;

pub struct Generator<'a> {
    config: &'a Config,
    summarizer: Arc<dyn Summarizer>,
}

impl<'a> Generator<'a> {
    pub fn new(config: &'a Config, summarizer: Arc<dyn Summarizer>) -> Self {
        Self { config, summarizer }
    }

    /// Generate every planned document, prune orphans and refresh the index.
    /// The tracker is saved after each applied result.
    pub fn run(&self, registry: &mut Registry, tracker: &mut WorkflowTracker) -> Result<GenerationReport> {
        let root = registry.root().to_path_buf();
        let jobs = plan(registry, self.config);
        let mut report = GenerationReport::default();
        tracing::info!(jobs = jobs.len(), "generating derived documents");

        for job in &jobs {
            registry.derived_entry(&job.key, &job.category).mark_in_progress();
        }

        let width = self.config.generation.concurrency.max(1);
        let timeout = Duration::from_secs(self.config.generation.timeout_seconds.max(1));
        for chunk in jobs.chunks(width) {
            let results = self.execute(chunk, timeout);
            for (job, result) in chunk.iter().zip(results) {
                let outcome = self.apply(registry, tracker, job, result)?;
                tracker.save(&root)?;
                report.candidates.insert(outcome.path.clone());
                report.outcomes.push(outcome);
            }
        }

        for (key, path) in registry.prune_orphans(&self.config.effective_limits())? {
            tracker.forget(&key);
            report.pruned.push(path);
        }
        tracker.save(&root)?;

        report.index = index::update(registry, self.config)?;
        report
            .candidates
            .insert(crate::paths::index_rel_path(&self.config.output.dir));
        report.candidates.extend(registry.removed_paths().iter().cloned());
        Ok(report)
    }

    /// Run one chunk concurrently. Results come back in job order; a job that
    /// misses the deadline is reported as a timeout and its thread abandoned.
    fn execute(&self, chunk: &[GenerationJob], timeout: Duration) -> Vec<JobResult> {
        let mut results: Vec<Option<JobResult>> = Vec::with_capacity(chunk.len());
        let (tx, rx) = mpsc::channel::<(usize, JobResult)>();
        let mut pending = 0;

        for (i, job) in chunk.iter().enumerate() {
            if job.body.trim().is_empty() {
                results.push(Some(Err(GenerationError::EmptySource(job.key.document_id.clone()))));
                continue;
            }
            results.push(None);
            pending += 1;

            let tx = tx.clone();
            let summarizer = Arc::clone(&self.summarizer);
            let body = job.body.clone();
            let key = job.key.clone();
            let spawned = thread::Builder::new()
                .name(format!("llms-gen-{key}"))
                .spawn(move || {
                    let result = summarizer
                        .summarize(&body, key.character_limit)
                        .map_err(|e| GenerationError::Summarizer {
                            document: key.document_id.clone(),
                            message: e.0,
                        });
                    // The receiver is gone if the job already timed out.
                    let _ = tx.send((i, result));
                });
            if let Err(e) = spawned {
                pending -= 1;
                results[i] = Some(Err(GenerationError::Summarizer {
                    document: job.key.document_id.clone(),
                    message: format!("failed to spawn worker: {e}"),
                }));
            }
        }
        drop(tx);

        let deadline = Instant::now() + timeout;
        while pending > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((i, result)) => {
                    results[i] = Some(result);
                    pending -= 1;
                }
                Err(_) => break,
            }
        }

        chunk
            .iter()
            .zip(results)
            .map(|(job, result)| {
                result.unwrap_or_else(|| {
                    Err(GenerationError::Timeout {
                        document: job.key.document_id.clone(),
                        limit: job.key.character_limit,
                        seconds: timeout.as_secs(),
                    })
                })
            })
            .collect()
    }

    fn apply(
        &self,
        registry: &mut Registry,
        tracker: &mut WorkflowTracker,
        job: &GenerationJob,
        result: JobResult,
    ) -> Result<JobOutcome> {
        let path = crate::paths::derived_rel_path(
            registry.output_dir(),
            &job.category,
            &job.key.document_id,
            job.key.character_limit,
        );
        let outcome = |status, error: Option<String>| JobOutcome {
            document: job.key.to_string(),
            path: path.clone(),
            status,
            error,
        };

        let produced = result.and_then(|raw| {
            let trunc = &self.config.truncation;
            let content = enforce_limit(raw.trim(), job.key.character_limit, trunc.strategy, &trunc.marker);
            if content.trim().is_empty() {
                return Err(GenerationError::Summarizer {
                    document: job.key.document_id.clone(),
                    message: "summarizer returned no content".to_string(),
                });
            }
            Ok(content)
        });

        let content = match produced {
            Ok(content) => content,
            Err(e) => {
                let message = self.record_failure(registry, tracker, job, &path, e)?;
                return Ok(outcome(JobStatus::Failed, Some(message)));
            }
        };

        if self.is_unchanged(registry, job, &content, &path) {
            if let Some(previous) = &job.previous {
                registry.upsert_derived(previous.clone());
            }
            if matches!(
                tracker.state_of(&job.key),
                WorkflowState::NotStarted | WorkflowState::Failed
            ) {
                tracker.record_generated(&job.key, &path)?;
            }
            tracing::debug!(document = %job.key, "unchanged");
            return Ok(outcome(JobStatus::Unchanged, None));
        }

        let mut doc = job.previous.clone().unwrap_or_else(|| {
            DerivedDocument::new(job.key.document_id.clone(), job.category.clone(), job.key.character_limit)
        });
        doc.category = job.category.clone();
        doc.mark_completed(content, job.priority.score, job.priority.tier, Utc::now())?;

        if let Err(e) = registry.persist(&doc) {
            let err = GenerationError::Write {
                path: path.clone(),
                source: Box::new(e),
            };
            let message = self.record_failure(registry, tracker, job, &path, err)?;
            return Ok(outcome(JobStatus::Failed, Some(message)));
        }
        registry.upsert_derived(doc);
        tracker.record_generated(&job.key, &path)?;
        tracing::debug!(document = %job.key, path = %path.display(), "generated");
        Ok(outcome(JobStatus::Generated, None))
    }

    fn is_unchanged(&self, registry: &Registry, job: &GenerationJob, content: &str, path: &Path) -> bool {
        let Some(previous) = &job.previous else {
            return false;
        };
        previous.matches(content, job.priority.score, job.priority.tier, &job.category)
            && registry.location(&job.key) == Some(path)
            && registry.root().join(path).is_file()
    }

    fn record_failure(
        &self,
        registry: &mut Registry,
        tracker: &mut WorkflowTracker,
        job: &GenerationJob,
        path: &Path,
        error: GenerationError,
    ) -> Result<String> {
        tracing::warn!(document = %job.key, error = %error, "generation failed");
        registry.derived_entry(&job.key, &job.category).mark_failed();
        let message = error.to_string();
        // Prefer the path the previous content still lives at.
        let tracked = registry
            .location(&job.key)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.to_path_buf());
        tracker.record_failed(&job.key, &tracked, message.clone())?;
        Ok(message)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
