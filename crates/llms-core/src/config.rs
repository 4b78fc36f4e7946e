use crate::error::{LlmsError, Result};
use crate::paths;
use crate::truncate::TruncationStrategy;
use crate::types::PriorityTier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SourcesConfig / OutputConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_source_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_SOURCE_DIR)
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string(), "mdx".to_string(), "txt".to_string()]
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            dir: default_source_dir(),
            extensions: default_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Write `llms.txt` at the root of the output directory.
    #[serde(default = "default_true")]
    pub index: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_OUTPUT_DIR)
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            index: true,
        }
    }
}

// ---------------------------------------------------------------------------
// PriorityConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityConfig {
    #[serde(default = "default_base")]
    pub base: i32,
    /// Characters of source text per size point.
    #[serde(default = "default_size_divisor")]
    pub size_divisor: usize,
    #[serde(default = "default_size_cap")]
    pub size_cap: i32,
    /// Points subtracted per directory level below the source root.
    #[serde(default = "default_depth_penalty")]
    pub depth_penalty: i32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub category_weights: BTreeMap<String, i32>,
    #[serde(default = "default_high_threshold")]
    pub high_threshold: u8,
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: u8,
}

fn default_base() -> i32 {
    40
}

fn default_size_divisor() -> usize {
    1000
}

fn default_size_cap() -> i32 {
    30
}

fn default_depth_penalty() -> i32 {
    5
}

fn default_high_threshold() -> u8 {
    70
}

fn default_medium_threshold() -> u8 {
    40
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            size_divisor: default_size_divisor(),
            size_cap: default_size_cap(),
            depth_penalty: default_depth_penalty(),
            category_weights: BTreeMap::new(),
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
        }
    }
}

impl PriorityConfig {
    pub fn tier_for(&self, score: u8) -> PriorityTier {
        if score >= self.high_threshold {
            PriorityTier::High
        } else if score >= self.medium_threshold {
            PriorityTier::Medium
        } else {
            PriorityTier::Low
        }
    }

    pub fn category_weight(&self, category: &str) -> i32 {
        self.category_weights.get(category).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// TruncationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncationConfig {
    #[serde(default)]
    pub strategy: TruncationStrategy,
    /// Appended after a cut; counted inside the limit.
    #[serde(default = "default_marker")]
    pub marker: String,
}

fn default_marker() -> String {
    "…".to_string()
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            strategy: TruncationStrategy::default(),
            marker: default_marker(),
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum summarizer calls in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_generation_timeout")]
    pub timeout_seconds: u64,
}

fn default_concurrency() -> usize {
    4
}

fn default_generation_timeout() -> u64 {
    120
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_seconds: default_generation_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// SummarizerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SummarizerConfig {
    /// Built-in heading and lead-sentence outline.
    #[default]
    Outline,
    /// External program: source on stdin, summary on stdout.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// SyncConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
    /// Value of the `LLMS-Sync:` trailer on sync commits.
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default = "default_vcs_timeout")]
    pub timeout_seconds: u64,
    /// Pass `--no-verify` so pre-commit hooks don't reject generated files.
    #[serde(default = "default_true")]
    pub no_verify: bool,
    #[serde(default = "default_lock_stale_minutes")]
    pub lock_stale_minutes: u64,
}

fn default_commit_message() -> String {
    "chore(llms): sync derived documents".to_string()
}

fn default_tag() -> String {
    "sync".to_string()
}

fn default_vcs_timeout() -> u64 {
    60
}

fn default_lock_stale_minutes() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            commit_message: default_commit_message(),
            tag: default_tag(),
            timeout_seconds: default_vcs_timeout(),
            no_verify: true,
            lock_stale_minutes: default_lock_stale_minutes(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default = "default_limits")]
    pub limits: Vec<usize>,
    #[serde(default)]
    pub priority: PriorityConfig,
    #[serde(default)]
    pub truncation: TruncationConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_version() -> u32 {
    1
}

fn default_limits() -> Vec<usize> {
    vec![1000, 4000, 16000]
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            sources: SourcesConfig::default(),
            output: OutputConfig::default(),
            limits: default_limits(),
            priority: PriorityConfig::default(),
            truncation: TruncationConfig::default(),
            generation: GenerationConfig::default(),
            summarizer: SummarizerConfig::default(),
            sync: SyncConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(LlmsError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Configured limits, deduplicated and ascending, zero dropped.
    pub fn effective_limits(&self) -> Vec<usize> {
        let mut limits: Vec<usize> = self.limits.iter().copied().filter(|l| *l > 0).collect();
        limits.sort_unstable();
        limits.dedup();
        limits
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        if self.limits.is_empty() {
            push(WarnLevel::Error, "no character limits configured".to_string());
        }
        if self.limits.contains(&0) {
            push(WarnLevel::Error, "character limit 0 is not allowed".to_string());
        }
        if self.effective_limits().len() != self.limits.iter().filter(|l| **l > 0).count() {
            push(WarnLevel::Warning, "duplicate character limits are ignored".to_string());
        }

        let p = &self.priority;
        if p.high_threshold > 100 || p.medium_threshold > 100 {
            push(
                WarnLevel::Error,
                "priority thresholds must be within 0..=100".to_string(),
            );
        }
        if p.medium_threshold > p.high_threshold {
            push(
                WarnLevel::Error,
                format!(
                    "priority.medium_threshold ({}) is above priority.high_threshold ({})",
                    p.medium_threshold, p.high_threshold
                ),
            );
        }
        if p.size_divisor == 0 {
            push(
                WarnLevel::Error,
                "priority.size_divisor must be greater than 0".to_string(),
            );
        }

        if !is_plain_relative(&self.output.dir) {
            push(
                WarnLevel::Error,
                format!(
                    "output.dir '{}' must be a relative path inside the project",
                    self.output.dir.display()
                ),
            );
        }
        if !is_plain_relative(&self.sources.dir) {
            push(
                WarnLevel::Error,
                format!(
                    "sources.dir '{}' must be a relative path inside the project",
                    self.sources.dir.display()
                ),
            );
        }
        if self.output.dir == self.sources.dir || self.sources.dir.starts_with(&self.output.dir) {
            push(
                WarnLevel::Error,
                "sources.dir must not be inside output.dir".to_string(),
            );
        } else if self.output.dir.starts_with(&self.sources.dir) {
            push(
                WarnLevel::Warning,
                "output.dir is inside sources.dir; derived files are excluded from discovery"
                    .to_string(),
            );
        }
        if self.sources.extensions.is_empty() {
            push(
                WarnLevel::Warning,
                "sources.extensions is empty; no sources will be discovered".to_string(),
            );
        }

        if self.generation.concurrency == 0 {
            push(
                WarnLevel::Warning,
                "generation.concurrency is 0; running one job at a time".to_string(),
            );
        }
        if self.generation.timeout_seconds == 0 {
            push(
                WarnLevel::Error,
                "generation.timeout_seconds must be greater than 0".to_string(),
            );
        }

        if let SummarizerConfig::Command { program, .. } = &self.summarizer {
            if program.trim().is_empty() {
                push(
                    WarnLevel::Error,
                    "summarizer command has an empty program".to_string(),
                );
            }
        }

        if self.sync.tag.is_empty() || self.sync.tag.chars().any(char::is_whitespace) {
            push(
                WarnLevel::Error,
                format!("sync.tag '{}' must be a single non-empty word", self.sync.tag),
            );
        }
        if self.sync.commit_message.trim().is_empty() {
            push(WarnLevel::Error, "sync.commit_message is empty".to_string());
        }

        let marker_len = self.truncation.marker.chars().count();
        if let Some(smallest) = self.effective_limits().first() {
            if marker_len >= *smallest {
                push(
                    WarnLevel::Warning,
                    format!(
                        "truncation marker ({marker_len} chars) does not fit limit {smallest}; it will be dropped"
                    ),
                );
            }
        }

        warnings
    }

    /// Fail on any error-level validation finding. Warnings pass.
    pub fn ensure_valid(&self) -> Result<()> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(LlmsError::InvalidConfig(errors.join("; ")))
        }
    }
}

fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
