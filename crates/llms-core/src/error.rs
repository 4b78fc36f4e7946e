use std::path::PathBuf;
use thiserror::Error;

/// Failure to produce one derived document. Isolated to that document: the
/// run records it and moves on.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("source '{0}' has no content to summarize")]
    EmptySource(String),

    #[error("summarizer failed for '{document}': {message}")]
    Summarizer { document: String, message: String },

    #[error("summarizer timed out for '{document}' at limit {limit} after {seconds}s")]
    Timeout {
        document: String,
        limit: usize,
        seconds: u64,
    },

    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: Box<LlmsError>,
    },
}

/// Staging or committing the derived-artifact changes failed.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("staging failed: {0}")]
    Stage(String),

    #[error("nothing staged although {0} path(s) were reported changed")]
    NothingStaged(usize),

    #[error("commit failed: {0}")]
    Commit(String),
}

#[derive(Debug, Error)]
pub enum LlmsError {
    #[error("not initialized: run 'llms init'")]
    NotInitialized,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("source directory not found: {0}")]
    SourceDirMissing(PathBuf),

    #[error("duplicate document id '{id}': {first} and {second}")]
    DuplicateDocument {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("derived document not found: {0}")]
    DocumentNotFound(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("invalid value '{value}' for {field}")]
    InvalidValue { field: &'static str, value: String },

    #[error("invalid header in {path}: {reason}")]
    InvalidHeader { path: PathBuf, reason: String },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("all {0} generation job(s) failed")]
    TotalGenerationFailure(usize),

    #[error("fingerprint failed for {path}: {reason}")]
    Detection { path: PathBuf, reason: String },

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error("another sync run holds the lock: {0}")]
    RunInProgress(PathBuf),

    #[error("run cancelled before {0}")]
    Cancelled(String),

    #[error("git executable not found on PATH")]
    GitNotFound,

    #[error("vcs command failed: {0}")]
    Vcs(String),

    #[error("vcs command '{command}' timed out after {seconds}s")]
    VcsTimeout { command: String, seconds: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LlmsError>;
