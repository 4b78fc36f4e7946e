//! Workflow state tracker.
//!
//! One entry per derived document, persisted in `.llms/state.yaml`. The file
//! is local bookkeeping (git-ignored) and can be rebuilt: a missing file
//! loads as an empty tracker and every document starts at `not_started`.
//!
//! Transitions:
//!
//! ```text
//! not_started ──generate──▶ content_generated ──commit──▶ synced
//!      │                       ▲   │    ▲                   │
//!      │                       │   └────┘ regenerate        │
//!      └──────▶ failed ────────┘ retry      ◀──regenerate───┘
//! ```
//!
//! Any state may move to `failed`. `synced` is never entered from
//! `not_started` or `failed`.

use crate::document::DocKey;
use crate::error::{LlmsError, Result};
use crate::paths;
use crate::types::WorkflowState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// TrackedDocument
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedDocument {
    pub document_id: String,
    pub character_limit: usize,
    pub state: WorkflowState,
    /// Repo-relative path of the derived file.
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// WorkflowTracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTracker {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub documents: BTreeMap<String, TrackedDocument>,
    pub last_updated: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl Default for WorkflowTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub fn can_transition(from: WorkflowState, to: WorkflowState) -> bool {
    use WorkflowState::*;
    matches!(
        (from, to),
        (_, Failed | ContentGenerated) | (ContentGenerated | Synced, Synced)
    )
}

impl WorkflowTracker {
    pub fn new() -> Self {
        Self {
            version: 1,
            documents: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::state_path(root);
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(&path)?;
        let tracker: WorkflowTracker = serde_yaml::from_str(&data)?;
        Ok(tracker)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::state_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, key: &DocKey) -> Option<&TrackedDocument> {
        self.documents.get(&key.to_string())
    }

    pub fn state_of(&self, key: &DocKey) -> WorkflowState {
        self.get(key)
            .map(|d| d.state)
            .unwrap_or(WorkflowState::NotStarted)
    }

    pub fn in_state(&self, state: WorkflowState) -> impl Iterator<Item = &TrackedDocument> {
        self.documents.values().filter(move |d| d.state == state)
    }

    pub fn count(&self, state: WorkflowState) -> usize {
        self.in_state(state).count()
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    pub fn transition(
        &mut self,
        key: &DocKey,
        path: &Path,
        to: WorkflowState,
        error: Option<String>,
    ) -> Result<()> {
        let from = self.state_of(key);
        if !can_transition(from, to) {
            return Err(LlmsError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
                reason: format!("'{key}' has no generated content to sync"),
            });
        }
        let now = Utc::now();
        self.documents.insert(
            key.to_string(),
            TrackedDocument {
                document_id: key.document_id.clone(),
                character_limit: key.character_limit,
                state: to,
                path: path.to_path_buf(),
                last_error: error,
                updated_at: now,
            },
        );
        self.last_updated = now;
        Ok(())
    }

    /// Call only after the derived file write has returned success.
    pub fn record_generated(&mut self, key: &DocKey, path: &Path) -> Result<()> {
        self.transition(key, path, WorkflowState::ContentGenerated, None)
    }

    pub fn record_failed(&mut self, key: &DocKey, path: &Path, error: impl Into<String>) -> Result<()> {
        self.transition(key, path, WorkflowState::Failed, Some(error.into()))
    }

    pub fn record_synced(&mut self, key: &DocKey) -> Result<()> {
        let path = self
            .get(key)
            .map(|d| d.path.clone())
            .ok_or_else(|| LlmsError::DocumentNotFound(key.to_string()))?;
        self.transition(key, &path, WorkflowState::Synced, None)
    }

    /// Drop the entry for a derived document that no longer exists.
    pub fn forget(&mut self, key: &DocKey) -> bool {
        let removed = self.documents.remove(&key.to_string()).is_some();
        if removed {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// Keys of every entry tracked at `path`.
    pub fn keys_at(&self, path: &Path) -> Vec<DocKey> {
        self.documents
            .values()
            .filter(|d| d.path == path)
            .map(|d| DocKey::new(d.document_id.clone(), d.character_limit))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
