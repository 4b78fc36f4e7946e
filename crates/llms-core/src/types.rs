use crate::error::LlmsError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// PriorityTier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Low,
    Medium,
    High,
}

impl PriorityTier {
    pub fn all() -> &'static [PriorityTier] {
        &[PriorityTier::Low, PriorityTier::Medium, PriorityTier::High]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PriorityTier::Low => "low",
            PriorityTier::Medium => "medium",
            PriorityTier::High => "high",
        }
    }

    pub fn heading(self) -> &'static str {
        match self {
            PriorityTier::High => "High priority",
            PriorityTier::Medium => "Medium priority",
            PriorityTier::Low => "Low priority",
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PriorityTier {
    type Err = LlmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(PriorityTier::Low),
            "medium" => Ok(PriorityTier::Medium),
            "high" => Ok(PriorityTier::High),
            _ => Err(LlmsError::InvalidValue {
                field: "priority_tier",
                value: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// CompletionStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompletionStatus::Pending => "pending",
            CompletionStatus::InProgress => "in_progress",
            CompletionStatus::Completed => "completed",
            CompletionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// WorkflowStage
// ---------------------------------------------------------------------------

/// How far a derived document has progressed, as written into its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    NotStarted,
    ContentGenerated,
    Synced,
}

impl WorkflowStage {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStage::NotStarted => "not_started",
            WorkflowStage::ContentGenerated => "content_generated",
            WorkflowStage::Synced => "synced",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// WorkflowState
// ---------------------------------------------------------------------------

/// Tracker-side lifecycle state. Superset of [`WorkflowStage`] with `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    NotStarted,
    ContentGenerated,
    Synced,
    Failed,
}

impl WorkflowState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::NotStarted => "not_started",
            WorkflowState::ContentGenerated => "content_generated",
            WorkflowState::Synced => "synced",
            WorkflowState::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
