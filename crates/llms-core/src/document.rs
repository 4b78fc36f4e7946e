use crate::error::{LlmsError, Result};
use crate::truncate::char_len;
use crate::types::{CompletionStatus, PriorityTier, WorkflowStage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Front matter
// ---------------------------------------------------------------------------

/// Split a `---` fenced YAML block off the top of `text`.
///
/// Returns `(yaml, body)` where `body` starts right after the closing fence
/// line. Returns `None` when `text` has no complete front matter block.
pub fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

// ---------------------------------------------------------------------------
// DocKey
// ---------------------------------------------------------------------------

/// Composite identity of a derived document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocKey {
    pub document_id: String,
    pub character_limit: usize,
}

impl DocKey {
    pub fn new(document_id: impl Into<String>, character_limit: usize) -> Self {
        Self {
            document_id: document_id.into(),
            character_limit,
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.document_id, self.character_limit)
    }
}

// ---------------------------------------------------------------------------
// DerivedDocument
// ---------------------------------------------------------------------------

/// One character-limited rendering of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedDocument {
    pub document_id: String,
    pub category: String,
    pub character_limit: usize,
    pub content: String,
    pub priority_score: u8,
    pub priority_tier: PriorityTier,
    pub completion_status: CompletionStatus,
    pub workflow_stage: WorkflowStage,
    pub last_update: Option<DateTime<Utc>>,
}

/// On-disk header. Field order here is the order written to the file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Header {
    document_id: String,
    category: String,
    character_limit: usize,
    priority_score: u8,
    priority_tier: PriorityTier,
    completion_status: CompletionStatus,
    workflow_stage: WorkflowStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_update: Option<DateTime<Utc>>,
}

impl DerivedDocument {
    pub fn new(document_id: impl Into<String>, category: impl Into<String>, character_limit: usize) -> Self {
        Self {
            document_id: document_id.into(),
            category: category.into(),
            character_limit,
            content: String::new(),
            priority_score: 0,
            priority_tier: PriorityTier::Low,
            completion_status: CompletionStatus::Pending,
            workflow_stage: WorkflowStage::NotStarted,
            last_update: None,
        }
    }

    pub fn key(&self) -> DocKey {
        DocKey::new(self.document_id.clone(), self.character_limit)
    }

    pub fn mark_in_progress(&mut self) {
        self.completion_status = CompletionStatus::InProgress;
    }

    /// Record a successful generation. Rejects content over the limit so the
    /// length invariant can't be broken through this path.
    pub fn mark_completed(
        &mut self,
        content: String,
        priority_score: u8,
        priority_tier: PriorityTier,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let len = char_len(&content);
        if len > self.character_limit {
            return Err(LlmsError::InvalidValue {
                field: "content",
                value: format!("{len} chars exceeds limit {}", self.character_limit),
            });
        }
        self.content = content;
        self.priority_score = priority_score;
        self.priority_tier = priority_tier;
        self.completion_status = CompletionStatus::Completed;
        self.workflow_stage = WorkflowStage::ContentGenerated;
        self.last_update = Some(now);
        Ok(())
    }

    /// Prior content and stage stay as they were.
    pub fn mark_failed(&mut self) {
        self.completion_status = CompletionStatus::Failed;
    }

    pub fn mark_synced(&mut self) {
        if self.workflow_stage >= WorkflowStage::ContentGenerated {
            self.workflow_stage = WorkflowStage::Synced;
        }
    }

    /// True if regenerating with these values would not change the file body
    /// or any metadata besides `last_update`.
    pub fn matches(&self, content: &str, priority_score: u8, priority_tier: PriorityTier, category: &str) -> bool {
        self.completion_status == CompletionStatus::Completed
            && self.content == content
            && self.priority_score == priority_score
            && self.priority_tier == priority_tier
            && self.category == category
    }

    pub fn content_len(&self) -> usize {
        char_len(&self.content)
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    pub fn render(&self) -> Result<String> {
        let header = Header {
            document_id: self.document_id.clone(),
            category: self.category.clone(),
            character_limit: self.character_limit,
            priority_score: self.priority_score,
            priority_tier: self.priority_tier,
            completion_status: self.completion_status,
            workflow_stage: self.workflow_stage,
            last_update: self.last_update,
        };
        let yaml = serde_yaml::to_string(&header)?;
        Ok(format!("---\n{yaml}---\n{}", self.content))
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let invalid = |reason: String| LlmsError::InvalidHeader {
            path: path.to_path_buf(),
            reason,
        };
        let (yaml, body) =
            split_front_matter(text).ok_or_else(|| invalid("missing header block".to_string()))?;
        let header: Header = serde_yaml::from_str(yaml).map_err(|e| invalid(e.to_string()))?;
        if header.character_limit == 0 {
            return Err(invalid("character_limit must be positive".to_string()));
        }
        Ok(Self {
            document_id: header.document_id,
            category: header.category,
            character_limit: header.character_limit,
            content: body.to_string(),
            priority_score: header.priority_score,
            priority_tier: header.priority_tier,
            completion_status: header.completion_status,
            workflow_stage: header.workflow_stage,
            last_update: header.last_update,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(path, &text)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
