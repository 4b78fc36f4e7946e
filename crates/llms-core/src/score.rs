use crate::config::PriorityConfig;
use crate::source::SourceDocument;
use crate::truncate::char_len;
use crate::types::PriorityTier;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Priority {
    /// Score from 0 to 100.
    pub score: u8,
    pub tier: PriorityTier,
}

/// Score a source from its metadata alone. No clocks, no file timestamps:
/// the same document and config always score the same.
pub fn score(doc: &SourceDocument, config: &PriorityConfig) -> Priority {
    let score = match doc.priority_override {
        Some(explicit) => explicit.min(100),
        None => {
            let divisor = config.size_divisor.max(1);
            let size_points = (char_len(doc.body()) / divisor).min(i32::MAX as usize) as i32;
            let raw = config.base as i64
                + size_points.min(config.size_cap) as i64
                + config.category_weight(&doc.category) as i64
                - (config.depth_penalty as i64 * doc.depth as i64);
            raw.clamp(0, 100) as u8
        }
    };
    Priority {
        score,
        tier: config.tier_for(score),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
