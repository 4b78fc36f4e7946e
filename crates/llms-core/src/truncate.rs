//! Length enforcement for summarizer output.
//!
//! Length is counted in Unicode scalar values (`char`s), never bytes, so a cut
//! can't split a code point.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationStrategy {
    /// Cut exactly at the budget.
    Hard,
    /// Cut at the last whitespace inside the budget, or hard if there is none.
    #[default]
    WordBoundary,
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset just past the first `n` chars of `text`.
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map(|(i, _)| i).unwrap_or(text.len())
}

/// Bring `text` within `limit` chars. Text already within the limit is
/// returned unchanged. The marker counts against the limit and is dropped
/// when it would not leave room for any content.
pub fn enforce_limit(text: &str, limit: usize, strategy: TruncationStrategy, marker: &str) -> String {
    if char_len(text) <= limit {
        return text.to_string();
    }
    let marker_len = char_len(marker);
    let (marker, budget) = if marker_len >= limit {
        ("", limit)
    } else {
        (marker, limit - marker_len)
    };

    let cut = byte_offset(text, budget);
    let mut kept = &text[..cut];

    if strategy == TruncationStrategy::WordBoundary {
        let at_boundary = text[cut..].starts_with(char::is_whitespace);
        if !at_boundary {
            if let Some(ws) = kept.rfind(char::is_whitespace) {
                if ws > 0 {
                    kept = &kept[..ws];
                }
            }
        }
    }

    let mut out = kept.trim_end().to_string();
    out.push_str(marker);
    out
}
