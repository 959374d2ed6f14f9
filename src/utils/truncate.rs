//! Truncation Utilities
//!
//! Shortens text for prompts and log lines without splitting a UTF-8
//! character.

const ELLIPSIS: &str = "...";

/// Keep at most `max_chars` characters, marking the cut with an ellipsis.
pub fn truncate_text(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    if max_chars <= ELLIPSIS.len() {
        return content.chars().take(max_chars).collect();
    }

    let keep = max_chars - ELLIPSIS.len();
    let end = content
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(content.len());

    format!("{}{}", content[..end].trim_end(), ELLIPSIS)
}

/// First line of `content`, truncated; used for single-line log previews
pub fn preview(content: &str, max_chars: usize) -> String {
    truncate_text(content.lines().next().unwrap_or(""), max_chars)
}
