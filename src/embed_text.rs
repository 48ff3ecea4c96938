//! Embedding text construction.
//!
//! Each course is embedded as one normalized string:
//!
//! ```text
//! {title} — {description, whitespace-collapsed, truncated, title prefix removed}
//! ```
//!
//! Courses without a description embed as their bare title.

use crate::models::CourseText;

const TITLE_SEPARATOR: &str = " — ";
const STRIP_CHARS: &[char] = &[' ', '-', ':', ';'];

/// Build the text sent to the embedding provider for one course.
///
/// `max_chars` bounds the description (after whitespace collapsing), not the
/// whole string. Missing fields are treated as empty.
pub fn build_text(course: &CourseText, max_chars: usize) -> String {
    let title = course.title.as_deref().unwrap_or("").trim();
    let description = course.description.as_deref().unwrap_or("").trim();

    if description.is_empty() {
        return title.to_string();
    }

    let collapsed = collapse_whitespace(description);
    let truncated: String = collapsed.chars().take(max_chars).collect();

    let body = match strip_prefix_ignore_case(&truncated, title) {
        Some(rest) => rest.trim_matches(STRIP_CHARS),
        None => truncated.as_str(),
    };

    if body.is_empty() {
        return title.to_string();
    }

    format!("{}{}{}", title, TITLE_SEPARATOR, body)
        .trim()
        .to_string()
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case-insensitive `str::strip_prefix` that is safe for non-ASCII input.
fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut rest = text.char_indices();
    let mut end = 0;
    for p in prefix.chars() {
        let (idx, c) = rest.next()?;
        if !c.to_lowercase().eq(p.to_lowercase()) {
            return None;
        }
        end = idx + c.len_utf8();
    }
    Some(&text[end..])
}
