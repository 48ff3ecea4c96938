//! Recovery of recommendation items from model output.
//!
//! The model is asked for JSON but is not trusted to produce it. Parsing is
//! an ordered chain of pure steps; the first to succeed wins:
//!
//! 1. strip a surrounding fenced code block (```` ```json ... ``` ````);
//! 2. parse the whole text as JSON, either a bare array or an object with a
//!    `recommendations` array;
//! 3. take the first bracketed substring that is a well-formed JSON array;
//! 4. give up and return an empty list.
//!
//! Items are returned as raw JSON values; field checks happen in
//! [`super::validate`].

use serde_json::Value;

type ParseStep = fn(&str) -> Option<Vec<Value>>;

const STEPS: &[ParseStep] = &[parse_direct, first_array];

/// Extract raw recommendation items. Never fails.
pub fn parse_recommendations(text: &str) -> Vec<Value> {
    let text = strip_fences(text);
    STEPS
        .iter()
        .find_map(|step| step(text))
        .unwrap_or_default()
}

/// Remove a leading ```` ``` ```` line (with optional language tag) and a
/// trailing ```` ``` ````.
pub fn strip_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = match rest.find('\n') {
            Some(i) => &rest[i + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// The whole text is JSON: a bare array, or `{"recommendations": [...]}`.
pub fn parse_direct(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map.remove("recommendations") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

/// The first `[` at which a complete JSON array can be read.
pub fn first_array(text: &str) -> Option<Vec<Value>> {
    text.match_indices('[').find_map(|(i, _)| {
        let mut stream = serde_json::Deserializer::from_str(&text[i..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Array(items))) => Some(items),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fenced_array_matches_bare_array() {
        let bare = r#"[{"course_id":"X","rationale":"ok","confidence":0.9}]"#;
        let fenced = format!("```json\n{}\n```", bare);
        assert_eq!(parse_recommendations(&fenced), parse_recommendations(bare));
        assert_eq!(parse_recommendations(bare).len(), 1);
    }

    #[test]
    fn test_object_with_recommendations() {
        let text = r#"{"recommendations":[{"course_id":"PM101","rationale":"fits","confidence":0.8}]}"#;
        let items = parse_recommendations(text);
        assert_eq!(items[0]["course_id"], "PM101");
    }

    #[test]
    fn test_array_embedded_in_prose() {
        let text = "Sure! Here are my picks [see below]:\n[{\"course_id\":\"PM101\",\"rationale\":\"a\"}]\nHope this helps.";
        let items = parse_recommendations(text);
        assert_eq!(items, vec![json!({"course_id":"PM101","rationale":"a"})]);
    }

    #[test]
    fn test_no_json_is_empty() {
        assert!(parse_recommendations("I cannot help with that.").is_empty());
        assert!(parse_recommendations("").is_empty());
        assert!(parse_recommendations("[unterminated").is_empty());
    }

    #[test]
    fn test_object_without_recommendations_falls_through() {
        let text = r#"{"items": [{"course_id": "A", "rationale": "r"}]}"#;
        assert_eq!(parse_recommendations(text).len(), 1);
    }

    #[test]
    fn test_strip_fences_without_language_tag() {
        assert_eq!(strip_fences("```\n[]\n```"), "[]");
        assert_eq!(strip_fences("  []  "), "[]");
    }
}
