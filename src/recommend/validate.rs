//! Whitelist validation and ranking of raw model items.
//!
//! This is the only gate between model output and the caller. An item
//! survives only if its `course_id` is in the candidate whitelist and it has
//! a non-empty `rationale`. Model order is kept; nothing is re-sorted.

use std::collections::HashSet;

use serde_json::Value;

use crate::models::RecommendationItem;

pub const MAX_RATIONALE_CHARS: usize = 400;
pub const DEFAULT_CONFIDENCE: f64 = 0.6;

/// Filter `raw_items` down to at most `top_k` whitelisted recommendations.
///
/// A `course_id` that already produced an item is skipped.
pub fn validate(
    raw_items: &[Value],
    allowed_ids: &HashSet<String>,
    top_k: usize,
) -> Vec<RecommendationItem> {
    let mut emitted: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(top_k.min(raw_items.len()));

    for item in raw_items {
        if out.len() >= top_k {
            break;
        }
        let Some(course_id) = item.get("course_id").and_then(Value::as_str).map(str::trim) else {
            continue;
        };
        let Some(allowed) = allowed_ids.get(course_id) else {
            continue;
        };
        let rationale = match item.get("rationale").and_then(Value::as_str).map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => continue,
        };
        if !emitted.insert(allowed.as_str()) {
            continue;
        }

        out.push(RecommendationItem {
            course_id: allowed.clone(),
            rationale: rationale.chars().take(MAX_RATIONALE_CHARS).collect(),
            confidence: coerce_confidence(item.get("confidence")),
        });
    }

    out
}

/// Numbers and numeric strings are accepted; anything else is the default.
/// The result is clamped to `[0.0, 1.0]`.
pub fn coerce_confidence(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        _ => DEFAULT_CONFIDENCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn allowed(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_invented_ids_are_dropped() {
        let raw = vec![
            json!({"course_id": "HACK999", "rationale": "trust me", "confidence": 1.0}),
            json!({"course_id": "PM101", "rationale": "fits", "confidence": 0.9}),
        ];
        let out = validate(&raw, &allowed(&["PM101"]), 5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].course_id, "PM101");
    }

    #[test]
    fn test_missing_or_blank_rationale_dropped() {
        let raw = vec![
            json!({"course_id": "PM101"}),
            json!({"course_id": "PM101", "rationale": "   "}),
            json!({"course_id": "PM101", "rationale": 7}),
        ];
        assert!(validate(&raw, &allowed(&["PM101"]), 5).is_empty());
    }

    #[test]
    fn test_confidence_coercion() {
        assert_eq!(coerce_confidence(Some(&json!(0.3))), 0.3);
        assert_eq!(coerce_confidence(Some(&json!("0.75"))), 0.75);
        assert_eq!(coerce_confidence(Some(&json!("high"))), DEFAULT_CONFIDENCE);
        assert_eq!(coerce_confidence(None), DEFAULT_CONFIDENCE);
        assert_eq!(coerce_confidence(Some(&json!(7))), 1.0);
        assert_eq!(coerce_confidence(Some(&json!(-2))), 0.0);
    }

    #[test]
    fn test_stops_at_top_k_in_model_order() {
        let raw = vec![
            json!({"course_id": "B", "rationale": "b", "confidence": 0.1}),
            json!({"course_id": "A", "rationale": "a", "confidence": 0.9}),
            json!({"course_id": "C", "rationale": "c"}),
        ];
        let out = validate(&raw, &allowed(&["A", "B", "C"]), 2);
        let ids: Vec<_> = out.iter().map(|i| i.course_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
    }

    #[test]
    fn test_rationale_truncated() {
        let long = "x".repeat(1000);
        let raw = vec![json!({"course_id": "A", "rationale": long})];
        let out = validate(&raw, &allowed(&["A"]), 1);
        assert_eq!(out[0].rationale.chars().count(), MAX_RATIONALE_CHARS);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let raw = vec![
            json!({"course_id": "A", "rationale": "first"}),
            json!({"course_id": "A", "rationale": "second"}),
        ];
        let out = validate(&raw, &allowed(&["A"]), 5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rationale, "first");
    }
}
