//! Search responder.
//!
//! Wraps candidate retrieval and shapes the result for callers:
//!
//! | Strategy | `score` | `reasons` |
//! |----------|---------|-----------|
//! | title | `1.0` | `["title"]` |
//! | fts | `1.0` | `["fts"]` |
//! | vector | `1 - distance`, clamped to `[0, 1]` | `["vector"]` |
//!
//! Result order is the retrieval order; the responder never re-sorts.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::config::Config;
use crate::error::AdvisorError;
use crate::models::Candidate;
use crate::retrieve::{Retriever, Strategy};
use crate::services::Services;

pub const DEFAULT_K: i64 = 10;
pub const MIN_K: i64 = 1;
pub const MAX_K: i64 = 25;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub course_id: String,
    pub title: String,
    pub score: f64,
    pub reasons: Vec<String>,
    pub metadata: serde_json::Value,
}

/// Reject `k` outside `[MIN_K, MAX_K]`.
pub fn validate_k(k: i64) -> std::result::Result<usize, AdvisorError> {
    if (MIN_K..=MAX_K).contains(&k) {
        Ok(k as usize)
    } else {
        Err(AdvisorError::out_of_range(
            "k",
            format!("Invalid 'k' value (must be {}-{})", MIN_K, MAX_K),
        ))
    }
}

pub fn score(candidate: &Candidate) -> f64 {
    match (candidate.matched_by, candidate.distance) {
        (Some(Strategy::Vector), Some(distance)) => (1.0 - distance).clamp(0.0, 1.0),
        _ => 1.0,
    }
}

pub fn to_result(candidate: Candidate) -> SearchResult {
    let score = score(&candidate);
    SearchResult {
        reasons: candidate
            .matched_by
            .map(|s| vec![s.as_str().to_string()])
            .unwrap_or_default(),
        metadata: candidate.metadata.unwrap_or_else(|| json!({})),
        course_id: candidate.course_id,
        title: candidate.title,
        score,
    }
}

fn check_query(query: &str) -> std::result::Result<(), AdvisorError> {
    if query.trim().is_empty() {
        return Err(AdvisorError::missing(
            "query",
            "Missing or invalid 'query' field",
        ));
    }
    Ok(())
}

/// Validate `k`, retrieve and shape at most `k` results.
pub async fn search(
    retriever: &Retriever,
    query: &str,
    k: i64,
    strategy: Strategy,
) -> std::result::Result<Vec<SearchResult>, AdvisorError> {
    check_query(query)?;
    let k = validate_k(k)?;
    let candidates = retriever.retrieve(query, k, strategy).await?;
    Ok(candidates.into_iter().take(k).map(to_result).collect())
}

/// `compass search`: run a search and print the results.
pub async fn run_search(
    config: &Config,
    query: &str,
    k: Option<i64>,
    strategy: Option<&str>,
) -> Result<()> {
    check_query(query)?;
    let strategy = match strategy {
        Some(name) => name.parse::<Strategy>()?,
        None => config.retrieval.search_strategy(),
    };

    let services = Services::from_config(config).await?;
    let retriever = services.retriever(config);
    let results = search(&retriever, query, k.unwrap_or(DEFAULT_K), strategy).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            result.score,
            result.course_id,
            result.title
        );
        println!("    matched: {}", result.reasons.join(", "));
        if let Some(instructor) = result.metadata.get("instructor").and_then(|v| v.as_str()) {
            println!("    instructor: {}", instructor);
        }
        if let Some(description) = result.metadata.get("description").and_then(|v| v.as_str()) {
            let excerpt: String = description.chars().take(160).collect();
            if !excerpt.is_empty() {
                println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
            }
        }
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledProvider;
    use crate::models::Course;
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_vector_score_is_clamped_similarity() {
        let mut c = Candidate::new("A", "a");
        c.matched_by = Some(Strategy::Vector);
        c.distance = Some(0.25);
        assert!((score(&c) - 0.75).abs() < 1e-9);
        c.distance = Some(1.7);
        assert_eq!(score(&c), 0.0);
        c.distance = Some(-0.1);
        assert_eq!(score(&c), 1.0);
    }

    #[test]
    fn test_keyword_matches_score_one() {
        let mut c = Candidate::new("A", "a");
        c.matched_by = Some(Strategy::FullText);
        let result = to_result(c);
        assert_eq!(result.score, 1.0);
        assert_eq!(result.reasons, vec!["fts"]);
        assert_eq!(result.metadata, json!({}));
    }

    #[test]
    fn test_k_bounds() {
        assert!(validate_k(0).is_err());
        assert!(validate_k(26).is_err());
        assert_eq!(validate_k(25).unwrap(), 25);
        assert_eq!(validate_k(1).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_returns_product_management() {
        let store = Arc::new(InMemoryStore::with_courses(vec![
            Course::new("PM101", "Product Management Essentials", ""),
            Course::new("FIN200", "Corporate Finance", ""),
        ]));
        let retriever = Retriever::new(store, Arc::new(DisabledProvider), 500);
        let results = search(&retriever, "product management", 5, Strategy::Title)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].course_id, "PM101");
        assert_eq!(results[0].score, 1.0);
    }
}
