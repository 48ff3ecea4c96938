//! Candidate retrieval.
//!
//! Produces a small, deduplicated candidate set from one of three backing
//! strategies:
//!
//! | Strategy | Names | Store call | Order |
//! |----------|-------|------------|-------|
//! | [`Strategy::Title`] | `title`, `substring` | `filter_by_title` | stable, by `course_id` |
//! | [`Strategy::FullText`] | `fts`, `fulltext`, `full_text` | `ft_search` + `titles_for` | rank, descending |
//! | [`Strategy::Vector`] | `vector`, `semantic` | `embed_query` + `match_courses` | distance, ascending |
//!
//! Full-text hits only carry ids, so titles are looked up in a second call.
//! An id with no course row keeps its id as the title.
//!
//! Errors are never swallowed here: a missing connection string or API key
//! surfaces as a configuration error, not an empty list.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{AdvisorError, Result};
use crate::models::Candidate;
use crate::store::CourseStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Title,
    FullText,
    Vector,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Title => "title",
            Strategy::FullText => "fts",
            Strategy::Vector => "vector",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "title" | "substring" => Ok(Strategy::Title),
            "fts" | "fulltext" | "full_text" => Ok(Strategy::FullText),
            "vector" | "semantic" => Ok(Strategy::Vector),
            other => Err(AdvisorError::malformed(
                "strategy",
                format!(
                    "Unknown strategy '{}'. Use title, fts, or vector.",
                    other
                ),
            )),
        }
    }
}

/// Retrieves candidates from the backing store.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn CourseStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    query_max_chars: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn CourseStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        query_max_chars: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            query_max_chars,
        }
    }

    pub fn store(&self) -> &Arc<dyn CourseStore> {
        &self.store
    }

    /// Return up to `limit` unique candidates for `query`.
    pub async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        strategy: Strategy,
    ) -> Result<Vec<Candidate>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AdvisorError::missing("query", "query must not be empty"));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let raw = match strategy {
            Strategy::Title => self.by_title(query, limit).await?,
            Strategy::FullText => self.by_full_text(query, limit).await?,
            Strategy::Vector => self.by_vector(query, limit).await?,
        };

        let mut candidates = dedup_candidates(raw);
        candidates.truncate(limit);
        info!(strategy = %strategy, count = candidates.len(), "retrieved candidates");
        Ok(candidates)
    }

    async fn by_title(&self, query: &str, limit: usize) -> Result<Vec<Candidate>> {
        let rows = self.store.filter_by_title(query, limit).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut c = Candidate::new(row.course_id, row.title).with_metadata(json!({
                    "description": row.description,
                    "instructor": row.instructor,
                    "credits": row.credits,
                }));
                c.matched_by = Some(Strategy::Title);
                c
            })
            .collect())
    }

    async fn by_full_text(&self, query: &str, limit: usize) -> Result<Vec<Candidate>> {
        let hits = self.store.ft_search(query, limit).await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = hits.iter().map(|h| h.course_id.clone()).collect();
        let titles = self.store.titles_for(&ids).await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let title = match titles.get(&hit.course_id) {
                    Some(t) => t.clone(),
                    None => {
                        debug!(course_id = %hit.course_id, "full-text hit has no title row");
                        hit.course_id.clone()
                    }
                };
                let mut c = Candidate::new(hit.course_id, title);
                if let Some(rank) = hit.rank {
                    c = c.with_metadata(json!({ "rank": rank }));
                }
                c.matched_by = Some(Strategy::FullText);
                c
            })
            .collect())
    }

    async fn by_vector(&self, query: &str, limit: usize) -> Result<Vec<Candidate>> {
        let embedding = embed_query(self.embedder.as_ref(), query, self.query_max_chars).await?;
        let matches = self.store.match_courses(&embedding, limit).await?;

        Ok(matches
            .into_iter()
            .map(|m| {
                let mut c = Candidate::new(m.course_id, m.title).with_metadata(json!({
                    "description": m.description,
                    "distance": m.distance,
                }));
                c.matched_by = Some(Strategy::Vector);
                c.distance = Some(m.distance);
                c
            })
            .collect())
    }
}

/// Keep the first occurrence of each `course_id`, preserving order.
pub fn dedup_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.course_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledProvider;
    use crate::models::{Course, CourseRow, CourseText, EmbeddingRecord, FtsHit, VectorMatch};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct AxisProvider;

    #[async_trait]
    impl EmbeddingProvider for AxisProvider {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.to_lowercase().contains("product") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    /// Full-text index that still ranks a course whose row was deleted.
    struct StaleIndexStore {
        inner: InMemoryStore,
    }

    #[async_trait]
    impl CourseStore for StaleIndexStore {
        async fn filter_by_title(&self, query: &str, limit: usize) -> Result<Vec<CourseRow>> {
            self.inner.filter_by_title(query, limit).await
        }
        async fn ft_search(&self, _query: &str, _match_count: usize) -> Result<Vec<FtsHit>> {
            Ok(vec![
                FtsHit {
                    course_id: "PM101".into(),
                    rank: Some(0.9),
                },
                FtsHit {
                    course_id: "GONE42".into(),
                    rank: Some(0.4),
                },
            ])
        }
        async fn match_courses(&self, q: &[f32], match_count: usize) -> Result<Vec<VectorMatch>> {
            self.inner.match_courses(q, match_count).await
        }
        async fn titles_for(&self, ids: &[String]) -> Result<HashMap<String, String>> {
            self.inner.titles_for(ids).await
        }
        async fn fetch_course_texts(&self) -> Result<Vec<CourseText>> {
            self.inner.fetch_course_texts().await
        }
        async fn upsert_courses(&self, courses: &[Course]) -> Result<usize> {
            self.inner.upsert_courses(courses).await
        }
        async fn upsert_embeddings(&self, records: &[EmbeddingRecord]) -> Result<usize> {
            self.inner.upsert_embeddings(records).await
        }
        async fn count_courses(&self) -> Result<u64> {
            self.inner.count_courses().await
        }
        async fn count_embeddings(&self) -> Result<u64> {
            self.inner.count_embeddings().await
        }
    }

    async fn store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::with_courses(vec![
            Course::new(
                "PM101",
                "Product Management Essentials",
                "Roadmaps and discovery for product managers.",
            ),
            Course::new("FIN200", "Corporate Finance", "Valuation and capital budgeting."),
            Course::new("PM201", "Advanced Product Strategy", "Pricing strategy."),
        ]));
        store
            .upsert_embeddings(&[
                EmbeddingRecord {
                    course_id: "PM101".into(),
                    embedding: vec![1.0, 0.0],
                },
                EmbeddingRecord {
                    course_id: "FIN200".into(),
                    embedding: vec![0.0, 1.0],
                },
            ])
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!("title".parse::<Strategy>().unwrap(), Strategy::Title);
        assert_eq!("Substring".parse::<Strategy>().unwrap(), Strategy::Title);
        assert_eq!("full_text".parse::<Strategy>().unwrap(), Strategy::FullText);
        assert_eq!("semantic".parse::<Strategy>().unwrap(), Strategy::Vector);
        let err = "telepathy".parse::<Strategy>().unwrap_err();
        assert_eq!(err.category(), "validation");
        assert_eq!(Strategy::FullText.to_string(), "fts");
    }

    #[test]
    fn test_dedup_first_wins() {
        let out = dedup_candidates(vec![
            Candidate::new("A", "first"),
            Candidate::new("B", "b"),
            Candidate::new("A", "second"),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "first");
    }

    #[tokio::test]
    async fn test_title_strategy_respects_limit() {
        let retriever = Retriever::new(store().await, Arc::new(DisabledProvider), 500);
        let out = retriever.retrieve("product", 1, Strategy::Title).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].matched_by, Some(Strategy::Title));
    }

    #[tokio::test]
    async fn test_full_text_enriches_titles() {
        let retriever = Retriever::new(store().await, Arc::new(DisabledProvider), 500);
        let out = retriever
            .retrieve("product management", 10, Strategy::FullText)
            .await
            .unwrap();
        assert_eq!(out[0].course_id, "PM101");
        assert_eq!(out[0].title, "Product Management Essentials");
    }

    #[tokio::test]
    async fn test_full_text_hit_without_row_keeps_id_as_title() {
        let store = StaleIndexStore {
            inner: InMemoryStore::with_courses(vec![Course::new(
                "PM101",
                "Product Management Essentials",
                "Roadmaps.",
            )]),
        };
        let retriever = Retriever::new(Arc::new(store), Arc::new(DisabledProvider), 500);
        let out = retriever
            .retrieve("product", 10, Strategy::FullText)
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "Product Management Essentials");
        assert_eq!(out[1].course_id, "GONE42");
        assert_eq!(out[1].title, "GONE42");
        assert_eq!(out[1].metadata, Some(json!({"rank": 0.4})));
    }

    #[tokio::test]
    async fn test_vector_orders_by_distance() {
        let retriever = Retriever::new(store().await, Arc::new(AxisProvider), 500);
        let out = retriever
            .retrieve("product leadership", 5, Strategy::Vector)
            .await
            .unwrap();
        assert_eq!(out[0].course_id, "PM101");
        assert!(out[0].distance.unwrap() < 1e-6);
    }

    #[tokio::test]
    async fn test_vector_without_provider_is_configuration_error() {
        let retriever = Retriever::new(store().await, Arc::new(DisabledProvider), 500);
        let err = retriever
            .retrieve("product", 5, Strategy::Vector)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let retriever = Retriever::new(store().await, Arc::new(DisabledProvider), 500);
        let err = retriever.retrieve("   ", 5, Strategy::Title).await.unwrap_err();
        assert_eq!(err.category(), "validation");
    }
}
