//! Backing-store abstraction.
//!
//! The [`CourseStore`] trait is the whole contract the service has with its
//! relational store: a keyword title filter, the two server-side procedures
//! (`ft_search`, `match_courses`), a title lookup, and the ingestion write
//! path (upserts and exact counts).
//!
//! | Implementation | Use |
//! |----------------|-----|
//! | [`PgStore`] | PostgreSQL + pgvector via `sqlx` |
//! | [`InMemoryStore`] | Tests and offline runs |
//!
//! Implementations must be `Send + Sync`; one instance is shared by every
//! request for the life of the process.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Course, CourseRow, CourseText, EmbeddingRecord, FtsHit, VectorMatch};

/// Abstract storage backend for courses and their embeddings.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`filter_by_title`](CourseStore::filter_by_title) | Case-insensitive substring match on title |
/// | [`ft_search`](CourseStore::ft_search) | Full-text procedure, ranked ids |
/// | [`match_courses`](CourseStore::match_courses) | Nearest neighbours by cosine distance |
/// | [`titles_for`](CourseStore::titles_for) | Title lookup for a set of ids |
/// | [`fetch_course_texts`](CourseStore::fetch_course_texts) | All rows' text fields, for ingestion |
/// | [`upsert_courses`](CourseStore::upsert_courses) | Insert or replace course rows |
/// | [`upsert_embeddings`](CourseStore::upsert_embeddings) | Insert or replace embedding rows |
/// | [`count_courses`](CourseStore::count_courses) | Exact course row count |
/// | [`count_embeddings`](CourseStore::count_embeddings) | Exact embedding row count |
#[async_trait]
pub trait CourseStore: Send + Sync {
    /// Rows whose title contains `query` (case-insensitive), at most `limit`.
    ///
    /// Order is implementation-defined but stable within a call.
    async fn filter_by_title(&self, query: &str, limit: usize) -> Result<Vec<CourseRow>>;

    /// Ranked course ids for a free-text query.
    async fn ft_search(&self, query: &str, match_count: usize) -> Result<Vec<FtsHit>>;

    /// Nearest courses to `query_embedding`, ascending distance.
    async fn match_courses(
        &self,
        query_embedding: &[f32],
        match_count: usize,
    ) -> Result<Vec<VectorMatch>>;

    /// Map of `course_id → title` for the ids that exist.
    async fn titles_for(&self, course_ids: &[String]) -> Result<HashMap<String, String>>;

    /// Text fields of every course row, unvalidated.
    async fn fetch_course_texts(&self) -> Result<Vec<CourseText>>;

    /// Returns the number of rows written.
    async fn upsert_courses(&self, courses: &[Course]) -> Result<usize>;

    /// Returns the number of rows written. Last write wins per `course_id`.
    async fn upsert_embeddings(&self, records: &[EmbeddingRecord]) -> Result<usize>;

    async fn count_courses(&self) -> Result<u64>;

    async fn count_embeddings(&self) -> Result<u64>;
}
