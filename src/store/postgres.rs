//! PostgreSQL + pgvector [`CourseStore`](super::CourseStore).
//!
//! The two retrieval procedures are called as set-returning SQL functions:
//!
//! ```sql
//! SELECT * FROM ft_search($1, $2);
//! SELECT * FROM match_courses($1::float4[]::vector, $2);
//! ```
//!
//! Both are created by `compass init` (see [`crate::migrate`]). Table names
//! come from config and are validated as plain identifiers at load time.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use super::CourseStore;
use crate::config::Config;
use crate::error::{AdvisorError, Result};
use crate::models::{Course, CourseRow, CourseText, EmbeddingRecord, FtsHit, VectorMatch};

pub struct PgStore {
    pool: PgPool,
    courses_table: String,
    embeddings_table: String,
    timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self {
            pool,
            courses_table: config.store.courses_table.clone(),
            embeddings_table: config.store.embeddings_table.clone(),
            timeout: Duration::from_secs(config.store.timeout_secs),
        }
    }

    /// Connect using the configured URL variable.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = crate::db::connect(config).await?;
        Ok(Self::new(pool, config))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Bound a store call by the configured timeout.
    async fn timed<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| AdvisorError::upstream("store", format!("{}: {}", op, e))),
            Err(_) => Err(AdvisorError::upstream(
                "store",
                format!("{}: timed out after {}s", op, self.timeout.as_secs()),
            )),
        }
    }

    async fn count_table(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let count: i64 = self
            .timed("count", sqlx::query_scalar(&sql).fetch_one(&self.pool))
            .await?;
        Ok(count.max(0) as u64)
    }
}

/// Escape `%`, `_` and `\` so user input matches literally inside ILIKE.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl CourseStore for PgStore {
    async fn filter_by_title(&self, query: &str, limit: usize) -> Result<Vec<CourseRow>> {
        let sql = format!(
            r#"
            SELECT course_id, title, COALESCE(description, '') AS description,
                   instructor, credits::float8 AS credits
            FROM {}
            WHERE title ILIKE $1
            ORDER BY course_id
            LIMIT $2
            "#,
            self.courses_table
        );
        let pattern = format!("%{}%", escape_like(query.trim()));
        let rows = self
            .timed(
                "filter_by_title",
                sqlx::query(&sql)
                    .bind(pattern)
                    .bind(limit as i64)
                    .fetch_all(&self.pool),
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(CourseRow {
                    course_id: row.try_get("course_id")?,
                    title: row.try_get("title")?,
                    description: row.try_get("description")?,
                    instructor: row.try_get("instructor")?,
                    credits: row.try_get("credits")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(AdvisorError::from)
    }

    async fn ft_search(&self, query: &str, match_count: usize) -> Result<Vec<FtsHit>> {
        let rows = self
            .timed(
                "ft_search",
                sqlx::query("SELECT * FROM ft_search($1, $2)")
                    .bind(query)
                    .bind(match_count as i32)
                    .fetch_all(&self.pool),
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(FtsHit {
                    course_id: row.try_get("course_id")?,
                    rank: row.try_get::<Option<f64>, _>("rank").unwrap_or(None),
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(AdvisorError::from)
    }

    async fn match_courses(
        &self,
        query_embedding: &[f32],
        match_count: usize,
    ) -> Result<Vec<VectorMatch>> {
        let rows = self
            .timed(
                "match_courses",
                sqlx::query(
                    r#"
                    SELECT course_id, title, COALESCE(description, '') AS description,
                           distance::float8 AS distance
                    FROM match_courses($1::float4[]::vector, $2)
                    "#,
                )
                .bind(query_embedding)
                .bind(match_count as i32)
                .fetch_all(&self.pool),
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(VectorMatch {
                    course_id: row.try_get("course_id")?,
                    title: row.try_get("title")?,
                    description: row.try_get("description")?,
                    distance: row.try_get("distance")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(AdvisorError::from)
    }

    async fn titles_for(&self, course_ids: &[String]) -> Result<HashMap<String, String>> {
        if course_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT course_id, title FROM {} WHERE course_id = ANY($1)",
            self.courses_table
        );
        let rows = self
            .timed(
                "titles_for",
                sqlx::query(&sql).bind(course_ids).fetch_all(&self.pool),
            )
            .await?;

        let mut titles = HashMap::with_capacity(rows.len());
        for row in &rows {
            titles.insert(row.try_get("course_id")?, row.try_get("title")?);
        }
        Ok(titles)
    }

    async fn fetch_course_texts(&self) -> Result<Vec<CourseText>> {
        let sql = format!(
            "SELECT course_id, title, description FROM {} ORDER BY course_id",
            self.courses_table
        );
        let rows = self
            .timed("fetch_course_texts", sqlx::query(&sql).fetch_all(&self.pool))
            .await?;

        rows.iter()
            .map(|row| {
                Ok(CourseText {
                    course_id: row.try_get("course_id")?,
                    title: row.try_get("title")?,
                    description: row.try_get("description")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(AdvisorError::from)
    }

    async fn upsert_courses(&self, courses: &[Course]) -> Result<usize> {
        if courses.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            r#"
            INSERT INTO {} (course_id, title, description, instructor, credits, skills, semester, bid_points)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (course_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                instructor = excluded.instructor,
                credits = excluded.credits,
                skills = excluded.skills,
                semester = excluded.semester,
                bid_points = excluded.bid_points
            "#,
            self.courses_table
        );

        let mut tx = self.pool.begin().await?;
        for course in courses {
            let fut = sqlx::query(&sql)
                .bind(&course.course_id)
                .bind(&course.title)
                .bind(&course.description)
                .bind(&course.instructor)
                .bind(course.credits)
                .bind(&course.skills)
                .bind(&course.semester)
                .bind(&course.bid_points)
                .execute(&mut *tx);
            self.timed("upsert_courses", fut).await?;
        }
        tx.commit().await?;
        Ok(courses.len())
    }

    async fn upsert_embeddings(&self, records: &[EmbeddingRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            r#"
            INSERT INTO {} (course_id, embedding)
            VALUES ($1, $2::float4[]::vector)
            ON CONFLICT (course_id) DO UPDATE SET
                embedding = excluded.embedding
            "#,
            self.embeddings_table
        );

        let mut tx = self.pool.begin().await?;
        for record in records {
            let fut = sqlx::query(&sql)
                .bind(&record.course_id)
                .bind(&record.embedding)
                .execute(&mut *tx);
            self.timed("upsert_embeddings", fut).await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    async fn count_courses(&self) -> Result<u64> {
        self.count_table(&self.courses_table).await
    }

    async fn count_embeddings(&self) -> Result<u64> {
        self.count_table(&self.embeddings_table).await
    }
}
