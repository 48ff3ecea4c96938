//! Schema setup for the Postgres backing store.
//!
//! Creates, idempotently:
//!
//! | Object | Purpose |
//! |--------|---------|
//! | `vector` extension | pgvector column type and `<=>` operator |
//! | `courses` | Source of truth for course rows |
//! | `course_embeddings` | One `vector(N)` per course, keyed by `course_id` |
//! | full-text GIN index | Backs `ft_search` |
//! | `ft_search(q, match_count)` | Ranked ids for a free-text query |
//! | `match_courses(query_embedding, match_count)` | Nearest courses by cosine distance |
//!
//! Table names and the vector dimension come from config.

use anyhow::Result;
use sqlx::postgres::PgPool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = run_migrations_on(&pool, config).await;
    pool.close().await;
    result
}

/// Run the migrations against an existing pool.
pub async fn run_migrations_on(pool: &PgPool, config: &Config) -> Result<()> {
    for statement in schema_statements(config) {
        sqlx::query(&statement).execute(pool).await?;
    }
    Ok(())
}

/// The DDL, one statement per entry, in execution order.
pub fn schema_statements(config: &Config) -> Vec<String> {
    let courses = &config.store.courses_table;
    let embeddings = &config.store.embeddings_table;
    let dims = config.embedding.dims;

    vec![
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {courses} (
                course_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                instructor TEXT,
                credits DOUBLE PRECISION,
                skills TEXT[] NOT NULL DEFAULT '{{}}',
                semester TEXT NOT NULL DEFAULT '',
                bid_points INTEGER[] NOT NULL DEFAULT '{{}}'
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {embeddings} (
                course_id TEXT PRIMARY KEY REFERENCES {courses}(course_id) ON DELETE CASCADE,
                embedding VECTOR({dims}) NOT NULL
            )
            "#
        ),
        format!(
            r#"
            CREATE INDEX IF NOT EXISTS {courses}_fts_idx ON {courses}
            USING GIN (to_tsvector('english', title || ' ' || description))
            "#
        ),
        format!(
            r#"
            CREATE OR REPLACE FUNCTION ft_search(q TEXT, match_count INT)
            RETURNS TABLE (course_id TEXT, rank DOUBLE PRECISION)
            LANGUAGE sql STABLE AS $$
                SELECT c.course_id,
                       ts_rank(to_tsvector('english', c.title || ' ' || c.description),
                               plainto_tsquery('english', q))::float8 AS rank
                FROM {courses} c
                WHERE to_tsvector('english', c.title || ' ' || c.description)
                      @@ plainto_tsquery('english', q)
                ORDER BY rank DESC, c.course_id
                LIMIT match_count
            $$
            "#
        ),
        format!(
            r#"
            CREATE OR REPLACE FUNCTION match_courses(query_embedding VECTOR({dims}), match_count INT)
            RETURNS TABLE (course_id TEXT, title TEXT, description TEXT, distance DOUBLE PRECISION)
            LANGUAGE sql STABLE AS $$
                SELECT c.course_id, c.title, c.description,
                       (e.embedding <=> query_embedding)::float8 AS distance
                FROM {embeddings} e
                JOIN {courses} c ON c.course_id = e.course_id
                ORDER BY e.embedding <=> query_embedding
                LIMIT match_count
            $$
            "#
        ),
    ]
}
