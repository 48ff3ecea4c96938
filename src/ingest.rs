//! Embedding ingestion and reconciliation.
//!
//! Runs offline over the whole course table:
//!
//! ```text
//! fetch rows ─► drop rows without course_id/title ─► build_text
//!            ─► embed_texts (batched) ─► upsert embeddings ─► re-count
//! ```
//!
//! Success means `count(course_embeddings) == count(courses) == embedded`.
//! Anything else is a [`AdvisorError::ReconciliationMismatch`] carrying both
//! counts; nothing is repaired or rolled back.

use anyhow::Result;
use tracing::{info, warn};

use crate::config::Config;
use crate::embed_text::build_text;
use crate::embedding::{self, embed_texts, EmbeddingProvider};
use crate::error::AdvisorError;
use crate::models::{CourseText, EmbeddingRecord};
use crate::store::{CourseStore, PgStore};

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub text_max_chars: usize,
    /// Count and preview only; no provider call, no writes.
    pub dry_run: bool,
}

impl IngestOptions {
    pub fn from_config(config: &Config, batch_size: Option<usize>, dry_run: bool) -> Self {
        Self {
            batch_size: batch_size.unwrap_or(config.embedding.batch_size).max(1),
            text_max_chars: config.embedding.text_max_chars,
            dry_run,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub fetched: usize,
    pub skipped: usize,
    pub embedded: usize,
    pub upserted: usize,
    pub course_count: u64,
    pub embedding_count: u64,
    pub sample_text: Option<String>,
}

impl IngestReport {
    /// Check the post-write counts.
    pub fn reconcile(&self) -> std::result::Result<(), AdvisorError> {
        let embedded = self.embedded as u64;
        if self.embedding_count == self.course_count && self.course_count == embedded {
            Ok(())
        } else {
            Err(AdvisorError::ReconciliationMismatch {
                courses: self.course_count,
                embeddings: self.embedding_count,
                embedded,
            })
        }
    }
}

/// A row with a usable key and title, plus its embedding text.
struct Prepared {
    course_id: String,
    text: String,
}

fn prepare(row: &CourseText, max_chars: usize) -> Option<Prepared> {
    let course_id = row.course_id.as_deref().map(str::trim).unwrap_or_default();
    let title = row.title.as_deref().map(str::trim).unwrap_or_default();
    if course_id.is_empty() || title.is_empty() {
        return None;
    }
    let normalized = CourseText {
        course_id: Some(course_id.to_string()),
        title: Some(title.to_string()),
        description: row.description.clone(),
    };
    Some(Prepared {
        course_id: course_id.to_string(),
        text: build_text(&normalized, max_chars),
    })
}

/// Run the pipeline against `store` and reconcile.
///
/// Returns the report on success. A count mismatch is returned as
/// [`AdvisorError::ReconciliationMismatch`]; an empty source table as
/// [`AdvisorError::NothingToIngest`].
pub async fn run_ingest(
    store: &dyn CourseStore,
    provider: &dyn EmbeddingProvider,
    options: &IngestOptions,
) -> std::result::Result<IngestReport, AdvisorError> {
    let batch_size = options.batch_size.max(1);
    let rows = store.fetch_course_texts().await?;
    if rows.is_empty() {
        return Err(AdvisorError::NothingToIngest);
    }

    let prepared: Vec<Prepared> = rows
        .iter()
        .filter_map(|row| prepare(row, options.text_max_chars))
        .collect();

    let mut report = IngestReport {
        fetched: rows.len(),
        skipped: rows.len() - prepared.len(),
        sample_text: prepared.first().map(|p| p.text.clone()),
        ..Default::default()
    };
    if report.skipped > 0 {
        warn!(skipped = report.skipped, "dropped rows missing course_id or title");
    }
    if prepared.is_empty() {
        return Err(AdvisorError::NothingToIngest);
    }
    if options.dry_run {
        return Ok(report);
    }

    let texts: Vec<String> = prepared.iter().map(|p| p.text.clone()).collect();
    let vectors = embed_texts(provider, &texts, batch_size).await?;
    report.embedded = vectors.len();

    let records: Vec<EmbeddingRecord> = prepared
        .into_iter()
        .zip(vectors)
        .map(|(p, embedding)| EmbeddingRecord {
            course_id: p.course_id,
            embedding,
        })
        .collect();

    for (i, chunk) in records.chunks(batch_size).enumerate() {
        report.upserted += store.upsert_embeddings(chunk).await?;
        info!(batch = i + 1, upserted = report.upserted, "upserted embeddings");
    }

    report.course_count = store.count_courses().await?;
    report.embedding_count = store.count_embeddings().await?;
    info!(
        courses = report.course_count,
        embeddings = report.embedding_count,
        embedded = report.embedded,
        "reconciling"
    );

    report.reconcile()?;
    Ok(report)
}

/// `compass ingest`.
pub async fn run_ingest_cmd(config: &Config, dry_run: bool, batch_size: Option<usize>) -> Result<()> {
    let options = IngestOptions::from_config(config, batch_size, dry_run);
    if !dry_run && !config.embedding.is_enabled() {
        return Err(AdvisorError::config(
            "embedding provider is disabled; set [embedding] provider or use --dry-run",
        )
        .into());
    }
    let store = PgStore::connect(config).await?;

    if dry_run {
        let report = run_ingest(&store, &embedding::DisabledProvider, &options).await?;
        println!("ingest (dry-run)");
        println!("  fetched: {} rows", report.fetched);
        println!("  skipped: {} rows", report.skipped);
        println!("  to embed: {}", report.fetched - report.skipped);
        if let Some(sample) = &report.sample_text {
            println!("  sample: \"{}\"", sample);
        }
        return Ok(());
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let report = run_ingest(&store, provider.as_ref(), &options).await?;

    println!("ingest");
    println!("  fetched: {} rows", report.fetched);
    println!("  skipped: {} rows", report.skipped);
    println!("  embedded: {}", report.embedded);
    println!("  upserted: {}", report.upserted);
    println!("  courses: {}", report.course_count);
    println!("  course_embeddings: {}", report.embedding_count);
    println!("ok");

    store.pool().close().await;
    Ok(())
}
