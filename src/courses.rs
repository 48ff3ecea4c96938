//! Loading normalized course records and probing the course table.
//!
//! `compass courses load` takes a JSON array of already-normalized course
//! objects (the shape of [`Course`]) and upserts them. Records without a
//! `course_id` or `title` are skipped; for repeated ids the last record wins.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AdvisorError;
use crate::models::Course;
use crate::store::{CourseStore, PgStore};

#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub skipped: usize,
    /// Mean of each course's most recent bid point, over courses that have one.
    pub avg_latest_bid: Option<f64>,
}

/// Trim keys, drop unusable records and collapse duplicate ids.
///
/// Returns the kept courses ordered by `course_id` and the number skipped.
pub fn normalize(courses: Vec<Course>) -> (Vec<Course>, usize) {
    let mut skipped = 0;
    let mut by_id: BTreeMap<String, Course> = BTreeMap::new();

    for mut course in courses {
        course.course_id = course.course_id.trim().to_string();
        course.title = course.title.trim().to_string();
        if course.course_id.is_empty() || course.title.is_empty() {
            skipped += 1;
            continue;
        }
        course.skills.retain(|s| !s.trim().is_empty());
        if by_id.insert(course.course_id.clone(), course).is_some() {
            skipped += 1;
        }
    }

    (by_id.into_values().collect(), skipped)
}

pub fn average_latest_bid(courses: &[Course]) -> Option<f64> {
    let latest: Vec<f64> = courses
        .iter()
        .filter_map(|c| c.latest_bid_point())
        .map(f64::from)
        .collect();
    if latest.is_empty() {
        None
    } else {
        Some(latest.iter().sum::<f64>() / latest.len() as f64)
    }
}

pub async fn load_courses(
    store: &dyn CourseStore,
    courses: Vec<Course>,
) -> std::result::Result<LoadSummary, AdvisorError> {
    let (courses, skipped) = normalize(courses);
    if skipped > 0 {
        warn!(skipped, "skipped course records without course_id/title or with repeated ids");
    }
    let loaded = store.upsert_courses(&courses).await?;
    info!(loaded, "courses upserted");

    Ok(LoadSummary {
        loaded,
        skipped,
        avg_latest_bid: average_latest_bid(&courses),
    })
}

pub fn read_courses_file(path: &Path) -> Result<Vec<Course>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read courses file: {}", path.display()))?;
    let courses: Vec<Course> = serde_json::from_str(&content)
        .with_context(|| format!("Expected a JSON array of courses in {}", path.display()))?;
    Ok(courses)
}

/// `compass courses load <file>`.
pub async fn run_courses_load(config: &Config, path: &Path) -> Result<()> {
    let courses = read_courses_file(path)?;
    let store = PgStore::connect(config).await?;
    let summary = load_courses(&store, courses).await?;

    println!("courses load {}", path.display());
    println!("  loaded: {}", summary.loaded);
    println!("  skipped: {}", summary.skipped);
    match summary.avg_latest_bid {
        Some(avg) => println!("  avg latest bid point: {:.1}", avg),
        None => println!("  avg latest bid point: n/a"),
    }
    println!("ok");

    store.pool().close().await;
    Ok(())
}

/// `compass courses probe`: row count and a small sample.
pub async fn run_courses_probe(config: &Config, limit: usize) -> Result<()> {
    let store = PgStore::connect(config).await?;
    let count = store.count_courses().await?;
    let embedded = store.count_embeddings().await?;
    let sample = store.filter_by_title("", limit).await?;

    println!("Course Compass — Store Probe");
    println!("============================");
    println!();
    println!("  {}: {}", config.store.courses_table, count);
    println!("  {}: {}", config.store.embeddings_table, embedded);
    println!();
    for row in &sample {
        let credits = row
            .credits
            .map(|c| format!("{}", c))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} | {} | {} | {}",
            row.course_id,
            row.title,
            row.instructor.as_deref().unwrap_or("-"),
            credits
        );
    }
    if sample.is_empty() {
        println!("  (no rows)");
    }

    store.pool().close().await;
    Ok(())
}
