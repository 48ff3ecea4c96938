//! In-memory [`CourseStore`] implementation for tests and offline runs.
//!
//! Uses `BTreeMap` behind `std::sync::RwLock`, so iteration is ordered by
//! `course_id`. Full-text search is a term-overlap count over title and
//! description; vector search is brute-force cosine distance.
//!
//! Rows inserted with [`InMemoryStore::insert_raw_row`] are returned by
//! [`fetch_course_texts`](CourseStore::fetch_course_texts) but are not
//! counted, matching a source table whose reader sees rows the key
//! constraint would otherwise reject.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::CourseStore;
use crate::error::Result;
use crate::models::{Course, CourseRow, CourseText, EmbeddingRecord, FtsHit, VectorMatch};

/// In-memory store for tests and dry runs.
pub struct InMemoryStore {
    courses: RwLock<BTreeMap<String, Course>>,
    raw_rows: RwLock<Vec<CourseText>>,
    embeddings: RwLock<BTreeMap<String, Vec<f32>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            courses: RwLock::new(BTreeMap::new()),
            raw_rows: RwLock::new(Vec::new()),
            embeddings: RwLock::new(BTreeMap::new()),
        }
    }

    /// A store pre-populated with `courses`.
    pub fn with_courses(courses: impl IntoIterator<Item = Course>) -> Self {
        let store = Self::new();
        {
            let mut map = write(&store.courses);
            for course in courses {
                map.insert(course.course_id.clone(), course);
            }
        }
        store
    }

    /// Add a row that bypasses key validation (e.g. a missing `course_id`).
    pub fn insert_raw_row(&self, row: CourseText) {
        write(&self.raw_rows).push(row);
    }

    /// Stored embedding for `course_id`, if any.
    pub fn embedding_for(&self, course_id: &str) -> Option<Vec<f32>> {
        read(&self.embeddings).get(course_id).cloned()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// A poisoned lock still holds consistent data for this store.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        1.0
    } else {
        1.0 - (dot / (mag_a * mag_b)) as f64
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait]
impl CourseStore for InMemoryStore {
    async fn filter_by_title(&self, query: &str, limit: usize) -> Result<Vec<CourseRow>> {
        let needle = query.trim().to_lowercase();
        let courses = read(&self.courses);
        Ok(courses
            .values()
            .filter(|c| c.title.to_lowercase().contains(&needle))
            .take(limit)
            .map(|c| CourseRow {
                course_id: c.course_id.clone(),
                title: c.title.clone(),
                description: c.description.clone(),
                instructor: c.instructor.clone(),
                credits: c.credits,
            })
            .collect())
    }

    async fn ft_search(&self, query: &str, match_count: usize) -> Result<Vec<FtsHit>> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let courses = read(&self.courses);
        let mut scored: Vec<(usize, &str)> = courses
            .values()
            .filter_map(|c| {
                let doc = terms(&format!("{} {}", c.title, c.description));
                let score = query_terms.iter().filter(|t| doc.contains(t)).count();
                (score > 0).then_some((score, c.course_id.as_str()))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        Ok(scored
            .into_iter()
            .take(match_count)
            .map(|(score, id)| FtsHit {
                course_id: id.to_string(),
                rank: Some(score as f64 / query_terms.len() as f64),
            })
            .collect())
    }

    async fn match_courses(
        &self,
        query_embedding: &[f32],
        match_count: usize,
    ) -> Result<Vec<VectorMatch>> {
        let courses = read(&self.courses);
        let embeddings = read(&self.embeddings);

        let mut matches: Vec<VectorMatch> = embeddings
            .iter()
            .filter_map(|(id, vector)| {
                courses.get(id).map(|c| VectorMatch {
                    course_id: c.course_id.clone(),
                    title: c.title.clone(),
                    description: c.description.clone(),
                    distance: cosine_distance(query_embedding, vector),
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.course_id.cmp(&b.course_id))
        });
        matches.truncate(match_count);
        Ok(matches)
    }

    async fn titles_for(&self, course_ids: &[String]) -> Result<HashMap<String, String>> {
        let courses = read(&self.courses);
        Ok(course_ids
            .iter()
            .filter_map(|id| courses.get(id).map(|c| (id.clone(), c.title.clone())))
            .collect())
    }

    async fn fetch_course_texts(&self) -> Result<Vec<CourseText>> {
        let mut rows: Vec<CourseText> = read(&self.courses)
            .values()
            .map(|c| CourseText {
                course_id: Some(c.course_id.clone()),
                title: Some(c.title.clone()),
                description: Some(c.description.clone()),
            })
            .collect();
        rows.extend(read(&self.raw_rows).iter().cloned());
        Ok(rows)
    }

    async fn upsert_courses(&self, courses: &[Course]) -> Result<usize> {
        let mut map = write(&self.courses);
        for course in courses {
            map.insert(course.course_id.clone(), course.clone());
        }
        Ok(courses.len())
    }

    async fn upsert_embeddings(&self, records: &[EmbeddingRecord]) -> Result<usize> {
        let mut map = write(&self.embeddings);
        for record in records {
            map.insert(record.course_id.clone(), record.embedding.clone());
        }
        Ok(records.len())
    }

    async fn count_courses(&self) -> Result<u64> {
        Ok(read(&self.courses).len() as u64)
    }

    async fn count_embeddings(&self) -> Result<u64> {
        Ok(read(&self.embeddings).len() as u64)
    }
}
