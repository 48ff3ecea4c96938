//! Core data models used throughout Course Compass.
//!
//! Courses and embedding records are persisted; candidates and
//! recommendation items only live for the duration of one request.

use serde::{Deserialize, Serialize};

use crate::retrieve::Strategy;

/// A course row as stored in the `courses` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub course_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(default)]
    pub credits: Option<f64>,
    #[serde(default)]
    pub skills: Vec<String>,
    /// Chronological, oldest first.
    #[serde(default)]
    pub bid_points: Vec<i32>,
    #[serde(default)]
    pub semester: String,
}

impl Course {
    pub fn new(course_id: &str, title: &str, description: &str) -> Self {
        Self {
            course_id: course_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            instructor: None,
            credits: None,
            skills: Vec::new(),
            bid_points: Vec::new(),
            semester: String::new(),
        }
    }

    pub fn latest_bid_point(&self) -> Option<i32> {
        self.bid_points.last().copied()
    }
}

/// Text fields of a course as read back for embedding.
///
/// Everything is optional because the reader must tolerate rows with holes;
/// the ingestion pipeline decides what to drop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseText {
    pub course_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Result of the keyword title filter.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseRow {
    pub course_id: String,
    pub title: String,
    pub description: String,
    pub instructor: Option<String>,
    pub credits: Option<f64>,
}

/// A hit returned by the `ft_search` procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct FtsHit {
    pub course_id: String,
    pub rank: Option<f64>,
}

/// A row returned by the `match_courses` procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub course_id: String,
    pub title: String,
    pub description: String,
    pub distance: f64,
}

/// One row of the `course_embeddings` table.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub course_id: String,
    pub embedding: Vec<f32>,
}

/// A course eligible to be recommended in one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub course_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Strategy that produced the candidate; `None` when supplied by the caller.
    #[serde(skip)]
    pub matched_by: Option<Strategy>,
    /// Cosine distance, vector strategy only.
    #[serde(skip)]
    pub distance: Option<f64>,
}

impl Candidate {
    pub fn new(course_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            course_id: course_id.into(),
            title: title.into(),
            metadata: None,
            matched_by: None,
            distance: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A validated recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationItem {
    pub course_id: String,
    pub rationale: String,
    pub confidence: f64,
}
