//! Error taxonomy shared by the retrieval, recommendation and ingestion paths.
//!
//! | Variant | Meaning | HTTP |
//! |---------|---------|------|
//! | [`AdvisorError::Validation`] | Malformed or missing request field | 400 / 422 |
//! | [`AdvisorError::Configuration`] | Missing URL, credential or provider setting | 500 |
//! | [`AdvisorError::Upstream`] | Store or model provider call failed | 500 |
//! | [`AdvisorError::ReconciliationMismatch`] | Post-ingest counts disagree | CLI exit 2 |
//! | [`AdvisorError::NothingToIngest`] | Source table yielded no usable rows | CLI exit 1 |
//!
//! A model returning garbage is not an error: the recommend path degrades to
//! an empty list instead (see [`crate::recommend`]).

use std::fmt;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, AdvisorError>;

/// Why a request field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    /// Field absent or blank.
    Missing,
    /// Field present but of the wrong shape (or the body is not JSON).
    Malformed,
    /// Field well-formed but outside its allowed range.
    OutOfRange,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationKind::Missing => "missing",
            ValidationKind::Malformed => "malformed",
            ValidationKind::OutOfRange => "out of range",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdvisorError {
    #[error("{message}")]
    Validation {
        field: String,
        kind: ValidationKind,
        message: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{service} error: {detail}")]
    Upstream {
        service: &'static str,
        detail: String,
    },

    #[error(
        "reconciliation mismatch: courses={courses} course_embeddings={embeddings} embedded={embedded} (difference {})",
        signed_difference(.courses, .embeddings)
    )]
    ReconciliationMismatch {
        courses: u64,
        embeddings: u64,
        embedded: u64,
    },

    #[error("no courses fetched; check table name, permissions, or data")]
    NothingToIngest,
}

fn signed_difference(courses: &u64, embeddings: &u64) -> i64 {
    *courses as i64 - *embeddings as i64
}

impl AdvisorError {
    pub fn missing(field: &str, message: impl Into<String>) -> Self {
        AdvisorError::Validation {
            field: field.to_string(),
            kind: ValidationKind::Missing,
            message: message.into(),
        }
    }

    pub fn malformed(field: &str, message: impl Into<String>) -> Self {
        AdvisorError::Validation {
            field: field.to_string(),
            kind: ValidationKind::Malformed,
            message: message.into(),
        }
    }

    pub fn out_of_range(field: &str, message: impl Into<String>) -> Self {
        AdvisorError::Validation {
            field: field.to_string(),
            kind: ValidationKind::OutOfRange,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        AdvisorError::Configuration(message.into())
    }

    pub fn upstream(service: &'static str, detail: impl fmt::Display) -> Self {
        AdvisorError::Upstream {
            service,
            detail: detail.to_string(),
        }
    }

    /// Short label used in structured log events.
    pub fn category(&self) -> &'static str {
        match self {
            AdvisorError::Validation { .. } => "validation",
            AdvisorError::Configuration(_) => "configuration",
            AdvisorError::Upstream { .. } => "upstream",
            AdvisorError::ReconciliationMismatch { .. } => "reconciliation",
            AdvisorError::NothingToIngest => "empty_source",
        }
    }
}

impl From<sqlx::Error> for AdvisorError {
    fn from(err: sqlx::Error) -> Self {
        AdvisorError::upstream("store", err)
    }
}
