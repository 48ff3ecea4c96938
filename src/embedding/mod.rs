//! Embedding provider abstraction and the batch client.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — returns configuration errors; used when embeddings are not configured.
//! - **[`OpenAIProvider`]** — calls an OpenAI-compatible `/embeddings` endpoint with retry and backoff.
//!
//! On top of the trait, [`embed_texts`] is the batch client used by ingestion:
//! it splits input into fixed-size batches, calls the provider once per batch
//! (sequentially), and checks the postconditions before anything is returned:
//!
//! 1. one vector per input text, in input order;
//! 2. every vector has exactly [`EmbeddingProvider::dims`] components.
//!
//! A violation fails the whole call. Partially valid output never escapes.
//!
//! # Provider Selection
//!
//! | Config Value | Provider |
//! |-------------|----------|
//! | `"disabled"` | [`DisabledProvider`] |
//! | `"openai"` | [`OpenAIProvider`] |

mod openai;

pub use openai::OpenAIProvider;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::{AdvisorError, Result};

/// Trait for embedding providers.
///
/// `embed_batch` is one remote call. Batching and shape validation live in
/// [`embed_texts`], so implementations stay thin.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed one batch of texts with a single provider call.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed `texts` in batches of `batch_size`, preserving length and order.
///
/// # Errors
///
/// - any provider call fails (already retried by the provider);
/// - a batch returns the wrong number of vectors;
/// - any vector's length differs from `provider.dims()`.
pub async fn embed_texts(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());

    for (i, batch) in texts.chunks(batch_size).enumerate() {
        debug!(batch = i + 1, size = batch.len(), model = provider.model_name(), "embedding batch");
        let batch_vectors = provider.embed_batch(batch).await?;
        if batch_vectors.len() != batch.len() {
            return Err(AdvisorError::upstream(
                "embeddings",
                format!(
                    "batch {}: expected {} vectors, got {}",
                    i + 1,
                    batch.len(),
                    batch_vectors.len()
                ),
            ));
        }
        vectors.extend(batch_vectors);
    }

    validate_shape(&vectors, texts.len(), provider.dims())?;
    Ok(vectors)
}

/// Embed a single query text for vector retrieval.
///
/// The query is trimmed and cut to `max_chars` characters; blank queries are
/// rejected before any network call.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    text: &str,
    max_chars: usize,
) -> Result<Vec<f32>> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AdvisorError::missing("query", "query must not be empty"));
    }
    let text: String = text.chars().take(max_chars).collect();

    embed_texts(provider, &[text], 1)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AdvisorError::upstream("embeddings", "empty embedding response"))
}

/// Check the batch client postconditions.
pub fn validate_shape(vectors: &[Vec<f32>], expected_count: usize, dims: usize) -> Result<()> {
    if vectors.len() != expected_count {
        return Err(AdvisorError::upstream(
            "embeddings",
            format!("expected {} vectors, got {}", expected_count, vectors.len()),
        ));
    }
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
        return Err(AdvisorError::upstream(
            "embeddings",
            format!("vector {} has dimension {}; expected {}", i, v.len(), dims),
        ));
    }
    Ok(())
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns configuration errors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(AdvisorError::config(
            "embedding provider is disabled; set [embedding] provider in config",
        ))
    }
}

/// Create the [`EmbeddingProvider`] named by the configuration.
///
/// # Errors
///
/// Returns a configuration error for unknown provider names or a missing
/// API key.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        other => Err(AdvisorError::config(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns `dims`-length vectors whose first component is the text length,
    /// recording each batch it receives.
    struct FakeProvider {
        dims: usize,
        batches: Mutex<Vec<usize>>,
        drop_last: bool,
        bad_dims_at: Option<usize>,
    }

    impl FakeProvider {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                batches: Mutex::new(Vec::new()),
                drop_last: false,
                bad_dims_at: None,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FakeProvider {
        fn model_name(&self) -> &str {
            "fake"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let seen = {
                let mut batches = self.batches.lock().unwrap();
                batches.push(texts.len());
                batches.iter().sum::<usize>() - texts.len()
            };
            let mut out: Vec<Vec<f32>> = texts
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let dims = if self.bad_dims_at == Some(seen + i) {
                        self.dims + 1
                    } else {
                        self.dims
                    };
                    let mut v = vec![0.0; dims];
                    v[0] = t.len() as f32;
                    v
                })
                .collect();
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| "x".repeat(i + 1)).collect()
    }

    #[tokio::test]
    async fn test_batches_and_preserves_order() {
        let provider = FakeProvider::new(4);
        let input = texts(7);
        let vectors = embed_texts(&provider, &input, 3).await.unwrap();

        assert_eq!(*provider.batches.lock().unwrap(), vec![3, 3, 1]);
        assert_eq!(vectors.len(), 7);
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(v[0], (i + 1) as f32);
        }
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let provider = FakeProvider::new(4);
        let vectors = embed_texts(&provider, &[], 3).await.unwrap();
        assert!(vectors.is_empty());
        assert!(provider.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_count_mismatch_is_hard_failure() {
        let mut provider = FakeProvider::new(4);
        provider.drop_last = true;
        let err = embed_texts(&provider, &texts(5), 2).await.unwrap_err();
        assert_eq!(err.category(), "upstream");
        assert!(err.to_string().contains("expected 2 vectors, got 1"));
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejects_everything() {
        let mut provider = FakeProvider::new(4);
        provider.bad_dims_at = Some(4);
        let err = embed_texts(&provider, &texts(6), 2).await.unwrap_err();
        assert!(err.to_string().contains("vector 4 has dimension 5; expected 4"));
    }

    #[tokio::test]
    async fn test_embed_query_rejects_blank() {
        let provider = FakeProvider::new(4);
        let err = embed_query(&provider, "   ", 500).await.unwrap_err();
        assert_eq!(err.category(), "validation");
        assert!(provider.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embed_query_truncates() {
        let provider = FakeProvider::new(4);
        let long = "q".repeat(900);
        let v = embed_query(&provider, &long, 500).await.unwrap();
        assert_eq!(v[0], 500.0);
    }

    #[tokio::test]
    async fn test_disabled_provider_is_configuration_error() {
        let err = DisabledProvider
            .embed_batch(&["x".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_validate_shape_ok() {
        let v = vec![vec![0.0; 3], vec![1.0; 3]];
        assert!(validate_shape(&v, 2, 3).is_ok());
    }
}
