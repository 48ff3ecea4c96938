use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::config::{read_secret, EmbeddingConfig};
use crate::error::{AdvisorError, Result};
use crate::provider_http::{build_client, post_json};

/// Embedding provider using an OpenAI-compatible API.
///
/// Calls `POST {api_base}/embeddings` with the configured model. The API key
/// is read once, at construction, from the variable named by `api_key_env`.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Create a provider, reading the API key from the environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key variable is unset or blank.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = read_secret(&config.api_key_env)?;
        Self::with_api_key(config, api_key)
    }

    /// Create a provider with an explicit API key.
    pub fn with_api_key(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AdvisorError::config("embedding API key is empty"));
        }
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            url: format!("{}/embeddings", config.api_base.trim_end_matches('/')),
            api_key,
            max_retries: config.max_retries,
            client: build_client(config.timeout_secs, "embeddings")?,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let json = post_json(
            &self.client,
            &self.url,
            &self.api_key,
            &body,
            self.max_retries,
            "embeddings",
        )
        .await?;
        parse_embedding_response(json)
    }
}

/// Extract `data[].embedding`, ordered by `data[].index` when present.
fn parse_embedding_response(json: serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let mut parsed: EmbeddingResponse = serde_json::from_value(json).map_err(|e| {
        AdvisorError::upstream("embeddings", format!("invalid embeddings response: {}", e))
    })?;

    if parsed.data.iter().all(|d| d.index.is_some()) {
        parsed.data.sort_by_key(|d| d.index);
    }

    Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
}
