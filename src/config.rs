//! TOML configuration.
//!
//! Every section except `[store]` and `[server]` has defaults, so a minimal
//! config only names the database URL variable and the bind address.
//! Secrets never live in the file: `url_env` and `api_key_env` name the
//! environment variables that hold them.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::error::AdvisorError;
use crate::retrieve::Strategy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
}

impl Config {
    /// A config with every default applied, bound to `bind`.
    ///
    /// Used by tests and embedders that assemble services by hand.
    pub fn minimal(bind: &str) -> Self {
        Self {
            store: StoreConfig::default(),
            embedding: EmbeddingConfig::default(),
            completion: CompletionConfig::default(),
            retrieval: RetrievalConfig::default(),
            server: ServerConfig {
                bind: bind.to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Environment variable holding the Postgres connection string.
    #[serde(default = "default_url_env")]
    pub url_env: String,
    #[serde(default = "default_courses_table")]
    pub courses_table: String,
    #[serde(default = "default_embeddings_table")]
    pub embeddings_table: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url_env: default_url_env(),
            courses_table: default_courses_table(),
            embeddings_table: default_embeddings_table(),
            max_connections: default_max_connections(),
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

fn default_url_env() -> String {
    "DATABASE_URL".to_string()
}
fn default_courses_table() -> String {
    "courses".to_string()
}
fn default_embeddings_table() -> String {
    "course_embeddings".to_string()
}
fn default_max_connections() -> u32 {
    5
}
fn default_store_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Description characters kept when building ingestion text.
    #[serde(default = "default_text_max_chars")]
    pub text_max_chars: usize,
    /// Query characters kept before embedding a search query.
    #[serde(default = "default_text_max_chars")]
    pub query_max_chars: usize,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            text_max_chars: default_text_max_chars(),
            query_max_chars: default_text_max_chars(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    50
}
fn default_text_max_chars() -> usize {
    500
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_embedding_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Ask the provider for a JSON object response (`response_format`).
    #[serde(default = "default_json_mode")]
    pub json_mode: bool,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_completion_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            model: default_completion_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            json_mode: default_json_mode(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            max_retries: default_completion_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_completion_provider() -> String {
    "openai".to_string()
}
fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    600
}
fn default_json_mode() -> bool {
    true
}
fn default_completion_retries() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_search_strategy")]
    pub search_strategy: String,
    #[serde(default = "default_recommend_strategy")]
    pub recommend_strategy: String,
    /// Candidates shown to the completion model per request.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_strategy: default_search_strategy(),
            recommend_strategy: default_recommend_strategy(),
            max_candidates: default_max_candidates(),
        }
    }
}

impl RetrievalConfig {
    pub fn search_strategy(&self) -> Strategy {
        self.search_strategy.parse().unwrap_or(Strategy::Title)
    }

    pub fn recommend_strategy(&self) -> Strategy {
        self.recommend_strategy.parse().unwrap_or(Strategy::FullText)
    }
}

fn default_search_strategy() -> String {
    "title".to_string()
}
fn default_recommend_strategy() -> String {
    "fts".to_string()
}
fn default_max_candidates() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl StoreConfig {
    /// Resolve the connection string from the environment.
    pub fn database_url(&self) -> std::result::Result<String, AdvisorError> {
        read_secret(&self.url_env)
    }
}

/// Read a required, non-blank environment variable.
pub fn read_secret(var: &str) -> std::result::Result<String, AdvisorError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(AdvisorError::config(format!("{} is not set", var))),
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    for table in [&config.store.courses_table, &config.store.embeddings_table] {
        if !is_safe_identifier(table) {
            bail!("store table name '{}' must be a plain identifier", table);
        }
    }
    if config.store.max_connections == 0 {
        bail!("store.max_connections must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.text_max_chars == 0 || config.embedding.query_max_chars == 0 {
        bail!("embedding.text_max_chars and embedding.query_max_chars must be > 0");
    }

    match config.completion.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown completion provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.completion.temperature) {
        bail!("completion.temperature must be in [0.0, 2.0]");
    }
    if config.completion.max_tokens == 0 {
        bail!("completion.max_tokens must be > 0");
    }

    for name in [
        &config.retrieval.search_strategy,
        &config.retrieval.recommend_strategy,
    ] {
        if let Err(e) = name.parse::<Strategy>() {
            bail!("retrieval: {}", e);
        }
    }
    if config.retrieval.max_candidates == 0 {
        bail!("retrieval.max_candidates must be >= 1");
    }

    Ok(())
}
