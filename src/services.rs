//! Process-wide clients, built once and shared.
//!
//! Handlers and CLI commands receive a [`Services`] value instead of
//! constructing clients themselves. Tests build one by hand around an
//! [`InMemoryStore`](crate::store::InMemoryStore) and scripted providers.

use std::sync::Arc;

use crate::completion::{self, CompletionProvider};
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::Result;
use crate::recommend::Recommender;
use crate::retrieve::Retriever;
use crate::store::{CourseStore, PgStore};

#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn CourseStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub completion: Arc<dyn CompletionProvider>,
}

impl Services {
    /// Connect the Postgres store and create both providers from config.
    ///
    /// The store connects first, so a missing database URL is reported before
    /// a missing API key.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = PgStore::connect(config).await?;
        Ok(Self {
            store: Arc::new(store),
            embedder: embedding::create_provider(&config.embedding)?,
            completion: completion::create_provider(&config.completion)?,
        })
    }

    pub fn retriever(&self, config: &Config) -> Retriever {
        Retriever::new(
            self.store.clone(),
            self.embedder.clone(),
            config.embedding.query_max_chars,
        )
    }

    pub fn recommender(&self, config: &Config) -> Recommender {
        Recommender::new(
            self.retriever(config),
            self.completion.clone(),
            config.retrieval.max_candidates,
        )
    }
}
