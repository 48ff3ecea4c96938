//! The recommend pipeline.
//!
//! ```text
//! intent ─► candidates (caller-supplied, or retrieved) ─► first N
//!        ─► prompt ─► completion ─► parse ─► whitelist validate ─► items
//! ```
//!
//! Once a candidate set exists the pipeline degrades instead of failing: a
//! provider outage or unparseable output yields an empty list and a `warn!`
//! event. Configuration errors are the exception and always propagate.

pub mod parse;
pub mod prompt;
pub mod validate;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::completion::CompletionProvider;
use crate::config::Config;
use crate::error::{AdvisorError, Result};
use crate::models::{Candidate, RecommendationItem};
use crate::retrieve::{dedup_candidates, Retriever, Strategy};
use crate::services::Services;

pub use prompt::clamp_top_k;

/// Where the candidate set for one request comes from.
#[derive(Debug, Clone)]
pub enum CandidateSource {
    /// Candidate objects supplied by the caller.
    Supplied(Vec<Candidate>),
    /// Retrieve with the given strategy, using the intent as the query.
    Retrieve(Strategy),
}

pub struct Recommender {
    retriever: Retriever,
    completion: Arc<dyn CompletionProvider>,
    max_candidates: usize,
}

impl Recommender {
    pub fn new(
        retriever: Retriever,
        completion: Arc<dyn CompletionProvider>,
        max_candidates: usize,
    ) -> Self {
        Self {
            retriever,
            completion,
            max_candidates: max_candidates.max(1),
        }
    }

    /// Recommend up to `top_k` (clamped) courses for `intent`.
    ///
    /// Every returned `course_id` is one of the first `max_candidates`
    /// candidates.
    pub async fn recommend(
        &self,
        intent: &str,
        top_k: i64,
        source: CandidateSource,
    ) -> Result<Vec<RecommendationItem>> {
        let intent = intent.trim();
        if intent.is_empty() {
            return Err(AdvisorError::missing(
                "intent",
                "Missing intent: provide 'q', 'query' or 'profession'",
            ));
        }
        let top_k = clamp_top_k(top_k);

        let mut candidates = match source {
            CandidateSource::Supplied(list) => dedup_candidates(list),
            CandidateSource::Retrieve(strategy) => {
                self.retriever
                    .retrieve(intent, self.max_candidates, strategy)
                    .await?
            }
        };
        candidates.truncate(self.max_candidates);

        if candidates.is_empty() {
            info!(count = 0, "no candidates; skipping completion");
            return Ok(Vec::new());
        }

        let allowed: HashSet<String> = candidates.iter().map(|c| c.course_id.clone()).collect();
        let chat = prompt::build_prompt(intent, &candidates, top_k);

        let text = match self.completion.complete(&chat).await {
            Ok(text) => text,
            Err(e @ AdvisorError::Configuration(_)) => return Err(e),
            Err(e) => {
                warn!(
                    error = %e,
                    model = self.completion.model_name(),
                    "completion failed; returning no recommendations"
                );
                return Ok(Vec::new());
            }
        };

        let raw = parse::parse_recommendations(&text);
        if raw.is_empty() {
            warn!(chars = text.len(), "model output contained no recommendations");
        }
        let items = validate::validate(&raw, &allowed, top_k);
        info!(
            candidates = candidates.len(),
            raw = raw.len(),
            count = items.len(),
            "recommendations validated"
        );
        Ok(items)
    }
}

/// `compass recommend`: run the pipeline with retrieved candidates and print
/// the items.
pub async fn run_recommend(
    config: &Config,
    intent: &str,
    top_k: i64,
    strategy: Option<&str>,
) -> anyhow::Result<()> {
    let strategy = match strategy {
        Some(name) => name.parse::<Strategy>()?,
        None => config.retrieval.recommend_strategy(),
    };

    let services = Services::from_config(config).await?;
    let items = services
        .recommender(config)
        .recommend(intent, top_k, CandidateSource::Retrieve(strategy))
        .await?;

    if items.is_empty() {
        println!("No recommendations.");
        return Ok(());
    }
    for (i, item) in items.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, item.confidence, item.course_id);
        println!("    {}", item.rationale);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ChatPrompt;
    use crate::embedding::DisabledProvider;
    use crate::models::Course;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        reply: std::result::Result<String, &'static str>,
        prompts: Mutex<Vec<ChatPrompt>>,
    }

    impl Scripted {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }
        fn failing(kind: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(kind),
                prompts: Mutex::new(Vec::new()),
            })
        }
        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionProvider for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, prompt: &ChatPrompt) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err("config") => Err(AdvisorError::config("no key")),
                Err(_) => Err(AdvisorError::upstream("completion", "HTTP 503")),
            }
        }
    }

    fn recommender(completion: Arc<Scripted>, max_candidates: usize) -> Recommender {
        let store = Arc::new(InMemoryStore::with_courses(vec![
            Course::new("PM101", "Product Management Essentials", "Roadmaps."),
            Course::new("PM201", "Advanced Product Strategy", "Pricing."),
        ]));
        let retriever = Retriever::new(store, Arc::new(DisabledProvider), 500);
        Recommender::new(retriever, completion, max_candidates)
    }

    fn supplied(n: usize) -> CandidateSource {
        CandidateSource::Supplied(
            (0..n)
                .map(|i| Candidate::new(format!("C{}", i), format!("Course {}", i)))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_adversarial_ids_never_returned() {
        let model = Scripted::ok(
            r#"{"recommendations":[
                {"course_id":"EVIL1","rationale":"invented","confidence":1},
                {"course_id":"PM101","rationale":"good fit","confidence":0.8}
            ]}"#,
        );
        let rec = recommender(model, 10);
        let items = rec
            .recommend("product management", 3, CandidateSource::Retrieve(Strategy::Title))
            .await
            .unwrap();
        assert!(items.iter().all(|i| i.course_id == "PM101"));
    }

    #[tokio::test]
    async fn test_only_first_candidates_are_shown() {
        let model = Scripted::ok(r#"[{"course_id":"C11","rationale":"past the cut"}]"#);
        let rec = recommender(model.clone(), 10);
        let items = rec.recommend("anything", 5, supplied(15)).await.unwrap();
        assert!(items.is_empty());

        let shown: serde_json::Value =
            serde_json::from_str(&model.prompts.lock().unwrap()[0].user).unwrap();
        assert_eq!(shown["candidates"].as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_upstream_failure_degrades_to_empty() {
        let rec = recommender(Scripted::failing("upstream"), 10);
        let items = rec.recommend("finance", 5, supplied(2)).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_configuration_failure_propagates() {
        let rec = recommender(Scripted::failing("config"), 10);
        let err = rec.recommend("finance", 5, supplied(2)).await.unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[tokio::test]
    async fn test_no_candidates_skips_model() {
        let model = Scripted::ok("[]");
        let rec = recommender(model.clone(), 10);
        let items = rec
            .recommend("marine biology", 5, CandidateSource::Retrieve(Strategy::Title))
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_intent_is_validation_error() {
        let rec = recommender(Scripted::ok("[]"), 10);
        let err = rec.recommend("  ", 5, supplied(1)).await.unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[tokio::test]
    async fn test_top_k_clamped_to_max() {
        let reply: Vec<serde_json::Value> = (0..40)
            .map(|i| serde_json::json!({"course_id": format!("C{}", i), "rationale": "r"}))
            .collect();
        let model = Scripted::ok(&serde_json::to_string(&reply).unwrap());
        let rec = recommender(model, 40);
        let items = rec.recommend("anything", 999, supplied(40)).await.unwrap();
        assert_eq!(items.len(), 25);
    }
}
