//! Chat-completion provider abstraction.
//!
//! The recommend path talks to a hosted completion model through
//! [`CompletionProvider`]. The only implementation shipped is an
//! OpenAI-compatible `POST {api_base}/chat/completions` client; tests script
//! the trait directly.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{read_secret, CompletionConfig};
use crate::error::{AdvisorError, Result};
use crate::provider_http::{build_client, post_json};

/// A two-message chat prompt.
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

/// Trait implemented by completion backends.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn model_name(&self) -> &str;
    /// Send the prompt and return the raw text of the first choice.
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String>;
}

pub struct DisabledCompletion;

#[async_trait]
impl CompletionProvider for DisabledCompletion {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &ChatPrompt) -> Result<String> {
        Err(AdvisorError::config(
            "completion provider is disabled; set [completion] provider in config",
        ))
    }
}

pub struct OpenAIChat {
    model: String,
    temperature: f32,
    max_tokens: u32,
    json_mode: bool,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = read_secret(&config.api_key_env)?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &CompletionConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AdvisorError::config("completion API key is empty"));
        }
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            json_mode: config.json_mode,
            url: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            max_retries: config.max_retries,
            client: build_client(config.timeout_secs, "completion")?,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionProvider for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &ChatPrompt) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            response_format: self.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let json = post_json(
            &self.client,
            &self.url,
            &self.api_key,
            &body,
            self.max_retries,
            "completion",
        )
        .await?;

        first_choice_text(json)
    }
}

fn first_choice_text(json: serde_json::Value) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_value(json).map_err(|e| {
        AdvisorError::upstream("completion", format!("invalid completion response: {}", e))
    })?;
    Ok(parsed
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .unwrap_or_default())
}

/// Create the [`CompletionProvider`] named by the configuration.
pub fn create_provider(config: &CompletionConfig) -> Result<Arc<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompletion)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        other => Err(AdvisorError::config(format!(
            "unknown completion provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_choice_text() {
        let json = json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"recommendations\": []}"}}]
        });
        assert_eq!(first_choice_text(json).unwrap(), "{\"recommendations\": []}");
    }

    #[test]
    fn test_null_content_is_empty_text() {
        let json = json!({"choices": [{"message": {"role": "assistant", "content": null}}]});
        assert_eq!(first_choice_text(json).unwrap(), "");
    }

    #[test]
    fn test_malformed_response_is_upstream_error() {
        let err = first_choice_text(json!({"error": "nope"})).unwrap_err();
        assert_eq!(err.category(), "upstream");
    }

    #[test]
    fn test_request_shape_includes_json_mode() {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            temperature: 0.2,
            max_tokens: 600,
            messages: [
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "usr",
                },
            ],
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["response_format"]["type"], "json_object");
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["max_tokens"], 600);
    }

    #[tokio::test]
    async fn test_disabled_is_configuration_error() {
        let prompt = ChatPrompt {
            system: String::new(),
            user: String::new(),
        };
        let err = DisabledCompletion.complete(&prompt).await.unwrap_err();
        assert_eq!(err.category(), "configuration");
    }
}
