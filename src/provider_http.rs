//! JSON-over-HTTP plumbing shared by the OpenAI-compatible providers.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 500ms, 1s, 2s, 4s, ... (capped at 2^5 × 500ms)

use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::error::{AdvisorError, Result};

const MAX_ERROR_BODY_CHARS: usize = 300;

/// Build the process-wide client for one provider.
pub(crate) fn build_client(timeout_secs: u64, service: &'static str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AdvisorError::upstream(service, format!("failed to build HTTP client: {}", e)))
}

/// POST `body` to `url` with bearer auth, retrying transient failures.
pub(crate) async fn post_json<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &B,
    max_retries: u32,
    service: &'static str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_millis(500 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        AdvisorError::upstream(service, format!("invalid JSON response: {}", e))
                    });
                }

                let body_text = truncate(&response.text().await.unwrap_or_default());
                let err = AdvisorError::upstream(service, format!("HTTP {}: {}", status, body_text));

                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(service, attempt, status = status.as_u16(), "retryable provider error");
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                let detail = if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                };
                warn!(service, attempt, error = %detail, "provider request failed");
                last_err = Some(AdvisorError::upstream(service, detail));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| AdvisorError::upstream(service, "request failed after retries")))
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_ERROR_BODY_CHARS {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        cut.push('…');
        cut
    }
}
