//! DeepSeek (OpenAI-compatible) chat completion client.
//! Connection pooling via reqwest, simple token-bucket rate limiting, and
//! retry on 429 / 5xx / timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::CompletionProvider;
use crate::config::ProviderConfig;
use crate::error::ProviderError;

const MAX_429_RETRIES: u32 = 3;
const MAX_5XX_RETRIES: u32 = 2;
/// Output copies budgeted per request; the trend-slang instruction asks for
/// up to three candidates.
const OUTPUT_COPIES: u32 = 3;
/// DeepSeek chat output ceiling.
const MAX_OUTPUT_TOKENS: u32 = 8192;

pub struct DeepSeekProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    /// Simple token-bucket: tracks the next allowed request time.
    next_allowed: Arc<tokio::sync::Mutex<Instant>>,
    min_interval: Duration,
}

impl DeepSeekProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::Config("DEEPSEEK_API_KEY not set".into()))?;

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            next_allowed: Arc::new(tokio::sync::Mutex::new(Instant::now())),
            min_interval: config.min_interval,
        })
    }

    /// Wait until the rate limiter allows a request.
    async fn rate_limit_wait(&self) {
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep(*next - now).await;
        }
        *next = Instant::now() + self.min_interval;
    }

    /// Send with retry.
    /// 429: Retry-After or 1s/2s/4s (max 3).
    /// 5xx: exponential backoff from 500ms (max 2).
    /// Timeout: immediate retry once.
    async fn send_with_retry(
        &self,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut attempt: u32 = 0;
        let mut timeout_retried = false;

        loop {
            let result = self
                .http
                .post(format!("{}/v1/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if resp.status().as_u16() == 429 => {
                    let retry_after = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(Duration::from_secs);
                    if attempt >= MAX_429_RETRIES {
                        return Err(ProviderError::RateLimited {
                            retry_after_ms: retry_after.map_or(0, |d| d.as_millis() as u64),
                        });
                    }
                    let wait = retry_after.unwrap_or_else(|| Duration::from_secs(1 << attempt));
                    warn!(attempt, wait_ms = wait.as_millis() as u64, "429 rate limited, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Ok(resp) if resp.status().is_server_error() => {
                    if attempt >= MAX_5XX_RETRIES {
                        return Err(ProviderError::Api(format!("server error: {}", resp.status())));
                    }
                    let wait = Duration::from_millis(500 * (1 << attempt));
                    warn!(
                        attempt,
                        status = resp.status().as_u16(),
                        wait_ms = wait.as_millis() as u64,
                        "5xx error, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body_text = resp.text().await.unwrap_or_default();
                    return Err(ProviderError::Api(format!(
                        "unexpected status {}: {}",
                        status,
                        body_text.chars().take(200).collect::<String>()
                    )));
                }
                Err(e) if e.is_timeout() => {
                    if timeout_retried {
                        return Err(ProviderError::Timeout);
                    }
                    warn!("request timeout, retrying once");
                    timeout_retried = true;
                }
                Err(e) => return Err(ProviderError::Api(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl CompletionProvider for DeepSeekProvider {
    async fn complete(&self, instruction: &str, input: &str) -> Result<String, ProviderError> {
        self.rate_limit_wait().await;

        let max_tokens = estimate_max_tokens(input);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": instruction},
                {"role": "user", "content": input}
            ],
            "max_tokens": max_tokens,
            "stream": false,
            "temperature": 0.7
        });

        let start = Instant::now();
        let response = self.send_with_retry(&body).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Api(format!("malformed response: {e}")))?;

        let tokens = parsed.usage.map_or(0, |u| u.total_tokens);
        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(ProviderError::EmptyResponse);
        };

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            tokens,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("none"),
            "completion received"
        );

        if choice.finish_reason.as_deref() == Some("length") {
            warn!(max_tokens, input_chars = input.chars().count(), "completion truncated");
            return Err(ProviderError::Truncated { max_tokens });
        }
        let text = choice
            .message
            .content
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Estimate max_tokens: room for every candidate copy of the input, between
/// 64 and the model ceiling.
fn estimate_max_tokens(text: &str) -> u32 {
    // ~2 chars/token keeps headroom for non-ASCII and wordier targets
    let per_copy = (text.chars().count() as u32).div_ceil(2) + 32;
    (per_copy * OUTPUT_COPIES + 64).clamp(64, MAX_OUTPUT_TOKENS)
}

// --- Response types ---

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}
