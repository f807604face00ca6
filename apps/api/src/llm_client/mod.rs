/// LLM Client: the single point of entry for all chat-completion calls.
///
/// No other module may talk to the provider directly. Callers depend on the
/// `ChatModel` trait so the pipeline can be exercised without network access.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

/// Total attempts per call when the provider answers 429.
pub const MAX_ATTEMPTS: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Minimal chat-completion seam used by the report pipeline.
/// Without a system prompt the request carries the user message alone.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Text of the first choice, if the provider returned any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// Connection settings, split out of `Config` so the client can be built in isolation.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub rate_limit_backoff: Duration,
}

impl From<&Config> for LlmSettings {
    fn from(config: &Config) -> Self {
        Self {
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.clone(),
            model: config.openai_model.clone(),
            temperature: config.llm_temperature,
            rate_limit_backoff: Duration::from_millis(config.rate_limit_backoff_ms),
        }
    }
}

/// Chat Completions client with fixed-delay retry on rate limiting.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    settings: LlmSettings,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, settings })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    /// Makes a raw call, returning the full response object.
    /// A 429 sleeps for the configured backoff and retries, up to `MAX_ATTEMPTS` in total.
    pub async fn call(
        &self,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<ChatResponse, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request_body = ChatRequest {
            model: &self.settings.model,
            temperature: self.settings.temperature,
            messages,
        };

        for attempt in 1..=MAX_ATTEMPTS {
            let response = self
                .client
                .post(self.endpoint())
                .bearer_auth(&self.settings.api_key)
                .json(&request_body)
                .send()
                .await?;

            let status = response.status();

            if status.as_u16() == 429 {
                let body = response.text().await.unwrap_or_default();
                warn!(
                    "LLM rate limited (attempt {}/{}): {}",
                    attempt, MAX_ATTEMPTS, body
                );
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(self.settings.rate_limit_backoff).await;
                }
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ProviderError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let chat_response: ChatResponse = response.json().await?;

            if let Some(usage) = &chat_response.usage {
                debug!(
                    "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                    usage.prompt_tokens, usage.completion_tokens
                );
            }

            return Ok(chat_response);
        }

        Err(LlmError::RateLimited {
            attempts: MAX_ATTEMPTS,
        })
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String, LlmError> {
        let response = self.call(system, prompt).await?;
        let text = response.text().map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(text.to_string())
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    use super::*;

    /// Spawns a fake provider that answers 429 for the first `rate_limited` calls.
    async fn spawn_provider(rate_limited: u32, reply: Value) -> (String, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(
                    move |State((hits, reply)): State<(Arc<AtomicU32>, Value)>,
                     Json(body): Json<Value>| async move {
                        let messages = body["messages"].as_array().unwrap();
                        assert_eq!(messages.last().unwrap()["role"], "user");
                        let n = hits.fetch_add(1, Ordering::SeqCst);
                        if n < rate_limited {
                            (
                                StatusCode::TOO_MANY_REQUESTS,
                                Json(json!({"error": {"message": "slow down"}})),
                            )
                        } else {
                            (StatusCode::OK, Json(reply))
                        }
                    },
                ),
            )
            .with_state((hits.clone(), reply));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/v1"), hits)
    }

    fn client_for(base_url: String) -> LlmClient {
        LlmClient::new(LlmSettings {
            api_key: "test-key".to_string(),
            base_url,
            model: "gpt-4".to_string(),
            temperature: 0.7,
            rate_limit_backoff: Duration::from_millis(5),
        })
        .unwrap()
    }

    fn completion(text: &str) -> Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": text}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        })
    }

    #[tokio::test]
    async fn test_complete_returns_trimmed_text() {
        let (url, hits) = spawn_provider(0, completion("  Revenue grew 12%.\n")).await;
        let text = client_for(url).complete(Some("system"), "prompt").await.unwrap();
        assert_eq!(text, "Revenue grew 12%.");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_until_success() {
        let (url, hits) = spawn_provider(2, completion("ok")).await;
        let text = client_for(url).complete(Some("system"), "prompt").await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up_after_max_attempts() {
        let (url, hits) = spawn_provider(u32::MAX, completion("never")).await;
        let err = client_for(url).complete(Some("system"), "prompt").await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { attempts: MAX_ATTEMPTS }));
        assert_eq!(hits.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_empty_content_is_an_error() {
        let (url, _) = spawn_provider(0, completion("   ")).await;
        let err = client_for(url).complete(Some("system"), "prompt").await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent));
    }

    #[tokio::test]
    async fn test_client_error_surfaces_provider_message() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": {"message": "Incorrect API key provided"}})),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let err = client_for(format!("http://{addr}/v1"))
            .complete(Some("system"), "prompt")
            .await
            .unwrap_err();
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_without_system_prompt_only_user_message_is_sent() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                let messages = body["messages"].as_array().cloned().unwrap_or_default();
                if messages.len() == 1 && messages[0]["role"] == "user" {
                    (StatusCode::OK, Json(completion("single message")))
                } else {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"error": {"message": "unexpected messages"}})),
                    )
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let text = client_for(format!("http://{addr}/v1"))
            .complete(None, "Instruction\n\nContext:\nRevenue 10M")
            .await
            .unwrap();
        assert_eq!(text, "single message");
    }

    #[test]
    fn test_endpoint_tolerates_trailing_slash() {
        let client = client_for("https://api.example.com/v1/".to_string());
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
    }
}
