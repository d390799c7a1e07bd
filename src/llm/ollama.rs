use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{ChatMessage, ChatModel, Embedder};
use crate::config::LlmConfig;
use crate::error::{RagsyncError, Result};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Client for an Ollama-compatible model server
///
/// Embeds via `POST /api/embed` and chats via `POST /api/chat`. Rate limits,
/// server errors and connection failures are retried with exponential backoff;
/// other client errors fail immediately.
pub struct OllamaClient {
    client: Client,
    base_url: Url,
    chat_model: String,
    embedding_model: String,
    batch_size: usize,
    max_retries: usize,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let base_url = Url::parse(&config.server_url)
            .map_err(|e| RagsyncError::Config(format!("Invalid llm.server_url '{}': {}", config.server_url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagsyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagsyncError::Config(format!("Invalid endpoint {}: {}", path, e)))
    }

    async fn post_json<B, R>(&self, path: &str, body: &B, wrap: fn(String) -> RagsyncError) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                log::warn!("Retry {}/{} for {} in {:?}", attempt, self.max_retries, path, delay);
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.post(url.clone()).json(body).send().await {
                Ok(response) => response,
                Err(e) => {
                    last_err = Some(wrap(format!(
                        "connection error (is the model server running at {}?): {}",
                        self.base_url, e
                    )));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<R>()
                    .await
                    .map_err(|e| wrap(format!("failed to parse response: {}", e)));
            }

            let body_text = response.text().await.unwrap_or_default();
            let err = wrap(format!("API error {}: {}", status, body_text));
            if !is_retryable(status) {
                return Err(err);
            }
            last_err = Some(err);
        }

        Err(last_err.unwrap_or_else(|| wrap(format!("{} failed after retries", path))))
    }

    async fn embed_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let response: EmbedResponse = self.post_json("api/embed", &request, RagsyncError::Embedding).await?;
        check_count(texts.len(), response.embeddings)
    }
}

fn backoff_delay(attempt: usize) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn check_count(expected: usize, embeddings: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
    if embeddings.len() != expected {
        return Err(RagsyncError::Embedding(format!(
            "expected {} embeddings, got {}",
            expected,
            embeddings.len()
        )));
    }
    Ok(embeddings)
}

#[async_trait]
impl Embedder for OllamaClient {
    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let start = std::time::Instant::now();
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            all.extend(self.embed_request(batch).await?);
        }

        log::debug!("Embedded {} texts with {} in {:?}", texts.len(), self.embedding_model, start.elapsed());
        Ok(all)
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages,
            stream: false,
        };
        let response: ChatResponse = self.post_json("api/chat", &request, RagsyncError::Generation).await?;
        Ok(response.message.content)
    }
}
