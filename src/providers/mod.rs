//! LLM Provider Abstraction
//!
//! Local-first:
//! 1. Ollama (generation + embeddings)
//! 2. OpenAI-compatible "expert" endpoint (generation only)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Could not decode {what} response: {reason}. Body: {body}")]
    Decode {
        what: &'static str,
        reason: String,
        body: String,
    },

    #[error("Empty response from {0}")]
    EmptyResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Text generation backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Single prompt in, raw completion text out
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Embedding backend used for lesson lookup
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

#[async_trait]
impl<T: LlmProvider + ?Sized> LlmProvider for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        (**self).generate(prompt).await
    }
}

fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Read the body and decode it, keeping the raw text for error messages
async fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
    what: &'static str,
) -> Result<T, ProviderError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
        what,
        reason: e.to_string(),
        body,
    })
}

/// Ollama provider
#[derive(Clone)]
pub struct Ollama {
    base_url: String,
    model: String,
    embedding_model: String,
    client: Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

impl Ollama {
    pub fn new(url: &str, model: &str, embedding_model: &str) -> Result<Self, ProviderError> {
        Self::with_timeout(url, model, embedding_model, Duration::from_secs(300))
    }

    pub fn with_timeout(
        url: &str,
        model: &str,
        embedding_model: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: url.trim_end_matches('/').into(),
            model: model.into(),
            embedding_model: embedding_model.into(),
            client: build_client(timeout)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmProvider for Ollama {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        tracing::debug!(model = %self.model, chars = prompt.len(), "ollama generate");
        let response = self.client.post(&url).json(&request).send().await?;
        let parsed: GenerateResponse = read_json(response, "generate").await?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl EmbeddingProvider for Ollama {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/api/embeddings", self.base_url);

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            prompt: text,
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let parsed: EmbeddingResponse = read_json(response, "embedding").await?;

        if parsed.embedding.is_empty() {
            return Err(ProviderError::EmptyResponse(format!(
                "embedding model {}",
                self.embedding_model
            )));
        }
        Ok(parsed.embedding)
    }
}

/// OpenAI-compatible provider (OpenAI, LM Studio, etc.)
pub struct OpenAiCompatible {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatible {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured(
                "expert_api.api_key is empty (set it in config or OPENAI_API_KEY)".into(),
            ));
        }

        Ok(Self {
            name: "openai".into(),
            base_url: base_url.trim_end_matches('/').into(),
            api_key: api_key.into(),
            model: model.into(),
            client: build_client(Duration::from_secs(120))?,
        })
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatible {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let chat_response: ChatResponse = read_json(response, "chat completion").await?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ProviderError::EmptyResponse(self.name.clone()))
    }
}
