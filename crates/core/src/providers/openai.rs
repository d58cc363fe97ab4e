//! Embeddings and chat completions against an OpenAI-compatible HTTP API.

use crate::traits::{ChatModel, Embedder};
use crate::ModelError;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
const BACKEND: &str = "openai";
const EMBEDDING_BATCH: usize = 64;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ModelError::InvalidConfig(
                "API key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, ModelError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        Ok(response)
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Turns a non-success response into a [`ModelError`], flagging missing models
/// as [`ModelError::Unavailable`].
async fn classify_failure(model: &str, response: Response) -> ModelError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let (message, code) = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) => (parsed.error.message, parsed.error.code),
        Err(_) => (body, None),
    };

    let missing_model = status == StatusCode::NOT_FOUND
        || code.as_deref() == Some("model_not_found")
        || message.contains("does not exist");

    if missing_model {
        return ModelError::Unavailable {
            model: model.to_string(),
            details: message,
        };
    }

    ModelError::BackendResponse {
        backend: BACKEND.to_string(),
        status: status.as_u16(),
        details: message,
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    async fn embed_chunk(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self.client.post("embeddings", &request).await?;
        if !response.status().is_success() {
            let failure = classify_failure(&self.model, response).await;
            error!(model = %self.model, error = %failure, "embedding request failed");
            return Err(failure);
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(ModelError::EmbeddingCount {
                backend: BACKEND.to_string(),
                expected: texts.len(),
                found: parsed.data.len(),
            });
        }

        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_BATCH) {
            debug!(model = %self.model, batch_size = batch.len(), "embedding batch");
            vectors.extend(self.embed_chunk(batch).await?);
        }
        Ok(vectors)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiChatModel {
    client: OpenAiClient,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiChatModel {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens: 300,
            temperature: 0.2,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self.client.post("chat/completions", &request).await?;
        if !response.status().is_success() {
            return Err(classify_failure(&self.model, response).await);
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ModelError::EmptyResponse(self.model.clone()))
    }
}
