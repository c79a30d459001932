use crate::chat::{ChatMessage, ChatModel};
use crate::config::OpenAiConfig;
use crate::embeddings::{Embedder, Embedding};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

/// Maximum number of texts sent in one embeddings request
const EMBED_BATCH_SIZE: usize = 64;

/// Client for an OpenAI-compatible embeddings and chat completions API
#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(OpenAiClient { config, client })
    }

    /// Embed one batch of texts with a single request
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let request = EmbeddingRequest {
            model: &self.config.embed_model,
            input: texts,
            dimensions: Some(self.config.dimensions),
        };

        let url = format!("{}/embeddings", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("Embedding request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Embedding API request failed: {} {}",
                status,
                error_text
            ));
        }

        let response_data: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to decode embedding response")?;

        let embeddings = response_data.into_ordered();
        if embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Embedding API returned {} vectors for {} inputs",
                embeddings.len(),
                texts.len()
            ));
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for (batch_idx, batch) in texts.chunks(EMBED_BATCH_SIZE).enumerate() {
            debug!("Embedding batch {} ({} texts)", batch_idx + 1, batch.len());
            embeddings.extend(self.embed_batch(batch).await?);
        }

        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding generated"))
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages,
            temperature: self.config.temperature,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("Chat completion request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Chat API request failed: {} {}",
                status,
                error_text
            ));
        }

        let response_data: ChatResponse = response
            .json()
            .await
            .context("Failed to decode chat completion response")?;

        response_data.into_text()
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

impl EmbeddingResponse {
    /// The API may return items out of order; `index` is authoritative
    fn into_ordered(mut self) -> Vec<Embedding> {
        self.data.sort_by_key(|d| d.index);
        self.data
            .into_iter()
            .map(|d| Embedding::new(d.embedding))
            .collect()
    }
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<Choice>,
}

impl ChatResponse {
    fn into_text(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("No response generated"))
    }
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: Option<String>,
}
