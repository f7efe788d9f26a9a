//! Text → vector providers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::RagError;
use crate::core::config::{EmbeddingProviderKind, EmbeddingSettings};

pub const STUB_MODEL_VERSION: &str = "mock-v1";

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// One vector per input, in input order. Any failing input fails the batch.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let vector = self.embed(text).await?;
            if vector.is_empty() {
                return Err(RagError::Embedding("provider returned an empty vector".to_string()));
            }
            vectors.push(vector);
        }
        Ok(vectors)
    }

    /// Tag stored alongside every vector this embedder produces.
    fn model_version(&self) -> String;
}

/// Placeholder embedder returning the same small vector for every input.
#[derive(Debug, Clone, Default)]
pub struct StubEmbedder;

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
        Ok(vec![0.1, 0.2, 0.3])
    }

    fn model_version(&self) -> String {
        STUB_MODEL_VERSION.to_string()
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Embedder backed by an OpenAI-compatible `/v1/embeddings` endpoint.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| RagError::Config(format!("embedding client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("provider returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let mut request = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await.map_err(RagError::embedding)?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!("{}: {}", status, text)));
        }

        let mut payload: EmbeddingResponse = res.json().await.map_err(RagError::embedding)?;
        if payload.data.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                payload.data.len()
            )));
        }

        payload.data.sort_by_key(|item| item.index.unwrap_or(usize::MAX));
        let vectors: Vec<Vec<f32>> = payload.data.into_iter().map(|d| d.embedding).collect();
        if vectors.iter().any(|v| v.is_empty()) {
            return Err(RagError::Embedding("provider returned an empty vector".to_string()));
        }
        Ok(vectors)
    }

    fn model_version(&self) -> String {
        format!("openai:{}", self.model)
    }
}

/// Builds the embedder selected by `embedding.provider`.
pub fn embedder_from_settings(
    settings: &EmbeddingSettings,
) -> Result<std::sync::Arc<dyn Embedder>, RagError> {
    Ok(match settings.provider {
        EmbeddingProviderKind::Stub => std::sync::Arc::new(StubEmbedder),
        EmbeddingProviderKind::OpenAi => std::sync::Arc::new(OpenAiEmbedder::new(settings)?),
    })
}
