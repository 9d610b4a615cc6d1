//! HTTP embedding client for an OpenAI-compatible `/v1/embeddings` endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::EmbeddingSettings;
use crate::embeddings::EmbeddingModel;
use crate::error::{EngineError, Result};

pub struct RemoteEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

impl RemoteEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| EngineError::Embedding(format!("http client init failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            dimension: settings.dimension,
        })
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/v1/embeddings", self.base_url);
        let request = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(&endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    EngineError::Embedding(format!("cannot reach {}: {}", endpoint, e))
                } else {
                    EngineError::Embedding(format!("request to {} failed: {}", endpoint, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(300).collect();
            return Err(EngineError::Embedding(format!(
                "embedding server error (HTTP {}): {}",
                status, preview
            )));
        }

        let parsed: EmbeddingsResponse = response.json().await.map_err(|e| {
            EngineError::Embedding(format!("unparseable embeddings response: {}", e))
        })?;

        if parsed.data.len() != texts.len() {
            return Err(EngineError::Embedding(format!(
                "embedding count mismatch: sent {} texts, got {} vectors",
                texts.len(),
                parsed.data.len()
            )));
        }

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(EngineError::Embedding(format!(
                    "unexpected embedding dimension {} (configured {})",
                    vector.len(),
                    self.dimension
                )));
            }
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingModel for RemoteEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_embeddings(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request_embeddings(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EngineError::Embedding("empty embedding response".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
