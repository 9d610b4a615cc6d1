//! Shared test doubles.

use async_trait::async_trait;

use crate::embeddings::EmbeddingModel;
use crate::error::Result;

/// Deterministic bag-of-words embedder. Token overlap maps to small L2
/// distances, which is all the retrieval tests need.
pub(crate) struct MockEmbedder {
    dim: usize,
}

impl MockEmbedder {
    pub(crate) fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let slot = token
                .bytes()
                .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % self.dim;
            vector[slot] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
