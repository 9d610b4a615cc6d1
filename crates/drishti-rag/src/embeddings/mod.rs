//! Embedding backend abstraction.
//!
//! Embedding computation is delegated to an external serving endpoint; this
//! crate only defines the injection seam and an HTTP client for it.

use async_trait::async_trait;

use crate::error::Result;

pub mod remote;

pub use remote::RemoteEmbedder;

/// Trait implemented by embedding backends.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed document chunks for storage.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embedding dimensionality.
    fn dimension(&self) -> usize;
}
