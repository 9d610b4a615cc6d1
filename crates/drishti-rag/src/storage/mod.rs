//! Vector store gateway.
//!
//! Owns chunk persistence and nearest-neighbor retrieval. Embeddings are
//! computed once at ingestion through the injected [`EmbeddingModel`] and
//! never mutated afterwards.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::RetrievalSettings;
use crate::embeddings::EmbeddingModel;
use crate::error::{EngineError, Result};
use crate::types::{ChunkRecord, MetadataFilter, RetrievedContextItem};

pub mod lance_store;

pub use lance_store::{LanceStore, StoredHit};

pub struct DocumentStore {
    store: LanceStore,
    embeddings: Arc<dyn EmbeddingModel>,
    settings: RetrievalSettings,
}

impl DocumentStore {
    pub async fn new(
        data_dir: &Path,
        embeddings: Arc<dyn EmbeddingModel>,
        settings: RetrievalSettings,
    ) -> Result<Self> {
        if embeddings.dimension() == 0 {
            return Err(EngineError::Config(
                "embedding dimension must be > 0".to_string(),
            ));
        }

        let lance_path = data_dir.join("lance_data");
        let store = LanceStore::new(
            lance_path.to_str().unwrap_or("./lance_data"),
            embeddings.dimension(),
        )
        .await
        .map_err(|e| EngineError::Store(format!("{:#}", e)))?;

        Ok(Self {
            store,
            embeddings,
            settings,
        })
    }

    /// Ingest a document's chunks. Returns the number of chunks stored.
    ///
    /// Empty input is a logged no-op. An unreachable embedding backend is
    /// fatal and propagates as an ingestion error.
    pub async fn upsert(
        &self,
        doc_id: &str,
        chunks: &[String],
        base_metadata: &HashMap<String, String>,
    ) -> Result<usize> {
        if chunks.is_empty() {
            tracing::warn!(doc_id = %doc_id, "No chunks to ingest, skipping");
            return Ok(0);
        }

        let embeddings = self
            .embeddings
            .embed_documents(chunks)
            .await
            .map_err(|e| EngineError::Ingestion(format!("embedding backend failed: {}", e)))?;

        if embeddings.len() != chunks.len() {
            return Err(EngineError::Ingestion(format!(
                "embedding backend returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let source_filename = base_metadata
            .get("source_filename")
            .or_else(|| base_metadata.get("filename"))
            .cloned()
            .unwrap_or_default();
        let now = chrono::Utc::now().timestamp();

        let mut records = Vec::with_capacity(chunks.len());
        for (i, (text, vector)) in chunks.iter().zip(embeddings.into_iter()).enumerate() {
            let mut metadata = base_metadata.clone();
            metadata.insert("doc_id".to_string(), doc_id.to_string());
            metadata.insert("chunk_index".to_string(), i.to_string());
            if !source_filename.is_empty() {
                metadata.insert("source_filename".to_string(), source_filename.clone());
            }
            let metadata_json =
                serde_json::to_string(&metadata).unwrap_or_else(|_| "{}".to_string());

            records.push(ChunkRecord {
                id: format!("{}_chunk_{}", doc_id, i),
                doc_id: doc_id.to_string(),
                chunk_index: i as u32,
                text: text.clone(),
                source_filename: source_filename.clone(),
                vector,
                metadata_json,
                created_at: now,
            });
        }

        let count = records.len();
        self.store
            .upsert_chunks(records)
            .await
            .map_err(|e| EngineError::Store(format!("{:#}", e)))?;

        tracing::info!(doc_id = %doc_id, chunks = count, source = %source_filename, "Ingested document chunks");
        Ok(count)
    }

    /// Nearest-neighbor retrieval with the configured defaults.
    pub async fn query(
        &self,
        text: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedContextItem>> {
        self.query_with(
            text,
            self.settings.top_k,
            self.settings.distance_ceiling,
            filter,
        )
        .await
    }

    /// Nearest-neighbor retrieval with explicit parameters.
    ///
    /// Candidates beyond `distance_ceiling` are dropped; if that would drop
    /// everything, the closest candidates are returned unfiltered instead, so
    /// a non-empty corpus never yields an empty result. An empty result is
    /// reserved for the genuinely-no-documents case, which callers branch on.
    pub async fn query_with(
        &self,
        text: &str,
        k: usize,
        distance_ceiling: f32,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedContextItem>> {
        let query_vector = self.embeddings.embed_query(text).await?;

        let predicate = filter.and_then(|f| f.to_predicate());
        let hits = self
            .store
            .vector_search(&query_vector, k, predicate.as_deref())
            .await
            .map_err(|e| EngineError::Store(format!("{:#}", e)))?;

        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let items: Vec<RetrievedContextItem> = hits.into_iter().map(to_context_item).collect();

        let kept: Vec<RetrievedContextItem> = items
            .iter()
            .filter(|item| item.distance <= distance_ceiling)
            .cloned()
            .collect();

        if kept.is_empty() {
            let fallback: Vec<RetrievedContextItem> = items
                .into_iter()
                .take(self.settings.fallback_k)
                .collect();
            tracing::warn!(
                ceiling = distance_ceiling,
                returned = fallback.len(),
                "Distance ceiling removed every candidate, returning closest matches unfiltered"
            );
            return Ok(fallback);
        }

        Ok(kept)
    }

    /// Delete all chunks belonging to a document.
    pub async fn delete(&self, doc_id: &str) -> Result<usize> {
        let removed = self
            .store
            .delete_by_doc_id(doc_id)
            .await
            .map_err(|e| EngineError::Store(format!("{:#}", e)))?;

        if removed == 0 {
            return Err(EngineError::NotFound(doc_id.to_string()));
        }

        tracing::info!(doc_id = %doc_id, removed = removed, "Deleted document chunks");
        Ok(removed)
    }

    /// Distinct source filenames across the corpus.
    pub async fn distinct_sources(&self) -> Result<Vec<String>> {
        self.store
            .distinct_sources()
            .await
            .map_err(|e| EngineError::Store(format!("{:#}", e)))
    }

    pub async fn chunk_count(&self) -> Result<usize> {
        self.store
            .count()
            .await
            .map_err(|e| EngineError::Store(format!("{:#}", e)))
    }
}

fn to_context_item(hit: StoredHit) -> RetrievedContextItem {
    let mut metadata: HashMap<String, String> =
        serde_json::from_str(&hit.metadata_json).unwrap_or_default();
    metadata.insert("doc_id".to_string(), hit.doc_id);
    metadata.insert("chunk_index".to_string(), hit.chunk_index.to_string());
    if !hit.source_filename.is_empty() {
        metadata.insert("source_filename".to_string(), hit.source_filename);
    }

    RetrievedContextItem {
        text: hit.text,
        metadata,
        distance: hit.distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::MockEmbedder;

    async fn store_in(dir: &Path) -> DocumentStore {
        DocumentStore::new(
            dir,
            Arc::new(MockEmbedder::new(64)),
            RetrievalSettings {
                top_k: 4,
                distance_ceiling: 2.2,
                fallback_k: 2,
            },
        )
        .await
        .unwrap()
    }

    fn metadata_for(filename: &str) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("source_filename".to_string(), filename.to_string());
        metadata
    }

    #[tokio::test]
    async fn upsert_then_delete_leaves_no_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;

        let chunks = vec![
            "Paris is the capital of France.".to_string(),
            "France is in western Europe.".to_string(),
        ];
        let stored = store
            .upsert("doc-1", &chunks, &metadata_for("geo.txt"))
            .await
            .unwrap();
        assert_eq!(stored, 2);
        assert_eq!(store.chunk_count().await.unwrap(), 2);

        let removed = store.delete("doc-1").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.chunk_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_unknown_doc_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;

        let err = store.delete("missing-doc").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_chunks_are_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;

        let stored = store
            .upsert("doc-1", &[], &metadata_for("empty.txt"))
            .await
            .unwrap();
        assert_eq!(stored, 0);
        assert_eq!(store.chunk_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn relevant_chunk_survives_the_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;

        store
            .upsert(
                "doc-1",
                &["Paris is the capital of France.".to_string()],
                &metadata_for("geo.txt"),
            )
            .await
            .unwrap();

        let items = store
            .query("What is the capital of France?", None)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].distance <= 2.2);
        assert_eq!(items[0].source_filename(), Some("geo.txt"));
    }

    #[tokio::test]
    async fn ceiling_fallback_returns_closest_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;

        let chunks = vec![
            "Rust ownership and borrowing rules.".to_string(),
            "Tokio runtime worker threads.".to_string(),
            "Arrow columnar memory layout.".to_string(),
        ];
        store
            .upsert("doc-1", &chunks, &metadata_for("notes.txt"))
            .await
            .unwrap();

        // Nothing shares tokens with the query, so every distance exceeds the
        // ceiling — the gateway must still hand back the closest two.
        let items = store
            .query("What is the capital of France?", None)
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.distance > 2.2));
    }

    #[tokio::test]
    async fn empty_corpus_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;

        let items = store.query("anything at all", None).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn source_filter_restricts_results() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;

        store
            .upsert(
                "doc-geo",
                &["Paris is the capital of France.".to_string()],
                &metadata_for("geo.txt"),
            )
            .await
            .unwrap();
        store
            .upsert(
                "doc-other",
                &["What is the capital of France?".to_string()],
                &metadata_for("other.txt"),
            )
            .await
            .unwrap();

        let filter = MetadataFilter::for_source("geo.txt");
        let items = store
            .query("What is the capital of France?", Some(&filter))
            .await
            .unwrap();
        assert!(!items.is_empty());
        assert!(items
            .iter()
            .all(|i| i.source_filename() == Some("geo.txt")));
    }

    #[tokio::test]
    async fn distinct_sources_lists_each_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path()).await;

        store
            .upsert(
                "doc-1",
                &["alpha".to_string(), "beta".to_string()],
                &metadata_for("a.txt"),
            )
            .await
            .unwrap();
        store
            .upsert("doc-2", &["gamma".to_string()], &metadata_for("b.txt"))
            .await
            .unwrap();

        let mut sources = store.distinct_sources().await.unwrap();
        sources.sort();
        assert_eq!(sources, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }
}
