use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;

use crate::types::ChunkRecord;

pub struct LanceStore {
    db: lancedb::Connection,
    dimension: usize,
    table_name: String,
}

impl LanceStore {
    pub async fn new(path: &str, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(path).ok();
        let db = lancedb::connect(path)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let store = Self {
            db,
            dimension,
            table_name: "chunks".to_string(),
        };

        store.ensure_table().await?;
        Ok(store)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("doc_id", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("source_filename", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                true,
            ),
            Field::new("metadata_json", DataType::Utf8, false),
            Field::new("created_at", DataType::Int64, false),
        ]))
    }

    async fn ensure_table(&self) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if !names.contains(&self.table_name) {
            // Create with a single seed record, then delete it
            let schema = self.schema();
            let seed_vec = vec![0.0f32; self.dimension];
            let values = Float32Array::from(seed_vec);
            let vector_field = Field::new("item", DataType::Float32, true);
            let vector_array = FixedSizeListArray::new(
                Arc::new(vector_field),
                self.dimension as i32,
                Arc::new(values) as Arc<dyn Array>,
                None,
            );

            let batch = RecordBatch::try_new(
                schema.clone(),
                vec![
                    Arc::new(StringArray::from(vec!["__seed__"])) as Arc<dyn Array>,
                    Arc::new(StringArray::from(vec!["__seed__"])),
                    Arc::new(UInt32Array::from(vec![0u32])),
                    Arc::new(StringArray::from(vec![""])),
                    Arc::new(StringArray::from(vec![""])),
                    Arc::new(vector_array) as Arc<dyn Array>,
                    Arc::new(StringArray::from(vec!["{}"])),
                    Arc::new(Int64Array::from(vec![0i64])),
                ],
            )
            .context("Failed to create seed RecordBatch")?;

            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            self.db
                .create_table(&self.table_name, Box::new(batches))
                .execute()
                .await
                .context("Failed to create chunks table")?;

            // Remove seed record
            let table = self.db.open_table(&self.table_name).execute().await?;
            table.delete("id = '__seed__'").await.ok();
        }
        Ok(())
    }

    pub async fn upsert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let table = self
            .db
            .open_table(&self.table_name)
            .execute()
            .await
            .context("Failed to open chunks table")?;

        let len = chunks.len();
        let schema = self.schema();

        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let doc_ids: Vec<&str> = chunks.iter().map(|c| c.doc_id.as_str()).collect();
        let chunk_indices: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let sources: Vec<&str> = chunks.iter().map(|c| c.source_filename.as_str()).collect();
        let metadata_jsons: Vec<&str> = chunks.iter().map(|c| c.metadata_json.as_str()).collect();
        let created_ats: Vec<i64> = chunks.iter().map(|c| c.created_at).collect();

        // Build FixedSizeListArray for vectors
        let flat_vectors: Vec<f32> = chunks.iter().flat_map(|c| c.vector.iter().copied()).collect();
        let values = Float32Array::from(flat_vectors);
        let vector_field = Field::new("item", DataType::Float32, true);
        let vector_array = FixedSizeListArray::new(
            Arc::new(vector_field),
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        );

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(doc_ids)),
                Arc::new(UInt32Array::from(chunk_indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(sources)),
                Arc::new(vector_array) as Arc<dyn Array>,
                Arc::new(StringArray::from(metadata_jsons)),
                Arc::new(Int64Array::from(created_ats)),
            ],
        )
        .context("Failed to create RecordBatch")?;

        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(reader))
            .execute()
            .await
            .context("Failed to insert chunks")?;

        tracing::debug!("Inserted {} chunks into LanceDB", len);
        Ok(())
    }

    pub async fn vector_search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<StoredHit>> {
        let table = self.db.open_table(&self.table_name).execute().await?;

        let mut query_builder = table.query().nearest_to(query)?;
        query_builder = query_builder
            .distance_type(lancedb::DistanceType::L2)
            .limit(k);

        if let Some(predicate) = filter {
            query_builder = query_builder.only_if(predicate);
        }

        let results = query_builder
            .execute()
            .await
            .context("LanceDB vector search failed")?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract_hits_from_batches(&batches))
    }

    pub async fn delete_by_doc_id(&self, doc_id: &str) -> Result<usize> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let count_before = table.count_rows(None).await.unwrap_or(0);
        let predicate = format!("doc_id = '{}'", doc_id.replace('\'', "''"));
        table.delete(&predicate).await?;
        let count_after = table.count_rows(None).await.unwrap_or(0);
        Ok(count_before - count_after)
    }

    pub async fn count(&self) -> Result<usize> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let count = table.count_rows(None).await?;
        Ok(count)
    }

    /// Distinct source filenames across all stored chunks.
    pub async fn distinct_sources(&self) -> Result<Vec<String>> {
        let table = self.db.open_table(&self.table_name).execute().await?;
        let results = table
            .query()
            .select(lancedb::query::Select::columns(&["source_filename"]))
            .execute()
            .await
            .context("Failed to query source filenames")?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        let mut seen = std::collections::HashSet::new();
        let mut sources = Vec::new();

        for batch in &batches {
            if let Some(col) = batch
                .column_by_name("source_filename")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            {
                for i in 0..col.len() {
                    let val = col.value(i);
                    if !val.is_empty() && seen.insert(val.to_string()) {
                        sources.push(val.to_string());
                    }
                }
            }
        }

        Ok(sources)
    }
}

#[derive(Debug, Clone)]
pub struct StoredHit {
    pub id: String,
    pub doc_id: String,
    pub chunk_index: u32,
    pub text: String,
    pub source_filename: String,
    pub metadata_json: String,
    pub distance: f32,
}

/// Extract StoredHit records from Arrow RecordBatches.
fn extract_hits_from_batches(batches: &[RecordBatch]) -> Vec<StoredHit> {
    let mut hits = Vec::new();
    for batch in batches {
        let ids = batch
            .column_by_name("id")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let doc_ids = batch
            .column_by_name("doc_id")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let chunk_indices = batch
            .column_by_name("chunk_index")
            .and_then(|c| c.as_any().downcast_ref::<UInt32Array>());
        let texts = batch
            .column_by_name("text")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let sources = batch
            .column_by_name("source_filename")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let metadata_jsons = batch
            .column_by_name("metadata_json")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let (Some(ids), Some(texts)) = (ids, texts) else {
            continue;
        };

        for i in 0..batch.num_rows() {
            hits.push(StoredHit {
                id: ids.value(i).to_string(),
                doc_id: doc_ids.map(|d| d.value(i).to_string()).unwrap_or_default(),
                chunk_index: chunk_indices.map(|c| c.value(i)).unwrap_or(0),
                text: texts.value(i).to_string(),
                source_filename: sources.map(|s| s.value(i).to_string()).unwrap_or_default(),
                metadata_json: metadata_jsons
                    .map(|m| m.value(i).to_string())
                    .unwrap_or_else(|| "{}".to_string()),
                distance: distances.map(|d| d.value(i)).unwrap_or(0.0),
            });
        }
    }
    hits
}
