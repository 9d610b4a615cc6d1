use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Citation sentinel for answers grounded in on-screen text rather than a
/// stored document.
pub const SCREEN_CITATION: &str = "SCREEN_OCR";

/// Query mode, chosen explicitly by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Open-ended dialogue; retrieved context is supplementary.
    Chat,
    /// Strict grounding; the model may only answer from supplied context.
    Rag,
}

/// A chunk retrieved for a query. Ephemeral — built per query, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedContextItem {
    pub text: String,
    pub metadata: HashMap<String, String>,
    pub distance: f32,
}

impl RetrievedContextItem {
    /// Source filename for citation purposes, checking the primary metadata
    /// key first and the legacy `filename` key as a fallback.
    pub fn source_filename(&self) -> Option<&str> {
        self.metadata
            .get("source_filename")
            .or_else(|| self.metadata.get("filename"))
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// Final answer for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
    pub answer: String,
    /// Unique source filenames in first-seen order, plus [`SCREEN_CITATION`]
    /// when screen context contributed.
    pub citations: Vec<String>,
    pub model_name: String,
}

/// Internal chunk record for storage operations.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub doc_id: String,
    pub chunk_index: u32,
    pub text: String,
    pub source_filename: String,
    pub vector: Vec<f32>,
    pub metadata_json: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetadataFilter {
    pub doc_id: Option<String>,
    pub source_filename: Option<String>,
    /// Match a key/value pair inside the serialized chunk metadata. Used as
    /// the alternate-key retry when a column filter finds nothing.
    pub metadata_contains: Option<(String, String)>,
}

impl MetadataFilter {
    pub fn for_source(filename: &str) -> Self {
        Self {
            source_filename: Some(filename.to_string()),
            ..Self::default()
        }
    }

    pub fn for_metadata_key(key: &str, value: &str) -> Self {
        Self {
            metadata_contains: Some((key.to_string(), value.to_string())),
            ..Self::default()
        }
    }

    pub fn to_predicate(&self) -> Option<String> {
        let mut predicates = Vec::new();

        if let Some(ref doc_id) = self.doc_id {
            predicates.push(format!("doc_id = '{}'", doc_id.replace('\'', "''")));
        }
        if let Some(ref source) = self.source_filename {
            predicates.push(format!(
                "source_filename = '{}'",
                source.replace('\'', "''")
            ));
        }
        if let Some((ref key, ref value)) = self.metadata_contains {
            // Chunk metadata is stored as a flat JSON object of strings, so a
            // substring match on the serialized pair is exact enough here.
            predicates.push(format!(
                "metadata_json LIKE '%\"{}\":\"{}\"%'",
                key.replace('\'', "''"),
                value.replace('\'', "''")
            ));
        }

        if predicates.is_empty() {
            None
        } else {
            Some(predicates.join(" AND "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_escapes_quotes() {
        let filter = MetadataFilter::for_source("o'brien.txt");
        assert_eq!(
            filter.to_predicate().unwrap(),
            "source_filename = 'o''brien.txt'"
        );
    }

    #[test]
    fn empty_filter_has_no_predicate() {
        assert!(MetadataFilter::default().to_predicate().is_none());
    }

    #[test]
    fn metadata_contains_renders_like_clause() {
        let filter = MetadataFilter::for_metadata_key("filename", "geo.txt");
        let predicate = filter.to_predicate().unwrap();
        assert!(predicate.contains("metadata_json LIKE"));
        assert!(predicate.contains("\"filename\":\"geo.txt\""));
    }

    #[test]
    fn source_filename_falls_back_to_legacy_key() {
        let mut metadata = HashMap::new();
        metadata.insert("filename".to_string(), "notes.pdf".to_string());
        let item = RetrievedContextItem {
            text: String::new(),
            metadata,
            distance: 0.0,
        };
        assert_eq!(item.source_filename(), Some("notes.pdf"));
    }
}
