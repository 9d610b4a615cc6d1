//! Top-level answer orchestration.
//!
//! One `ask` call resolves screen context, retrieves document chunks
//! (filename-pinned when the query names a stored file), assembles a prompt
//! for the requested mode, generates through the model manager, and cleans
//! and cites the result. Each call is stateless.

use std::sync::Arc;

use crate::config::{EngineConfig, ScreenRankerSettings};
use crate::error::Result;
use crate::llm::{ModelManager, ModelProfile, ProfileStatus};
use crate::screen::{rank_screen_text, ScreenOcr};
use crate::storage::DocumentStore;
use crate::templates::{self, CONTEXT_CHUNK_MARKER, NO_CONTEXT_ANSWER};
use crate::types::{MetadataFilter, QueryMode, RagResponse, RetrievedContextItem, SCREEN_CITATION};

/// Sampling temperature for answers. Low for determinism in both modes.
const ANSWER_TEMPERATURE: f32 = 0.2;

/// Chat answers get a smaller token budget than grounded answers.
const CHAT_TOKEN_BUDGET: usize = 256;

/// Queries containing any of these are about the visible screen, not the
/// stored corpus. Fixed list; "what's in this document on my screen" counts
/// as screen-focused by decision.
const SCREEN_FOCUS_KEYWORDS: &[&str] = &[
    "screen",
    "visible",
    "display",
    "window",
    "monitor",
    "current page",
    "this page",
    "currently open",
    "looking at",
];

#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStatus {
    pub model: ProfileStatus,
    pub screen_engine: String,
    pub indexed_chunks: usize,
}

pub struct Orchestrator {
    store: Arc<DocumentStore>,
    models: Arc<ModelManager>,
    screen: Arc<dyn ScreenOcr>,
    screen_settings: ScreenRankerSettings,
    rag_max_tokens: usize,
    chat_max_tokens: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<DocumentStore>,
        models: Arc<ModelManager>,
        screen: Arc<dyn ScreenOcr>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            models,
            screen,
            screen_settings: config.screen.clone(),
            rag_max_tokens: config.generation.max_tokens,
            chat_max_tokens: config.generation.max_tokens.min(CHAT_TOKEN_BUDGET),
        }
    }

    /// Answer a query, grounded in stored documents and optional screen text.
    pub async fn ask(
        &self,
        query: &str,
        mode: QueryMode,
        read_screen: bool,
        screen_text_override: Option<&str>,
    ) -> Result<RagResponse> {
        tracing::info!(mode = ?mode, read_screen = read_screen, "Processing query");

        // Screen context: explicit override wins, otherwise capture on
        // request. Either way the raw text goes through the ranker.
        let raw_screen = if let Some(text) = screen_text_override {
            text.to_string()
        } else if read_screen {
            self.screen.read_screen()
        } else {
            String::new()
        };
        let screen_context = if raw_screen.trim().is_empty() {
            String::new()
        } else {
            rank_screen_text(&raw_screen, query, &self.screen_settings)
        };

        // Documents are retrieved in both modes; chat answers still cite.
        let mut documents = self.retrieve_documents(query).await?;

        // Screen-centric questions answer from the screen: stale document
        // chunks are the worse failure mode there.
        if is_screen_focused(query) && !screen_context.is_empty() && !documents.is_empty() {
            tracing::debug!(
                dropped = documents.len(),
                "Screen-focused query, discarding document context"
            );
            documents.clear();
        }

        let mut citations = collect_citations(&documents);
        if !screen_context.is_empty() {
            citations.push(SCREEN_CITATION.to_string());
        }

        if documents.is_empty() && screen_context.is_empty() {
            tracing::info!("No grounding context available, skipping generation");
            let status = self.models.current_profile_info().await;
            return Ok(RagResponse {
                answer: NO_CONTEXT_ANSWER.to_string(),
                citations: Vec::new(),
                model_name: status.name,
            });
        }

        let doc_block =
            (!documents.is_empty()).then(|| templates::document_context_block(&documents));
        let screen_block = (!screen_context.is_empty()).then_some(screen_context.as_str());

        let (prompt, profile, max_tokens) = match mode {
            QueryMode::Rag => (
                templates::grounded_prompt(query, doc_block.as_deref(), screen_block),
                ModelProfile::Grounded,
                self.rag_max_tokens,
            ),
            QueryMode::Chat => (
                templates::chat_prompt(query, doc_block.as_deref(), screen_block),
                ModelProfile::Conversational,
                self.chat_max_tokens,
            ),
        };

        let raw_answer = self
            .models
            .generate(&prompt, profile, max_tokens, ANSWER_TEMPERATURE)
            .await?;
        let answer = clean_answer(&raw_answer);

        let status = self.models.current_profile_info().await;
        tracing::info!(
            citations = citations.len(),
            model = %status.name,
            "Query answered"
        );

        Ok(RagResponse {
            answer,
            citations,
            model_name: status.name,
        })
    }

    /// Observability snapshot: resident model, screen engine, corpus size.
    pub async fn status(&self) -> Result<EngineStatus> {
        Ok(EngineStatus {
            model: self.models.current_profile_info().await,
            screen_engine: self.screen.engine_name().to_string(),
            indexed_chunks: self.store.chunk_count().await?,
        })
    }

    async fn retrieve_documents(&self, query: &str) -> Result<Vec<RetrievedContextItem>> {
        match self.filename_pinned_query(query).await {
            Ok(Some(items)) => return Ok(items),
            Ok(None) => {}
            Err(e) => {
                // The filename pin is a precision heuristic, not a
                // correctness requirement; degrade to unfiltered retrieval.
                tracing::warn!(error = %e, "Filename-pinned retrieval degraded, querying unfiltered");
            }
        }
        self.store.query(query, None).await
    }

    /// When the query names a stored file verbatim, retrieval is pinned to
    /// that file even if chunks elsewhere are semantically closer.
    async fn filename_pinned_query(
        &self,
        query: &str,
    ) -> Result<Option<Vec<RetrievedContextItem>>> {
        let sources = self.store.distinct_sources().await?;
        let query_lower = query.to_lowercase();
        let Some(named) = sources
            .iter()
            .find(|s| !s.is_empty() && query_lower.contains(&s.to_lowercase()))
        else {
            return Ok(None);
        };

        tracing::debug!(source = %named, "Query names a stored file, pinning retrieval");

        let filter = MetadataFilter::for_source(named);
        let items = self.store.query(query, Some(&filter)).await?;
        if !items.is_empty() {
            return Ok(Some(items));
        }

        // Alternate metadata key: some ingests record the name only under
        // the legacy `filename` key.
        let filter = MetadataFilter::for_metadata_key("filename", named);
        let items = self.store.query(query, Some(&filter)).await?;
        if !items.is_empty() {
            return Ok(Some(items));
        }

        Ok(None)
    }
}

/// Keyword heuristic: is the user asking about the visible screen?
pub fn is_screen_focused(query: &str) -> bool {
    let lower = query.to_lowercase();
    SCREEN_FOCUS_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn collect_citations(documents: &[RetrievedContextItem]) -> Vec<String> {
    let mut citations: Vec<String> = Vec::new();
    for item in documents {
        if let Some(source) = item.source_filename() {
            if !citations.iter().any(|c| c == source) {
                citations.push(source.to_string());
            }
        }
    }
    citations
}

/// Clean a raw generation: drop blank lines, cut at the first leaked
/// prompt-template artifact, collapse to one block, and bound verbosity to
/// three sentences. Idempotent.
pub fn clean_answer(raw: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lower = trimmed.to_lowercase();
        if lower.starts_with("context:")
            || lower.starts_with("question:")
            || trimmed.contains(CONTEXT_CHUNK_MARKER)
        {
            break;
        }
        kept.push(trimmed);
    }

    first_sentences(&kept.join(" "), 3)
}

/// Keep the first `limit` sentences, splitting on sentence-ending
/// punctuation followed by whitespace.
fn first_sentences(text: &str, limit: usize) -> String {
    let mut count = 0;
    let mut end = text.len();
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            let followed_by_space = iter
                .peek()
                .map(|&(_, next)| next.is_whitespace())
                .unwrap_or(false);
            if followed_by_space {
                count += 1;
                if count == limit {
                    end = i + c.len_utf8();
                    break;
                }
            }
        }
    }

    text[..end].trim().to_string()
}
