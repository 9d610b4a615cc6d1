//! drishti-rag: grounded question answering over local documents and live
//! screen text, with at most one generation model resident at a time.
//!
//! The entry point is [`Orchestrator::ask`]. Components are explicitly
//! constructed and injected — build an [`EngineConfig`], an embedding
//! backend, a [`DocumentStore`], a [`ModelManager`], and a screen reader,
//! then wire them into an [`Orchestrator`] once at startup.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod screen;
pub mod storage;
pub mod templates;
pub mod types;

#[cfg(test)]
pub(crate) mod test_util;

// Re-export primary types for convenience
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use llm::{
    BackendLoader, ComputeBackend, GenerationConfig, LLMProvider, ModelManager, ModelProfile,
    ProfileLoader, ProfileSpec, ProfileStatus,
};
pub use orchestrator::{EngineStatus, Orchestrator};
pub use storage::DocumentStore;
pub use types::{MetadataFilter, QueryMode, RagResponse, RetrievedContextItem, SCREEN_CITATION};
