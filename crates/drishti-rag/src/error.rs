use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("model weights unavailable: {0}")]
    ModelLoad(String),

    #[error("inference backend unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("embedding backend unreachable: {0}")]
    Embedding(String),

    #[error("vector store failure: {0}")]
    Store(String),

    #[error("screen capture failed: {0}")]
    Screen(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
