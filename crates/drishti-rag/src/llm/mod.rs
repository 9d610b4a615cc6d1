//! LLM module - profile definitions and the provider abstraction shared by
//! the in-process and remote inference backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod local;
pub mod manager;
pub mod remote;
pub mod weights;

pub use local::LlamaCppProvider;
pub use manager::{BackendLoader, ModelManager, ProfileLoader, ProfileStatus};
pub use remote::RemoteProvider;

/// End-of-turn markers the generation backends stop on. Truncation beyond
/// these markers is the orchestrator's concern, not the backends'.
pub const END_OF_TURN_MARKERS: &[&str] = &["<|im_end|>", "<|endoftext|>", "<|end|>"];

/// Generation profile. A closed set: illegal profile values cannot be
/// constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProfile {
    /// Strict grounding — answers only from supplied context.
    Grounded,
    /// Open-ended dialogue — context optional.
    Conversational,
}

impl std::fmt::Display for ModelProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grounded => write!(f, "grounded"),
            Self::Conversational => write!(f, "conversational"),
        }
    }
}

/// Compute backend a profile runs on. Selected by configuration, never by
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeBackend {
    Cpu,
    Gpu,
    Remote,
}

impl std::fmt::Display for ComputeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Gpu => write!(f, "gpu"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Everything needed to materialize one profile's model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSpec {
    /// Human-readable model identifier, reported through `ProfileStatus`.
    pub model_name: String,
    /// GGUF filename inside the model directory (local backends).
    pub model_file: String,
    pub context_window: usize,
    pub backend: ComputeBackend,
    /// Optional URL to fetch the weights from when missing locally.
    pub download_url: Option<String>,
}

/// Per-call generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: usize,
    pub repetition_penalty: f32,
    pub stop_sequences: Vec<String>,
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            repetition_penalty: 1.1,
            stop_sequences: END_OF_TURN_MARKERS.iter().map(|s| s.to_string()).collect(),
            seed: None,
        }
    }
}

/// Provider information for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
    pub context_window: usize,
    pub is_local: bool,
}

/// Core trait implemented by every generation backend.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion.
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;

    /// Get provider info.
    fn info(&self) -> ProviderInfo;

    /// Check if provider is ready.
    async fn is_ready(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_config_carries_end_of_turn_markers() {
        let config = GenerationConfig::default();
        assert!(config.stop_sequences.iter().any(|s| s == "<|im_end|>"));
        assert!(config.stop_sequences.iter().any(|s| s == "<|endoftext|>"));
    }

    #[test]
    fn profile_display_matches_wire_names() {
        assert_eq!(ModelProfile::Grounded.to_string(), "grounded");
        assert_eq!(ModelProfile::Conversational.to_string(), "conversational");
    }
}
