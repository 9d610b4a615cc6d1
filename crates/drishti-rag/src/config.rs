use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::llm::{ComputeBackend, ProfileSpec};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub generation: GenerationSettings,
    pub screen: ScreenRankerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Base URL of the embedding server (OpenAI-compatible `/v1/embeddings`).
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    pub top_k: usize,
    /// Nearest-neighbor distance above which a candidate is discarded.
    pub distance_ceiling: f32,
    /// How many unfiltered candidates to hand back when the ceiling would
    /// otherwise empty the result set.
    pub fallback_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub model_dir: PathBuf,
    pub grounded: ProfileSpec,
    pub conversational: ProfileSpec,
    pub remote: RemoteSettings,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the remote inference server
    /// (OpenAI-compatible `/v1/chat/completions`).
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenRankerSettings {
    /// Upper bound on the ranked snippet, in characters.
    pub char_budget: usize,
    /// Window width used to re-segment run-on OCR output.
    pub window_width: usize,
    /// How many scored lines to keep at most.
    pub max_lines: usize,
}

impl EngineConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        if self.retrieval.top_k == 0 {
            return Err("retrieval.top_k must be > 0".into());
        }
        if self.retrieval.fallback_k == 0 {
            return Err("retrieval.fallback_k must be > 0".into());
        }
        if self.retrieval.distance_ceiling <= 0.0 {
            return Err("retrieval.distance_ceiling must be > 0".into());
        }
        if self.generation.max_tokens == 0 {
            return Err("generation.max_tokens must be > 0".into());
        }
        if self.screen.char_budget < self.screen.window_width {
            return Err("screen.char_budget must be >= screen.window_width".into());
        }
        if self.screen.max_lines == 0 {
            return Err("screen.max_lines must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("drishti-rag");

        let model_dir = if let Ok(env_path) = std::env::var("MODEL_PATH") {
            PathBuf::from(env_path)
        } else if Path::new("models").exists() {
            PathBuf::from("models")
        } else {
            data_dir.join("models")
        };

        let context_window = std::env::var("DRISHTI_CONTEXT_WINDOW")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2048);

        let backend = match std::env::var("DRISHTI_INFERENCE_BACKEND").as_deref() {
            Ok("remote") => ComputeBackend::Remote,
            Ok("gpu") => ComputeBackend::Gpu,
            _ => ComputeBackend::Cpu,
        };

        let grounded_file = std::env::var("DRISHTI_GROUNDED_MODEL")
            .unwrap_or_else(|_| "qwen2.5-1.5b-instruct-q4_k_m.gguf".to_string());
        let chat_file = std::env::var("DRISHTI_CHAT_MODEL")
            .unwrap_or_else(|_| "sarvam-1.Q5_K_M.gguf".to_string());

        let remote_url = std::env::var("DRISHTI_REMOTE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        let timeout_secs = std::env::var("DRISHTI_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        Self {
            data_dir,
            embedding: EmbeddingSettings {
                base_url: std::env::var("DRISHTI_EMBEDDING_URL")
                    .unwrap_or_else(|_| "http://localhost:8080".to_string()),
                model: "all-MiniLM-L6-v2".to_string(),
                dimension: 384,
                timeout_secs: 30,
            },
            retrieval: RetrievalSettings {
                top_k: 4,
                distance_ceiling: 2.2,
                fallback_k: 2,
            },
            generation: GenerationSettings {
                model_dir,
                grounded: ProfileSpec {
                    model_name: "Qwen 2.5 1.5B Instruct (Q4_K_M)".to_string(),
                    model_file: grounded_file,
                    context_window,
                    backend: backend.clone(),
                    download_url: None,
                },
                conversational: ProfileSpec {
                    model_name: "Sarvam-1 2B (Q5_K_M)".to_string(),
                    model_file: chat_file,
                    context_window,
                    backend,
                    download_url: None,
                },
                remote: RemoteSettings {
                    base_url: remote_url,
                    timeout_secs,
                },
                max_tokens: 512,
                temperature: 0.7,
            },
            screen: ScreenRankerSettings {
                char_budget: 1400,
                window_width: 220,
                max_lines: 18,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let mut config = EngineConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn budget_smaller_than_window_is_rejected() {
        let mut config = EngineConfig::default();
        config.screen.char_budget = 100;
        config.screen.window_width = 220;
        assert!(config.validate().is_err());
    }
}
