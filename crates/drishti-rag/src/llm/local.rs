//! In-process GGUF inference via llama-cpp-2 bindings.
//!
//! Inference is synchronous and CPU/GPU-bound, so generation runs under
//! `spawn_blocking`.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::LlamaModel;
use llama_cpp_2::sampling::LlamaSampler;

use crate::error::{EngineError, Result};
use crate::llm::{ComputeBackend, GenerationConfig, LLMProvider, ProfileSpec, ProviderInfo};

pub struct LlamaCppProvider {
    model: Arc<LlamaModel>,
    backend: Arc<LlamaBackend>,
    model_name: String,
    context_window: usize,
}

// SAFETY: LlamaModel and LlamaBackend are thread-safe for read-only
// operations. Mutable state (LlamaContext) is created per-inference call and
// not shared.
unsafe impl Send for LlamaCppProvider {}
unsafe impl Sync for LlamaCppProvider {}

impl LlamaCppProvider {
    pub fn new(spec: &ProfileSpec, gguf_path: &Path) -> Result<Self> {
        let backend = LlamaBackend::init()
            .map_err(|e| EngineError::ModelLoad(format!("llama.cpp backend init failed: {:?}", e)))?;

        // Full-layer GPU offload when the profile asks for it; detection
        // problems degrade to CPU inside llama.cpp rather than failing here.
        let model_params = match spec.backend {
            ComputeBackend::Gpu => LlamaModelParams::default().with_n_gpu_layers(1_000_000),
            _ => LlamaModelParams::default(),
        };

        tracing::info!(
            model = %spec.model_name,
            path = %gguf_path.display(),
            backend = %spec.backend,
            "Loading GGUF model via llama.cpp"
        );

        let model = LlamaModel::load_from_file(&backend, gguf_path, &model_params).map_err(|e| {
            EngineError::ModelLoad(format!(
                "failed to load GGUF model from {}: {:?}",
                gguf_path.display(),
                e
            ))
        })?;

        tracing::info!(
            model = %spec.model_name,
            context_window = spec.context_window,
            "llama.cpp model loaded"
        );

        Ok(Self {
            model: Arc::new(model),
            backend: Arc::new(backend),
            model_name: spec.model_name.clone(),
            context_window: spec.context_window,
        })
    }

    /// Run synchronous inference on the calling thread.
    fn run_inference(
        model: &LlamaModel,
        backend: &LlamaBackend,
        n_ctx: usize,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String> {
        let n_ctx = n_ctx.clamp(512, 8192) as u32;

        let ctx_params =
            LlamaContextParams::default().with_n_ctx(std::num::NonZeroU32::new(n_ctx));
        let mut ctx = model
            .new_context(backend, ctx_params)
            .map_err(|e| EngineError::Generation(format!("context creation failed: {:?}", e)))?;

        let tokens = model
            .str_to_token(prompt, llama_cpp_2::model::AddBos::Always)
            .map_err(|e| EngineError::Generation(format!("tokenization failed: {:?}", e)))?;

        let n_prompt = tokens.len();
        if n_prompt == 0 {
            return Ok(String::new());
        }

        // Truncate prompt tokens so the generation budget still fits.
        let max_prompt_tokens = (n_ctx as usize).saturating_sub(config.max_tokens.min(2048));
        let tokens = if n_prompt > max_prompt_tokens {
            tracing::warn!(
                n_prompt = n_prompt,
                max = max_prompt_tokens,
                "Prompt truncated to fit context window"
            );
            tokens[n_prompt - max_prompt_tokens..].to_vec()
        } else {
            tokens
        };
        let n_prompt = tokens.len();

        // Feed prompt tokens in chunks of n_batch to stay under llama.cpp's
        // per-decode token limit.
        let n_batch = 2048usize;
        let mut batch = LlamaBatch::new(n_batch, 1);

        let mut processed = 0usize;
        while processed < n_prompt {
            batch.clear();
            let chunk_end = (processed + n_batch).min(n_prompt);

            for i in processed..chunk_end {
                let is_last = i == n_prompt - 1;
                batch
                    .add(tokens[i], i as i32, &[0], is_last)
                    .map_err(|_| EngineError::Generation("batch add failed".to_string()))?;
            }

            ctx.decode(&mut batch).map_err(|e| {
                EngineError::Generation(format!(
                    "prompt decode chunk {}-{} failed: {:?}",
                    processed, chunk_end, e
                ))
            })?;

            processed = chunk_end;
        }

        // Sampler chain with repetition penalty to prevent loops.
        let mut sampler = LlamaSampler::chain_simple([
            LlamaSampler::penalties(256, config.repetition_penalty, 0.0, 0.0),
            LlamaSampler::temp(config.temperature),
            LlamaSampler::top_p(config.top_p, 1),
            LlamaSampler::top_k(config.top_k as i32),
            LlamaSampler::dist(config.seed.unwrap_or(0) as u32),
        ]);

        let max_tokens = config.max_tokens.min(2048);
        let mut output = String::new();
        let mut n_decoded = 0usize;
        let mut cur_pos = n_prompt as i32;

        let eos_token = model.token_eos();

        loop {
            if n_decoded >= max_tokens {
                break;
            }

            let new_token = sampler.sample(&ctx, -1);
            if new_token == eos_token {
                break;
            }

            #[allow(deprecated)]
            let token_str = model
                .token_to_str(new_token, llama_cpp_2::model::Special::Tokenize)
                .unwrap_or_default();

            if !token_str.is_empty() {
                output.push_str(&token_str);
            }

            // Stop-sequence termination; the marker itself is removed.
            let hit_stop = config.stop_sequences.iter().any(|seq| output.ends_with(seq));
            if hit_stop {
                for seq in &config.stop_sequences {
                    if output.ends_with(seq) {
                        output.truncate(output.len() - seq.len());
                        break;
                    }
                }
                break;
            }

            // Small quantized models can loop; cut generation when the tail
            // starts repeating.
            if n_decoded > 100 && n_decoded % 50 == 0 {
                let tail = if output.len() > 300 {
                    &output[output.len() - 300..]
                } else {
                    &output
                };
                if has_repetition(tail) {
                    tracing::warn!(tokens = n_decoded, "Repetition detected, stopping generation");
                    break;
                }
            }

            n_decoded += 1;

            batch.clear();
            batch
                .add(new_token, cur_pos, &[0], true)
                .map_err(|_| EngineError::Generation("batch add failed".to_string()))?;
            cur_pos += 1;

            ctx.decode(&mut batch).map_err(|e| {
                EngineError::Generation(format!("decode step {} failed: {:?}", n_decoded, e))
            })?;
        }

        tracing::debug!(
            prompt_tokens = n_prompt,
            generated_tokens = n_decoded,
            "llama.cpp inference complete"
        );

        Ok(output)
    }
}

/// Detect whether the text ends in a repeating block (the same 30-80 char
/// block appearing 3+ times).
fn has_repetition(text: &str) -> bool {
    let len = text.len();
    if len < 100 {
        return false;
    }

    for block_size in [30, 50, 80] {
        if len < block_size * 3 {
            continue;
        }
        let last_block = &text[len - block_size..];
        let search_area = &text[..len - block_size];
        let count = search_area
            .as_bytes()
            .windows(block_size)
            .filter(|w| *w == last_block.as_bytes())
            .count();
        if count >= 2 {
            return true;
        }
    }

    false
}

#[async_trait]
impl LLMProvider for LlamaCppProvider {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let model = Arc::clone(&self.model);
        let backend = Arc::clone(&self.backend);
        let n_ctx = self.context_window;
        let prompt = prompt.to_string();
        let config = config.clone();

        tokio::task::spawn_blocking(move || {
            Self::run_inference(&model, &backend, n_ctx, &prompt, &config)
        })
        .await
        .map_err(|e| EngineError::Generation(format!("inference task panicked: {}", e)))?
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: format!("llama.cpp ({})", self.model_name),
            model: self.model_name.clone(),
            context_window: self.context_window,
            is_local: true,
        }
    }

    async fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repetition_detector_flags_looping_tail() {
        let block = "the answer is the answer is the ";
        let text = block.repeat(6);
        assert!(has_repetition(&text));
    }

    #[test]
    fn repetition_detector_passes_normal_prose() {
        let text = "Paris is the capital of France. It sits on the Seine and has \
                    been a major European city for centuries, known for art and food.";
        assert!(!has_repetition(text));
    }
}
