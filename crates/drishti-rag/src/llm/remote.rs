//! Remote inference over an OpenAI-compatible chat-completions endpoint.

use async_trait::async_trait;
use serde_json::json;

use crate::config::RemoteSettings;
use crate::error::{EngineError, Result};
use crate::llm::{GenerationConfig, LLMProvider, ProviderInfo};

pub struct RemoteProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    context_window: usize,
}

impl RemoteProvider {
    pub fn new(settings: &RemoteSettings, model: &str, context_window: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| {
                EngineError::InferenceUnavailable(format!("http client init failed: {}", e))
            })?;

        tracing::info!(
            base_url = %settings.base_url,
            model = %model,
            timeout_secs = settings.timeout_secs,
            "Creating remote inference provider"
        );

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            context_window,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LLMProvider for RemoteProvider {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let endpoint = self.endpoint();
        tracing::debug!(
            endpoint = %endpoint,
            model = %self.model,
            max_tokens = config.max_tokens,
            prompt_len = prompt.len(),
            "Sending remote inference request"
        );

        let request = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "top_p": config.top_p,
            "stop": config.stop_sequences,
            "stream": false
        });

        let response = self
            .client
            .post(&endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::InferenceUnavailable(format!(
                        "request to {} timed out",
                        endpoint
                    ))
                } else if e.is_connect() {
                    EngineError::InferenceUnavailable(format!(
                        "failed to connect to {}: {}",
                        endpoint, e
                    ))
                } else {
                    EngineError::InferenceUnavailable(format!(
                        "request to {} failed: {}",
                        endpoint, e
                    ))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            EngineError::InferenceUnavailable(format!("failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            let preview: String = body.chars().take(300).collect();
            return Err(EngineError::InferenceUnavailable(format!(
                "inference server error (HTTP {}): {}",
                status, preview
            )));
        }

        // Gateways sometimes return HTML error pages with a 200 status.
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(EngineError::InferenceUnavailable(format!(
                "{} returned HTML instead of JSON: {}",
                endpoint, preview
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            EngineError::InferenceUnavailable(format!(
                "unparseable response from {}: {} — body: {}",
                endpoint, e, preview
            ))
        })?;

        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                EngineError::InferenceUnavailable(format!(
                    "response from {} is missing choices[0].message.content",
                    endpoint
                ))
            })
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: format!("remote ({})", self.base_url),
            model: self.model.clone(),
            context_window: self.context_window,
            is_local: false,
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
    fn endpoint_strips_trailing_slash() {
        let settings = RemoteSettings {
            base_url: "http://localhost:11434/".to_string(),
            timeout_secs: 30,
        };
        let provider = RemoteProvider::new(&settings, "qwen", 2048).unwrap();
        assert_eq!(provider.endpoint(), "http://localhost:11434/v1/chat/completions");
    }
}
