//! Resident-model state machine.
//!
//! At most one profile's weights are in memory at any time. A profile swap
//! releases the resident model before the next one is loaded, and runs
//! exclusively: calls for a different profile queue behind the swap, while
//! calls for the already-resident profile generate concurrently under a
//! shared lock.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::GenerationSettings;
use crate::error::Result;
use crate::llm::{
    local::LlamaCppProvider, remote::RemoteProvider, weights, ComputeBackend, GenerationConfig,
    LLMProvider, ModelProfile, ProfileSpec,
};

/// Builds a provider for a profile. Injected so embedders and tests can
/// substitute their own backends.
#[async_trait]
pub trait ProfileLoader: Send + Sync {
    async fn load(&self, profile: ModelProfile, spec: &ProfileSpec) -> Result<Box<dyn LLMProvider>>;
}

/// Default loader: local llama.cpp for `cpu`/`gpu` backends, the remote
/// inference server for `remote`.
pub struct BackendLoader {
    settings: GenerationSettings,
}

impl BackendLoader {
    pub fn new(settings: GenerationSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ProfileLoader for BackendLoader {
    async fn load(&self, profile: ModelProfile, spec: &ProfileSpec) -> Result<Box<dyn LLMProvider>> {
        tracing::info!(profile = %profile, backend = %spec.backend, "Loading generation backend");
        match spec.backend {
            ComputeBackend::Remote => {
                let provider =
                    RemoteProvider::new(&self.settings.remote, &spec.model_name, spec.context_window)?;
                Ok(Box::new(provider))
            }
            ComputeBackend::Cpu | ComputeBackend::Gpu => {
                let gguf_path = weights::ensure_weights(&self.settings.model_dir, spec).await?;
                let provider = LlamaCppProvider::new(spec, &gguf_path)?;
                Ok(Box::new(provider))
            }
        }
    }
}

/// Observability snapshot of the manager's state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProfileStatus {
    pub name: String,
    pub backend: String,
    pub resident: bool,
}

struct ResidentModel {
    profile: ModelProfile,
    provider: Box<dyn LLMProvider>,
}

pub struct ModelManager {
    settings: GenerationSettings,
    loader: Box<dyn ProfileLoader>,
    resident: RwLock<Option<ResidentModel>>,
}

impl ModelManager {
    pub fn new(settings: GenerationSettings) -> Self {
        let loader = Box::new(BackendLoader::new(settings.clone()));
        Self::with_loader(settings, loader)
    }

    pub fn with_loader(settings: GenerationSettings, loader: Box<dyn ProfileLoader>) -> Self {
        Self {
            settings,
            loader,
            resident: RwLock::new(None),
        }
    }

    fn spec(&self, profile: ModelProfile) -> &ProfileSpec {
        match profile {
            ModelProfile::Grounded => &self.settings.grounded,
            ModelProfile::Conversational => &self.settings.conversational,
        }
    }

    /// Generate with the given profile, swapping it in first if some other
    /// profile is resident.
    pub async fn generate(
        &self,
        prompt: &str,
        profile: ModelProfile,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String> {
        let config = GenerationConfig {
            max_tokens,
            temperature,
            ..GenerationConfig::default()
        };

        loop {
            {
                let guard = self.resident.read().await;
                if let Some(resident) = guard.as_ref() {
                    if resident.profile == profile {
                        return resident.provider.generate(prompt, &config).await;
                    }
                }
            }

            let mut guard = self.resident.write().await;
            if guard.as_ref().map(|r| r.profile) != Some(profile) {
                // Release the old weights fully before loading the new ones,
                // so two models never coexist in memory.
                if let Some(old) = guard.take() {
                    tracing::info!(released = %old.profile, loading = %profile, "Swapping resident model");
                    drop(old);
                }
                let provider = self.loader.load(profile, self.spec(profile)).await?;
                *guard = Some(ResidentModel { profile, provider });
            }
            // Re-enter under a shared lock; another swap may have raced in,
            // in which case the loop swaps again.
        }
    }

    pub async fn current_profile_info(&self) -> ProfileStatus {
        let guard = self.resident.read().await;
        match guard.as_ref() {
            Some(resident) => {
                let spec = self.spec(resident.profile);
                ProfileStatus {
                    name: spec.model_name.clone(),
                    backend: spec.backend.to_string(),
                    resident: true,
                }
            }
            None => ProfileStatus {
                name: "none".to_string(),
                backend: "none".to_string(),
                resident: false,
            },
        }
    }

    /// True once any profile's model is resident.
    pub async fn is_resident(&self) -> bool {
        self.resident.read().await.is_some()
    }
}
