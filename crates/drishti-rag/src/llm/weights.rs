//! Weights cache resolution and download.

use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::llm::ProfileSpec;

/// Downloaded GGUF files smaller than this are treated as corrupt.
const MIN_GGUF_BYTES: u64 = 10_000_000;

/// Resolve the weights file for a profile, downloading it when a source URL
/// is configured and the file is not cached.
pub async fn ensure_weights(model_dir: &Path, spec: &ProfileSpec) -> Result<PathBuf> {
    let path = model_dir.join(&spec.model_file);

    if path.is_file() {
        tracing::debug!(path = %path.display(), "Using cached weights");
        return Ok(path);
    }

    // Fall back to any GGUF file in the directory before attempting a
    // download, so a renamed local file still loads.
    if let Some(found) = scan_for_gguf(model_dir) {
        tracing::warn!(
            expected = %spec.model_file,
            found = %found.display(),
            "Expected weights not found, using first GGUF file in directory"
        );
        return Ok(found);
    }

    let url = spec.download_url.as_deref().ok_or_else(|| {
        EngineError::ModelLoad(format!(
            "weights file '{}' not found in {} and no download source configured",
            spec.model_file,
            model_dir.display()
        ))
    })?;

    download(url, &path).await
}

fn scan_for_gguf(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let p = entry.path();
        if p.extension().map(|e| e == "gguf").unwrap_or(false) {
            return Some(p);
        }
    }
    None
}

/// Removes a partial download on every exit path unless disarmed after a
/// successful rename.
struct PartialFileGuard {
    path: PathBuf,
    armed: bool,
}

impl PartialFileGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn download(url: &str, dest: &Path) -> Result<PathBuf> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| EngineError::ModelLoad(format!("cannot create model dir: {}", e)))?;
    }

    let partial = PathBuf::from(format!("{}.partial", dest.display()));
    let mut guard = PartialFileGuard {
        path: partial.clone(),
        armed: true,
    };

    tracing::info!(url = %url, dest = %dest.display(), "Downloading model weights");

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(3600))
        .connect_timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| EngineError::ModelLoad(format!("http client init failed: {}", e)))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| EngineError::ModelLoad(format!("weights download failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(EngineError::ModelLoad(format!(
            "weights download failed: HTTP {} from {}",
            response.status(),
            url
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| EngineError::ModelLoad(format!("weights download interrupted: {}", e)))?;

    tokio::fs::write(&partial, &bytes)
        .await
        .map_err(|e| EngineError::ModelLoad(format!("cannot write weights file: {}", e)))?;

    if (bytes.len() as u64) < MIN_GGUF_BYTES {
        return Err(EngineError::ModelLoad(format!(
            "downloaded weights are too small ({} bytes) — corrupt or truncated",
            bytes.len()
        )));
    }

    tokio::fs::rename(&partial, dest)
        .await
        .map_err(|e| EngineError::ModelLoad(format!("cannot move weights into place: {}", e)))?;
    guard.disarm();

    tracing::info!(path = %dest.display(), bytes = bytes.len(), "Model weights downloaded");
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ComputeBackend;

    fn spec(file: &str) -> ProfileSpec {
        ProfileSpec {
            model_name: "test".to_string(),
            model_file: file.to_string(),
            context_window: 2048,
            backend: ComputeBackend::Cpu,
            download_url: None,
        }
    }

    #[tokio::test]
    async fn cached_weights_resolve_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gguf");
        std::fs::write(&path, b"gguf").unwrap();

        let resolved = ensure_weights(dir.path(), &spec("model.gguf")).await.unwrap();
        assert_eq!(resolved, path);
    }

    #[tokio::test]
    async fn any_gguf_in_dir_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("other-model.gguf"), b"gguf").unwrap();

        let resolved = ensure_weights(dir.path(), &spec("missing.gguf")).await.unwrap();
        assert!(resolved.ends_with("other-model.gguf"));
    }

    #[tokio::test]
    async fn missing_weights_without_source_is_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_weights(dir.path(), &spec("missing.gguf"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ModelLoad(_)));
    }

    #[test]
    fn partial_guard_removes_file_when_armed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.partial");
        std::fs::write(&path, b"partial").unwrap();
        {
            let _guard = PartialFileGuard {
                path: path.clone(),
                armed: true,
            };
        }
        assert!(!path.exists());
    }

    #[test]
    fn disarmed_guard_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.partial");
        std::fs::write(&path, b"partial").unwrap();
        {
            let mut guard = PartialFileGuard {
                path: path.clone(),
                armed: true,
            };
            guard.disarm();
        }
        assert!(path.exists());
    }
}
