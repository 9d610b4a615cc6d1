//! Screen reading capability.
//!
//! The capture/recognize pair is a platform capability: one implementation
//! per platform, selected once at startup. Capture failure is never fatal —
//! a query simply proceeds without screen context.

use std::sync::Arc;

use crate::error::{EngineError, Result};

pub mod ranker;
#[cfg(windows)]
pub mod windows_ocr;

pub use ranker::rank_screen_text;

/// A captured screen frame in BGRA8 layout.
#[derive(Debug, Clone)]
pub struct ScreenFrame {
    pub bgra: Vec<u8>,
    pub width: i32,
    pub height: i32,
}

pub trait ScreenOcr: Send + Sync {
    /// Grab the current screen contents.
    fn capture(&self) -> Result<ScreenFrame>;

    /// Run OCR over a captured frame.
    fn recognize(&self, frame: &ScreenFrame) -> Result<String>;

    fn engine_name(&self) -> &str;

    /// Capture and recognize in one step. Failures are tolerated: the
    /// result is an empty string, never an error.
    fn read_screen(&self) -> String {
        match self.capture().and_then(|frame| self.recognize(&frame)) {
            Ok(text) => {
                tracing::debug!(chars = text.len(), engine = self.engine_name(), "Screen OCR complete");
                text.trim().to_string()
            }
            Err(e) => {
                tracing::warn!(error = %e, engine = self.engine_name(), "Screen OCR failed, continuing without screen context");
                String::new()
            }
        }
    }
}

/// Fallback used when no platform OCR backend is available.
pub struct DisabledScreenOcr;

impl ScreenOcr for DisabledScreenOcr {
    fn capture(&self) -> Result<ScreenFrame> {
        Err(EngineError::Screen(
            "no screen OCR backend available on this platform".to_string(),
        ))
    }

    fn recognize(&self, _frame: &ScreenFrame) -> Result<String> {
        Err(EngineError::Screen(
            "no screen OCR backend available on this platform".to_string(),
        ))
    }

    fn engine_name(&self) -> &str {
        "disabled"
    }
}

/// Pick the platform's OCR backend at startup.
pub fn detect_screen_ocr() -> Arc<dyn ScreenOcr> {
    #[cfg(windows)]
    {
        if windows_ocr::is_ocr_available() {
            tracing::info!("Using Windows native OCR for screen reading");
            return Arc::new(windows_ocr::NativeScreenOcr::new());
        }
        tracing::warn!("Windows OCR engine unavailable — install a language pack");
    }

    tracing::info!("Screen reading disabled (no OCR backend)");
    Arc::new(DisabledScreenOcr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_backend_reads_empty_not_error() {
        let reader = DisabledScreenOcr;
        assert_eq!(reader.read_screen(), "");
        assert_eq!(reader.engine_name(), "disabled");
    }
}
