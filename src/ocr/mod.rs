//! Text recognition engine abstraction.
//!
//! The extraction pipeline talks to recognition through the [`OcrEngine`]
//! trait so the engine can be swapped or mocked. Tesseract via command-line
//! is the production implementation.

mod tesseract;

use async_trait::async_trait;
use thiserror::Error;

use crate::raster::PageImage;

pub use tesseract::TesseractEngine;

/// Errors from a recognition engine call.
#[derive(Debug, Error)]
pub enum RecognitionEngineError {
    #[error("Recognition engine not available: {0}")]
    EngineNotAvailable(String),

    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),

    #[error("Recognition timed out after {0}s")]
    Timeout(u64),

    #[error("Image encoding failed: {0}")]
    ImageEncoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw output of one recognition call.
#[derive(Debug, Clone)]
pub struct Recognition {
    /// Recognized text, unfiltered.
    pub text: String,
    /// Engine-reported confidence in [0, 1], advisory only. Selection is
    /// driven by the quality score, never by this value.
    pub confidence: Option<f32>,
}

/// A text-recognition engine.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine name for diagnostics.
    fn name(&self) -> &'static str;

    /// Whether the engine can run at all (binaries installed, etc).
    fn is_available(&self) -> bool;

    /// What is needed to make this engine available.
    fn availability_hint(&self) -> String;

    /// Recognize text on one page image. Bounded by the engine's timeout;
    /// a timeout surfaces as an error identical to any other engine failure.
    async fn recognize(&self, page: &PageImage) -> Result<Recognition, RecognitionEngineError>;
}
