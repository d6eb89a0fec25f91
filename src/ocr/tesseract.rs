//! Tesseract OCR engine adapter.
//!
//! Runs the tesseract binary on an encoded page image with a hard timeout.
//! Uses `--oem 3 --psm 6`, the configuration that behaves best on dense
//! lecture-note scans.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use tempfile::TempDir;
use tokio::process::Command;

use super::{OcrEngine, Recognition, RecognitionEngineError};
use crate::config::ExtractionConfig;
use crate::raster::PageImage;

/// Tesseract OCR via command-line.
pub struct TesseractEngine {
    language: String,
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(language: &str, timeout: Duration) -> Self {
        Self {
            language: language.to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(
            &config.language,
            Duration::from_secs(config.recognition_timeout_secs),
        )
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        which::which("tesseract").is_ok()
    }

    fn availability_hint(&self) -> String {
        if self.is_available() {
            "Tesseract is available".to_string()
        } else {
            "Tesseract not installed. Install with: apt install tesseract-ocr".to_string()
        }
    }

    async fn recognize(&self, page: &PageImage) -> Result<Recognition, RecognitionEngineError> {
        let scratch = TempDir::new()?;
        let image_path = scratch.path().join("page.png");

        // PNG encoding of a full page is CPU-bound; keep it off the runtime threads.
        let image = page.image().clone();
        let png = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, RecognitionEngineError> {
            let mut buf = Cursor::new(Vec::new());
            DynamicImage::ImageLuma8(image)
                .write_to(&mut buf, ImageFormat::Png)
                .map_err(|e| RecognitionEngineError::ImageEncoding(e.to_string()))?;
            Ok(buf.into_inner())
        })
        .await
        .map_err(|e| RecognitionEngineError::RecognitionFailed(e.to_string()))??;
        tokio::fs::write(&image_path, png).await?;

        let output = tokio::time::timeout(
            self.timeout,
            Command::new("tesseract")
                .arg(&image_path)
                .arg("stdout")
                .args(["-l", &self.language])
                .args(["--oem", "3", "--psm", "6"])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| RecognitionEngineError::Timeout(self.timeout.as_secs()))?;

        match output {
            Ok(output) => {
                if output.status.success() {
                    Ok(Recognition {
                        text: String::from_utf8_lossy(&output.stdout).to_string(),
                        // Tesseract can report word confidences but we are not parsing them yet.
                        confidence: None,
                    })
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(RecognitionEngineError::RecognitionFailed(format!(
                        "tesseract failed on page {}: {}",
                        page.page_index(),
                        stderr.trim()
                    )))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RecognitionEngineError::EngineNotAvailable(
                    "tesseract not found (install tesseract-ocr)".to_string(),
                ))
            }
            Err(e) => Err(RecognitionEngineError::Io(e)),
        }
    }
}
