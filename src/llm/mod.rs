//! Text-correction service client.
//!
//! The correction pass sends recovered page text through an external
//! text-completion service (Ollama API) and receives a cleaned-up version.
//! The service is strictly best-effort: every failure mode here is
//! absorbed by the pipeline, which keeps the uncorrected text.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::CorrectionConfig;

/// Prompt for the correction model. The placeholder is replaced with the
/// page text.
const CORRECTION_PROMPT: &str = r#"The following text was recovered from a scanned academic document by OCR and may contain recognition errors: misread characters, broken words, stray symbols.

Correct obvious OCR errors only. Do NOT paraphrase, summarize, reorder, or add content. Preserve line breaks, headings, list markers, equations, and numbering exactly as they appear.

Text:
{content}

Respond with ONLY the corrected text. No preamble, no commentary."#;

/// Errors from the correction service. Never fatal for the pipeline.
#[derive(Debug, Error)]
pub enum CorrectionServiceError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Correction service returned empty output")]
    EmptyResponse,
}

/// An opaque text-to-text correction service.
#[async_trait]
pub trait CorrectionService: Send + Sync {
    /// Return a corrected version of the text. The caller re-scores the
    /// output and decides whether to keep it.
    async fn correct(&self, text: &str) -> Result<String, CorrectionServiceError>;

    /// Whether the service currently responds at all.
    async fn is_available(&self) -> bool;
}

/// Ollama-backed corrector.
pub struct OllamaCorrector {
    config: CorrectionConfig,
    client: Client,
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: i32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaCorrector {
    /// Create a corrector with the given service configuration.
    pub fn new(config: CorrectionConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }
}

#[async_trait]
impl CorrectionService for OllamaCorrector {
    async fn correct(&self, text: &str) -> Result<String, CorrectionServiceError> {
        if text.chars().count() > self.config.max_chars {
            debug!(
                chars = text.chars().count(),
                limit = self.config.max_chars,
                "page too long for correction, skipping"
            );
            return Err(CorrectionServiceError::Api(
                "input exceeds correction size limit".to_string(),
            ));
        }

        let url = format!("{}/api/generate", self.config.endpoint);
        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: CORRECTION_PROMPT.replace("{content}", text),
            stream: false,
            options: OllamaOptions {
                // Deterministic output so repeated runs correct identically.
                temperature: 0.0,
                num_predict: -1,
            },
        };

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CorrectionServiceError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CorrectionServiceError::Api(format!(
                "HTTP {}",
                resp.status()
            )));
        }

        let body: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| CorrectionServiceError::Parse(e.to_string()))?;

        let corrected = body.response.trim().to_string();
        if corrected.is_empty() {
            return Err(CorrectionServiceError::EmptyResponse);
        }

        Ok(corrected)
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
