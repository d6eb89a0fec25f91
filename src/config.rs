//! Configuration for the extraction pipeline.
//!
//! Loaded from a TOML file and overridable from CLI flags. Every field has
//! a default, so an empty file (or none at all) yields a working setup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for the whole extraction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Rasterization resolution in dots per inch.
    pub dpi: u32,
    /// Maximum pages processed concurrently. Also bounds simultaneous
    /// recognition-engine calls, which are the scarce resource.
    pub parallel_workers: usize,
    /// Run the full preprocessing catalog. When false only the raw
    /// passthrough strategy is evaluated.
    pub enable_preprocessing: bool,
    /// Send winning page text through the correction service.
    pub enable_correction: bool,
    /// Quality score below which a page is flagged unsuccessful. The best
    /// available text is still returned.
    pub min_usable_score: f64,
    /// Recognition language (tesseract language code).
    pub language: String,
    /// Hard timeout for a single recognition call, in seconds.
    pub recognition_timeout_secs: u64,
    /// Correction service settings.
    pub correction: CorrectionConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            parallel_workers: 4,
            enable_preprocessing: true,
            enable_correction: false,
            min_usable_score: 0.3,
            language: "eng".to_string(),
            recognition_timeout_secs: 120,
            correction: CorrectionConfig::default(),
        }
    }
}

/// Settings for the external text-correction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Ollama-compatible API endpoint.
    pub endpoint: String,
    /// Model name to request.
    pub model: String,
    /// Hard timeout for one correction call, in seconds.
    pub timeout_secs: u64,
    /// Pages longer than this many characters skip correction instead of
    /// truncating mid-thought.
    pub max_chars: usize,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            timeout_secs: 120,
            max_chars: 12_000,
        }
    }
}

impl ExtractionConfig {
    /// Load from a TOML file and validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges. Called after any mutation from CLI overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(72..=1200).contains(&self.dpi) {
            return Err(ConfigError::Invalid(format!(
                "dpi must be between 72 and 1200, got {}",
                self.dpi
            )));
        }
        if !(1..=64).contains(&self.parallel_workers) {
            return Err(ConfigError::Invalid(format!(
                "parallel_workers must be between 1 and 64, got {}",
                self.parallel_workers
            )));
        }
        if !(0.0..=1.0).contains(&self.min_usable_score) {
            return Err(ConfigError::Invalid(format!(
                "min_usable_score must be within [0, 1], got {}",
                self.min_usable_score
            )));
        }
        if self.recognition_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "recognition_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ExtractionConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_score() {
        let config = ExtractionConfig {
            min_usable_score: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_workers() {
        let config = ExtractionConfig {
            parallel_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_absurd_dpi() {
        let config = ExtractionConfig {
            dpi: 10_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let config: ExtractionConfig =
            toml::from_str("dpi = 150\n[correction]\nmodel = \"mistral\"\n").unwrap();
        assert_eq!(config.dpi, 150);
        assert_eq!(config.correction.model, "mistral");
        // Untouched fields keep their defaults.
        assert_eq!(config.parallel_workers, 4);
        assert!(config.enable_preprocessing);
    }
}
