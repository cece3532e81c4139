use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::classification::ArbiterConfig;
use crate::pipeline::extraction::{EnhancerConfig, ExtractionConfig};

/// Application-level constants
pub const APP_NAME: &str = "doctriage";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Model artifact path override.
pub const ENV_MODEL_PATH: &str = "DOCTRIAGE_MODEL_PATH";
/// Tesseract language data directory.
pub const ENV_TESSDATA: &str = "DOCTRIAGE_TESSDATA";
/// `+`-joined recognition languages, e.g. `fra+eng`.
pub const ENV_OCR_LANGS: &str = "DOCTRIAGE_OCR_LANGS";

/// Results below this confidence are flagged for human review.
pub const DEFAULT_REVIEW_THRESHOLD: f64 = 0.5;

/// Get the application data directory: `~/.doctriage/`.
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".doctriage")
}

/// Get the models directory
pub fn models_dir() -> PathBuf {
    app_data_dir().join("models")
}

/// Where the training job drops the classifier artifact.
pub fn default_model_path() -> PathBuf {
    models_dir().join("classifier.json")
}

pub fn default_config_path() -> PathBuf {
    app_data_dir().join("config.json")
}

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "warn,doctriage_lib=info,doctriage=info"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Runtime configuration. Every field has a default, so a config file only
/// needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoctriageConfig {
    pub extraction: ExtractionConfig,
    pub enhancer: EnhancerConfig,
    pub arbiter: ArbiterConfig,
    /// Custom keyword table (JSON). Built-in table when unset.
    pub keywords_path: Option<PathBuf>,
    /// Classifier artifact. `~/.doctriage/models/classifier.json` when unset.
    pub model_path: Option<PathBuf>,
    /// Tesseract language data. System default when unset.
    pub tessdata_dir: Option<PathBuf>,
    pub review_threshold: f64,
}

impl Default for DoctriageConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig::default(),
            enhancer: EnhancerConfig::default(),
            arbiter: ArbiterConfig::default(),
            keywords_path: None,
            model_path: None,
            tessdata_dir: None,
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
        }
    }
}

impl DoctriageConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit file if given, else `~/.doctriage/config.json` when present,
    /// else defaults. Environment overrides are applied last.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    Self::load(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `DOCTRIAGE_*` overrides from `lookup` (the process environment
    /// in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = non_empty(ENV_MODEL_PATH) {
            self.model_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = non_empty(ENV_TESSDATA) {
            self.tessdata_dir = Some(PathBuf::from(dir));
        }
        if let Some(langs) = non_empty(ENV_OCR_LANGS) {
            self.extraction.ocr_languages = langs.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.review_threshold) {
            return Err(ConfigError::Invalid(format!(
                "review_threshold must be within [0, 1], got {}",
                self.review_threshold
            )));
        }
        if self.extraction.render_dpi == 0 {
            return Err(ConfigError::Invalid("render_dpi must be positive".into()));
        }
        if self.extraction.ocr_languages.trim().is_empty() {
            return Err(ConfigError::Invalid("ocr_languages must not be empty".into()));
        }
        Ok(())
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_path.clone().unwrap_or_else(default_model_path)
    }
}
