//! Document processing entry point.
//!
//! Drives one upload through text recovery and classification:
//! raw bytes → extraction cascade → arbiter → review flag.
//!
//! Engines are injected as trait objects so the processor stays testable
//! with the mock OCR, PDF and renderer implementations.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ConfigError, DoctriageConfig};
use crate::models::{CategoryLabel, DecisionSource, ExtractionMethod, ExtractionOutcome};
use crate::pipeline::classification::{
    load_classifier, ClassificationArbiter, ClassificationResult, KeywordTable, KeywordTableError,
};
use crate::pipeline::extraction::pdfium::PdfiumRenderer;
use crate::pipeline::extraction::{
    default_ocr_engine, ExtractionPipeline, ImageEnhancer, PdfPageRenderer, PdfTextExtractor,
};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during document processing.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// Every extraction strategy failed; `message` is the pipeline's
    /// user-facing explanation.
    #[error("{message}")]
    Extraction {
        outcome: ExtractionOutcome,
        message: String,
    },

    #[error("Keyword table error: {0}")]
    Keywords(#[from] KeywordTableError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Summary returned to the caller after processing a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedDocument {
    pub filename: Option<String>,
    pub text: String,
    pub method: ExtractionMethod,
    pub category: CategoryLabel,
    pub confidence: f64,
    pub source: DecisionSource,
    /// Confidence fell below the review threshold.
    pub needs_review: bool,
}

impl ProcessedDocument {
    pub fn classification(&self) -> ClassificationResult {
        ClassificationResult {
            category: self.category,
            confidence: self.confidence,
            source: self.source,
        }
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

pub struct DocumentProcessor {
    pipeline: ExtractionPipeline,
    arbiter: ClassificationArbiter,
    review_threshold: f64,
}

impl DocumentProcessor {
    pub fn new(
        pipeline: ExtractionPipeline,
        arbiter: ClassificationArbiter,
        review_threshold: f64,
    ) -> Self {
        Self {
            pipeline,
            arbiter,
            review_threshold,
        }
    }

    /// Wire the production engines from configuration.
    ///
    /// Missing optional backends degrade the cascade instead of failing:
    /// no PDFium means no rasterized PDF pass, no model artifact means
    /// rule-only classification. A configured keyword table that cannot be
    /// loaded is an error.
    pub fn from_config(config: &DoctriageConfig) -> Result<Self, ProcessingError> {
        config.validate()?;

        let ocr = default_ocr_engine(
            config.tessdata_dir.as_deref(),
            &config.extraction.ocr_languages,
        );

        let renderer: Option<Box<dyn PdfPageRenderer + Send + Sync>> =
            match PdfiumRenderer::new() {
                Ok(renderer) => Some(Box::new(renderer)),
                Err(e) => {
                    warn!(error = %e, "PDFium unavailable, scanned PDFs will not be rasterized");
                    None
                }
            };

        let pipeline = ExtractionPipeline::standard(
            ocr,
            Box::new(PdfTextExtractor),
            renderer,
            &config.extraction,
            ImageEnhancer::new(config.enhancer.clone()),
        );

        let keywords = match &config.keywords_path {
            Some(path) => KeywordTable::load(path)?,
            None => KeywordTable::default(),
        };
        let model = load_classifier(&config.model_path());
        let arbiter = ClassificationArbiter::new(keywords, model, config.arbiter.clone());

        info!(
            strategies = ?pipeline.strategy_names(),
            model = arbiter.has_model(),
            review_threshold = config.review_threshold,
            "Document processor ready"
        );

        Ok(Self::new(pipeline, arbiter, config.review_threshold))
    }

    pub fn pipeline(&self) -> &ExtractionPipeline {
        &self.pipeline
    }

    pub fn arbiter(&self) -> &ClassificationArbiter {
        &self.arbiter
    }

    pub fn review_threshold(&self) -> f64 {
        self.review_threshold
    }

    /// Extract then classify one upload.
    pub fn process(
        &self,
        bytes: &[u8],
        filename: Option<&str>,
    ) -> Result<ProcessedDocument, ProcessingError> {
        let extracted = self.pipeline.extract(bytes, filename);

        let method = match (extracted.outcome, extracted.method) {
            (ExtractionOutcome::Success, Some(method)) => method,
            (outcome, _) => {
                let message = extracted
                    .error
                    .unwrap_or_else(|| format!("Extraction ended with outcome {outcome}"));
                warn!(
                    filename = filename.unwrap_or("<unnamed>"),
                    outcome = outcome.as_str(),
                    "Document could not be read"
                );
                return Err(ProcessingError::Extraction { outcome, message });
            }
        };

        let result = self.arbiter.classify(&extracted.text);
        let needs_review = result.confidence < self.review_threshold;

        info!(
            filename = filename.unwrap_or("<unnamed>"),
            method = method.as_str(),
            category = result.category.as_str(),
            confidence = result.confidence,
            source = result.source.as_str(),
            needs_review,
            "Document classified"
        );

        Ok(ProcessedDocument {
            filename: filename.map(str::to_string),
            text: extracted.text,
            method,
            category: result.category,
            confidence: result.confidence,
            source: result.source,
            needs_review,
        })
    }
}
