use serde::{Deserialize, Serialize};

use super::format::is_pdf_container;
use super::ExtractionError;
use crate::models::{ExtractionMethod, ExtractionOutcome};

/// Uploaded bytes plus the optional filename the client sent.
/// The filename is only a hint for format dispatch and diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct RawInput<'a> {
    bytes: &'a [u8],
    filename: Option<&'a str>,
}

impl<'a> RawInput<'a> {
    pub fn new(bytes: &'a [u8], filename: Option<&'a str>) -> Self {
        Self { bytes, filename }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn filename(&self) -> Option<&'a str> {
        self.filename
    }

    /// Filename for log lines and error messages.
    pub fn display_name(&self) -> &'a str {
        self.filename.unwrap_or("<unnamed>")
    }

    /// PDF signature or `.pdf` filename.
    pub fn is_pdf_container(&self) -> bool {
        is_pdf_container(self.bytes, self.filename)
    }
}

/// Final result of the extraction pipeline for one input.
///
/// Either `text` is non-empty and `outcome` is `Success`, or `text` is empty
/// and `error` explains why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    pub outcome: ExtractionOutcome,
    pub method: Option<ExtractionMethod>,
    pub error: Option<String>,
}

impl ExtractedText {
    pub fn success(text: String, method: ExtractionMethod) -> Self {
        Self {
            text,
            outcome: ExtractionOutcome::Success,
            method: Some(method),
            error: None,
        }
    }

    pub fn failure(outcome: ExtractionOutcome, error: String) -> Self {
        Self {
            text: String::new(),
            outcome,
            method: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ExtractionOutcome::Success
    }

    /// `(text, error)` pair for callers that only want the plain contract.
    pub fn into_parts(self) -> (String, Option<String>) {
        (self.text, self.error)
    }
}

/// Text accepted by one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutput {
    pub text: String,
    pub method: ExtractionMethod,
    pub pages: usize,
}

/// Per-page text from a PDF's embedded text layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page_number: usize,
    pub text: String,
}

/// Raw OCR result from the engine
#[derive(Debug, Clone)]
pub struct OcrPageResult {
    pub text: String,
    /// Engine mean confidence, 0.0-1.0.
    pub confidence: f32,
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine {
    /// Recognize an encoded image (PNG) with the engine's default languages.
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError>;

    fn ocr_image_with_lang(
        &self,
        image_bytes: &[u8],
        lang: &str,
    ) -> Result<OcrPageResult, ExtractionError>;
}

/// PDF text-layer extraction abstraction
pub trait PdfExtractor {
    fn extract_text(&self, pdf_bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError>;
}

/// Renders individual PDF pages to PNG bytes.
pub trait PdfPageRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;

    /// `page_number` is zero-based.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError>;
}

/// One step of the extraction cascade.
///
/// A strategy either returns text that already passed its own quality gate,
/// or an error that the pipeline logs before moving on.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap pre-check; strategies that do not apply are skipped silently.
    fn applies_to(&self, input: &RawInput<'_>) -> bool;

    fn attempt(&self, input: &RawInput<'_>) -> Result<StrategyOutput, ExtractionError>;
}
