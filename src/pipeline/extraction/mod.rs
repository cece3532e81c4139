pub mod types;
pub mod format;
pub mod sanitize;
pub mod preprocess;
pub mod pdf;
pub mod pdfium;
pub mod ocr;
pub mod strategy;
pub mod orchestrator;

pub use types::*;
pub use format::*;
pub use sanitize::*;
pub use preprocess::*;
pub use pdf::*;
pub use ocr::*;
pub use strategy::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Embedded text layer too short ({chars} chars, need more than {min})")]
    EmbeddedTextTooShort { chars: usize, min: usize },

    #[error("Image decoding failed: {0}")]
    ImageDecodeFailure(String),

    #[error("Recognition produced no usable text ({chars} chars)")]
    RecognitionEmpty { chars: usize },

    #[error("Unsupported format for extraction: {filename}")]
    UnsupportedFormat { filename: String },

    #[error("OCR initialization failed: {0}")]
    OcrInit(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("Image processing error: {0}")]
    ImageProcessing(String),
}
