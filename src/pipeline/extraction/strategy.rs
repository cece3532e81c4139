//! The extraction cascade, one strategy per source kind.
//!
//! Each strategy sanitizes its own output and applies its own quality gate.
//! A strategy that returns `Ok` has produced text worth classifying.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::format::PDF_SIGNATURE;
use super::ocr::SharedOcrEngine;
use super::pdf::join_pages;
use super::pdfium::DEFAULT_RENDER_DPI;
use super::preprocess::{
    correct_orientation, decode_image, encode_png, flatten_to_rgb, EnhanceMode, ImageEnhancer,
};
use super::sanitize::sanitize_extracted_text;
use super::types::{
    ExtractionStrategy, PdfExtractor, PdfPageRenderer, RawInput, StrategyOutput,
};
use super::ExtractionError;
use crate::models::ExtractionMethod;

/// Embedded text must be strictly longer than this to be trusted.
pub const MIN_DIRECT_TEXT_CHARS: usize = 30;

/// Soft recognition shorter than this triggers the hard pass.
pub const ESCALATE_BELOW_CHARS: usize = 10;

/// Minimum recognized characters for a raster image to count as read.
pub const MIN_RECOGNIZED_CHARS: usize = 2;

pub const DEFAULT_OCR_LANGUAGES: &str = "fra+eng";

/// Quality gates and rendering parameters for the cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub min_direct_text_chars: usize,
    pub escalate_below_chars: usize,
    pub min_recognized_chars: usize,
    pub render_dpi: u32,
    pub ocr_languages: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_direct_text_chars: MIN_DIRECT_TEXT_CHARS,
            escalate_below_chars: ESCALATE_BELOW_CHARS,
            min_recognized_chars: MIN_RECOGNIZED_CHARS,
            render_dpi: DEFAULT_RENDER_DPI,
            ocr_languages: DEFAULT_OCR_LANGUAGES.to_string(),
        }
    }
}

fn char_count(text: &str) -> usize {
    text.trim().chars().count()
}

/// Enhance, encode and recognize one image. Output is sanitized.
fn recognize(
    ocr: &SharedOcrEngine,
    enhancer: &ImageEnhancer,
    image: &DynamicImage,
    mode: EnhanceMode,
) -> Result<String, ExtractionError> {
    let enhanced = enhancer.enhance(image, mode);
    let png = encode_png(&enhanced)?;
    let result = ocr.ocr_image(&png)?;
    let text = sanitize_extracted_text(&result.text);
    debug!(
        ?mode,
        chars = char_count(&text),
        engine_confidence = result.confidence,
        "Recognition pass complete"
    );
    Ok(text)
}

// ═══════════════════════════════════════════════════════════
// 1. Embedded text layer
// ═══════════════════════════════════════════════════════════

/// Reads the text layer of born-digital PDFs. Scans and image-only PDFs
/// fail the length gate and fall through.
pub struct DirectTextStrategy {
    extractor: Box<dyn PdfExtractor + Send + Sync>,
    min_chars: usize,
}

impl DirectTextStrategy {
    pub fn new(extractor: Box<dyn PdfExtractor + Send + Sync>, min_chars: usize) -> Self {
        Self {
            extractor,
            min_chars,
        }
    }
}

impl ExtractionStrategy for DirectTextStrategy {
    fn name(&self) -> &'static str {
        "direct_text"
    }

    fn applies_to(&self, input: &RawInput<'_>) -> bool {
        input.is_pdf_container()
    }

    fn attempt(&self, input: &RawInput<'_>) -> Result<StrategyOutput, ExtractionError> {
        let pages = self.extractor.extract_text(input.bytes())?;
        let text = sanitize_extracted_text(&join_pages(&pages));
        let chars = char_count(&text);

        if chars <= self.min_chars {
            return Err(ExtractionError::EmbeddedTextTooShort {
                chars,
                min: self.min_chars,
            });
        }

        Ok(StrategyOutput {
            text,
            method: ExtractionMethod::PdfDirect,
            pages: pages.len(),
        })
    }
}

// ═══════════════════════════════════════════════════════════
// 2. Raster image recognition (soft, then hard)
// ═══════════════════════════════════════════════════════════

/// Photos, scans and screenshots. Runs a soft pass first and escalates to
/// binarized input only when the soft pass reads almost nothing.
pub struct RasterRecognitionStrategy {
    ocr: SharedOcrEngine,
    enhancer: ImageEnhancer,
    escalate_below: usize,
    min_chars: usize,
}

impl RasterRecognitionStrategy {
    pub fn new(ocr: SharedOcrEngine, enhancer: ImageEnhancer, config: &ExtractionConfig) -> Self {
        Self {
            ocr,
            enhancer,
            escalate_below: config.escalate_below_chars,
            min_chars: config.min_recognized_chars,
        }
    }
}

impl ExtractionStrategy for RasterRecognitionStrategy {
    fn name(&self) -> &'static str {
        "raster_recognition"
    }

    fn applies_to(&self, input: &RawInput<'_>) -> bool {
        !input.bytes().starts_with(PDF_SIGNATURE)
    }

    fn attempt(&self, input: &RawInput<'_>) -> Result<StrategyOutput, ExtractionError> {
        let decoded = decode_image(input.bytes())?;
        let upright = correct_orientation(input.bytes(), decoded);
        let image = DynamicImage::ImageRgb8(flatten_to_rgb(&upright));

        let soft = match recognize(&self.ocr, &self.enhancer, &image, EnhanceMode::Soft) {
            Ok(text) => Some(text),
            Err(e @ ExtractionError::OcrInit(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, "Soft recognition pass failed");
                None
            }
        };
        let soft_chars = soft.as_deref().map_or(0, char_count);

        let (text, method) = if soft_chars < self.escalate_below {
            debug!(soft_chars, "Soft pass too short, escalating to hard enhancement");
            match recognize(&self.ocr, &self.enhancer, &image, EnhanceMode::Hard) {
                Ok(hard) if soft.is_none() || char_count(&hard) > soft_chars => {
                    (hard, ExtractionMethod::ImageOcrHard)
                }
                Ok(_) => (soft.unwrap_or_default(), ExtractionMethod::ImageOcrSoft),
                Err(e) => match soft {
                    Some(text) => {
                        warn!(error = %e, "Hard recognition pass failed, keeping soft result");
                        (text, ExtractionMethod::ImageOcrSoft)
                    }
                    None => return Err(e),
                },
            }
        } else {
            (soft.unwrap_or_default(), ExtractionMethod::ImageOcrSoft)
        };

        let chars = char_count(&text);
        if chars < self.min_chars {
            return Err(ExtractionError::RecognitionEmpty { chars });
        }

        Ok(StrategyOutput {
            text,
            method,
            pages: 1,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// 3. Rasterized PDF recognition
// ═══════════════════════════════════════════════════════════

/// Scanned PDFs: render every page and recognize it. Only installed when a
/// page renderer is available.
pub struct RasterizedPdfStrategy {
    renderer: Box<dyn PdfPageRenderer + Send + Sync>,
    ocr: SharedOcrEngine,
    enhancer: ImageEnhancer,
    dpi: u32,
}

impl RasterizedPdfStrategy {
    pub fn new(
        renderer: Box<dyn PdfPageRenderer + Send + Sync>,
        ocr: SharedOcrEngine,
        enhancer: ImageEnhancer,
        dpi: u32,
    ) -> Self {
        Self {
            renderer,
            ocr,
            enhancer,
            dpi,
        }
    }

    fn recognize_page(&self, bytes: &[u8], page: usize) -> Result<String, ExtractionError> {
        let png = self.renderer.render_page(bytes, page, self.dpi)?;
        let rendered = decode_image(&png)?;
        let image = DynamicImage::ImageRgb8(flatten_to_rgb(&rendered));
        recognize(&self.ocr, &self.enhancer, &image, EnhanceMode::Soft)
    }
}

impl ExtractionStrategy for RasterizedPdfStrategy {
    fn name(&self) -> &'static str {
        "rasterized_pdf"
    }

    fn applies_to(&self, input: &RawInput<'_>) -> bool {
        input.is_pdf_container()
    }

    fn attempt(&self, input: &RawInput<'_>) -> Result<StrategyOutput, ExtractionError> {
        let page_count = self.renderer.page_count(input.bytes())?;
        let mut page_texts = Vec::with_capacity(page_count);
        let mut last_error = None;

        for page in 0..page_count {
            match self.recognize_page(input.bytes(), page) {
                Ok(text) if !text.trim().is_empty() => page_texts.push(text),
                Ok(_) => debug!(page, "No text recognized on page"),
                Err(e @ ExtractionError::OcrInit(_)) => return Err(e),
                Err(e) => {
                    warn!(page, error = %e, "Skipping page that failed recognition");
                    last_error = Some(e);
                }
            }
        }

        let text = page_texts.join("\n");
        if text.trim().is_empty() {
            return Err(last_error.unwrap_or(ExtractionError::RecognitionEmpty { chars: 0 }));
        }

        Ok(StrategyOutput {
            text,
            method: ExtractionMethod::PdfRasterizedOcr,
            pages: page_texts.len(),
        })
    }
}
