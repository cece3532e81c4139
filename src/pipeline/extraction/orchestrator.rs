use tracing::{debug, info, warn};

use super::format::{detect_format, FileCategory};
use super::ocr::SharedOcrEngine;
use super::preprocess::ImageEnhancer;
use super::strategy::{
    DirectTextStrategy, ExtractionConfig, RasterRecognitionStrategy, RasterizedPdfStrategy,
};
use super::types::{ExtractedText, ExtractionStrategy, PdfExtractor, PdfPageRenderer, RawInput};
use super::ExtractionError;
use crate::models::ExtractionOutcome;

/// Ordered cascade of extraction strategies. The first strategy whose
/// output passes its quality gate wins; only exhaustion is reported.
///
/// Holds no per-call state and is `Send + Sync`, so one pipeline can serve
/// concurrent requests by reference.
pub struct ExtractionPipeline {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl ExtractionPipeline {
    /// Standard cascade with default gates and enhancement, no page renderer.
    pub fn new(ocr: SharedOcrEngine, pdf_extractor: Box<dyn PdfExtractor + Send + Sync>) -> Self {
        Self::standard(
            ocr,
            pdf_extractor,
            None,
            &ExtractionConfig::default(),
            ImageEnhancer::default(),
        )
    }

    /// Direct text, raster recognition, then rasterized PDF recognition when
    /// a renderer is available.
    pub fn standard(
        ocr: SharedOcrEngine,
        pdf_extractor: Box<dyn PdfExtractor + Send + Sync>,
        pdf_renderer: Option<Box<dyn PdfPageRenderer + Send + Sync>>,
        config: &ExtractionConfig,
        enhancer: ImageEnhancer,
    ) -> Self {
        let mut strategies: Vec<Box<dyn ExtractionStrategy>> = vec![
            Box::new(DirectTextStrategy::new(
                pdf_extractor,
                config.min_direct_text_chars,
            )),
            Box::new(RasterRecognitionStrategy::new(
                ocr.clone(),
                enhancer.clone(),
                config,
            )),
        ];

        match pdf_renderer {
            Some(renderer) => strategies.push(Box::new(RasterizedPdfStrategy::new(
                renderer,
                ocr,
                enhancer,
                config.render_dpi,
            ))),
            None => info!("No PDF page renderer, scanned PDFs will not be rasterized"),
        }

        Self::with_strategies(strategies)
    }

    /// Custom strategy order.
    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Whether scanned PDFs can be rasterized for recognition.
    pub fn supports_rasterized_pdf(&self) -> bool {
        self.strategies.iter().any(|s| s.name() == "rasterized_pdf")
    }

    /// Recover text from raw upload bytes.
    ///
    /// Exactly one of `text` (non-empty) or `error` is set on the result.
    pub fn extract(&self, bytes: &[u8], filename: Option<&str>) -> ExtractedText {
        let input = RawInput::new(bytes, filename);
        info!(
            filename = input.display_name(),
            size = bytes.len(),
            "Starting text extraction"
        );

        let mut failures: Vec<(&'static str, ExtractionError)> = Vec::new();

        for strategy in &self.strategies {
            let name = strategy.name();
            if !strategy.applies_to(&input) {
                debug!(strategy = name, "Strategy does not apply, skipping");
                continue;
            }

            match strategy.attempt(&input) {
                Ok(output) if !output.text.trim().is_empty() => {
                    info!(
                        filename = input.display_name(),
                        strategy = name,
                        method = output.method.as_str(),
                        pages = output.pages,
                        chars = output.text.chars().count(),
                        "Text extraction succeeded"
                    );
                    return ExtractedText::success(output.text, output.method);
                }
                Ok(_) => {
                    warn!(strategy = name, "Strategy returned empty text");
                    failures.push((name, ExtractionError::RecognitionEmpty { chars: 0 }));
                }
                Err(e) => {
                    warn!(
                        filename = input.display_name(),
                        strategy = name,
                        error = %e,
                        "Extraction strategy failed"
                    );
                    failures.push((name, e));
                }
            }
        }

        let result = exhaustion(&input, &failures);
        warn!(
            filename = input.display_name(),
            outcome = result.outcome.as_str(),
            error = result.error.as_deref().unwrap_or_default(),
            "All extraction strategies exhausted"
        );
        result
    }
}

/// Name the exhaustion case: the content was read but held no text, the
/// input could not be read, or it is neither a PDF nor an image.
fn exhaustion(input: &RawInput<'_>, failures: &[(&'static str, ExtractionError)]) -> ExtractedText {
    let name = input.display_name();

    let content_was_read = failures.iter().any(|(_, e)| {
        matches!(
            e,
            ExtractionError::EmbeddedTextTooShort { .. } | ExtractionError::RecognitionEmpty { .. }
        )
    });
    if content_was_read {
        return ExtractedText::failure(
            ExtractionOutcome::Empty,
            format!("No text found in '{name}'"),
        );
    }

    let format = detect_format(input.bytes(), input.filename());
    if format.category == FileCategory::Unsupported {
        return ExtractedText::failure(
            ExtractionOutcome::UnsupportedFormat,
            ExtractionError::UnsupportedFormat {
                filename: name.to_string(),
            }
            .to_string(),
        );
    }

    let reason = failures
        .last()
        .map(|(strategy, e)| format!("{strategy}: {e}"))
        .unwrap_or_else(|| "no strategy applies".to_string());
    ExtractedText::failure(
        ExtractionOutcome::Unreadable,
        format!("Could not read '{name}' ({reason})"),
    )
}
