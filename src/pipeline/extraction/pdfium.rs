//! PDF page rendering via Google PDFium.
//!
//! Renders individual PDF pages to PNG so that scanned PDFs (no text layer)
//! can go through recognition page by page.
//!
//! `PdfiumRenderer` is stateless (`Send + Sync`). Each operation creates
//! a fresh `Pdfium` instance because the upstream type is `!Send`.
//! The OS caches `dlopen`/`LoadLibrary` calls, so repeat loads are near-free.

use std::path::PathBuf;

use image::{DynamicImage, GrayImage, Luma};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::preprocess::encode_png;
use super::types::PdfPageRenderer;
use super::ExtractionError;
use crate::config;

/// Maximum dimension (width or height) for rendered page images.
/// Prevents OOM on extremely large pages or absurd DPI settings.
const MAX_DIMENSION_PX: u32 = 4096;

/// Rasterization resolution for recognition.
pub const DEFAULT_RENDER_DPI: u32 = 300;

/// PDF points per inch (standard PDF unit).
const POINTS_PER_INCH: f32 = 72.0;

/// Explicit path to the PDFium shared library.
pub const PDFIUM_PATH_ENV: &str = "PDFIUM_DYNAMIC_LIB_PATH";

/// Renders PDF pages to PNG images using Google PDFium.
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Create a renderer, verifying the PDFium library is loadable.
    ///
    /// This is the capability check: when it fails the rasterized-PDF
    /// strategy is simply not installed.
    pub fn new() -> Result<Self, ExtractionError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Load the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path)
/// 2. Alongside the running executable, then `<exe_dir>/pdfium/`
/// 3. `<data_dir>/pdfium/`
/// 4. System library search paths
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var(PDFIUM_PATH_ENV) {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractionError::PdfRendering {
                page: 0,
                reason: format!("Failed to load PDFium from {path}: {e}"),
            }
        })?;
        return Ok(Pdfium::new(bindings));
    }

    for dir in candidate_dirs() {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!(dir = %dir.display(), "Loaded PDFium from candidate directory");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings =
        Pdfium::bind_to_system_library().map_err(|e| ExtractionError::PdfRendering {
            page: 0,
            reason: format!(
                "PDFium library not found. Set {PDFIUM_PATH_ENV} or install PDFium: {e}"
            ),
        })?;
    Ok(Pdfium::new(bindings))
}

fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        dirs.push(exe_dir.join("pdfium"));
        dirs.insert(0, exe_dir);
    }
    dirs.push(config::app_data_dir().join("pdfium"));
    dirs
}

/// Map PDF load errors, detecting encrypted PDFs.
fn map_load_error(e: PdfiumError) -> ExtractionError {
    let msg = format!("{e}");
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ExtractionError::PdfEncrypted
    } else {
        ExtractionError::PdfRendering {
            page: 0,
            reason: format!("Failed to load PDF: {e}"),
        }
    }
}

/// Compute pixel dimensions for rendering, applying the dimension guard.
///
/// Returns (width_px, height_px), both clamped to [1, MAX_DIMENSION_PX].
/// Preserves aspect ratio when capping.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let dpi = f64::from(dpi);
    let inch = f64::from(POINTS_PER_INCH);
    let raw_w = (f64::from(width_points) * dpi / inch).max(1.0);
    let raw_h = (f64::from(height_points) * dpi / inch).max(1.0);

    let max_dim = raw_w.max(raw_h);
    let cap = f64::from(MAX_DIMENSION_PX);
    let ratio = if max_dim > cap { cap / max_dim } else { 1.0 };

    let to_px = |v: f64| ((v * ratio).round() as u32).clamp(1, MAX_DIMENSION_PX);
    (to_px(raw_w), to_px(raw_h))
}

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let pages = document.pages();

        let page_index = u16::try_from(page_number).map_err(|_| ExtractionError::PdfRendering {
            page: page_number,
            reason: format!("Page index {page_number} exceeds u16 maximum"),
        })?;

        let page = pages
            .get(page_index)
            .map_err(|_| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!(
                    "Page {page_number} out of range (document has {} pages)",
                    pages.len()
                ),
            })?;

        let width_points = page.width().value;
        let height_points = page.height().value;
        let (target_w, target_h) = compute_render_dimensions(width_points, height_points, dpi);

        let uncapped_w = (width_points * dpi as f32 / POINTS_PER_INCH) as u32;
        let uncapped_h = (height_points * dpi as f32 / POINTS_PER_INCH) as u32;
        if target_w != uncapped_w || target_h != uncapped_h {
            warn!(
                page = page_number,
                raw_width = uncapped_w,
                raw_height = uncapped_h,
                capped_width = target_w,
                capped_height = target_h,
                "Page dimensions capped to {MAX_DIMENSION_PX}px",
            );
        }

        let render_config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("Rendering failed: {e}"),
            })?;

        let png_bytes = encode_png(&bitmap.as_image())?;

        debug!(
            page = page_number,
            width = target_w,
            height = target_h,
            png_size = png_bytes.len(),
            "Rendered PDF page to PNG"
        );

        Ok(png_bytes)
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Mock page renderer for strategy and pipeline tests that must not depend
/// on the PDFium binary. Every page renders to the same PNG unless listed
/// in `failing_pages`.
pub struct MockPdfPageRenderer {
    page_count: usize,
    page_png: Vec<u8>,
    failing_pages: Vec<usize>,
}

impl MockPdfPageRenderer {
    /// Pages render as small blank white images.
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            page_png: blank_page_png(),
            failing_pages: Vec::new(),
        }
    }

    /// Pages render as the given PNG bytes.
    pub fn with_page_png(page_count: usize, page_png: Vec<u8>) -> Self {
        Self {
            page_count,
            page_png,
            failing_pages: Vec::new(),
        }
    }

    /// Zero-based pages that fail to render.
    pub fn failing_on(mut self, pages: &[usize]) -> Self {
        self.failing_pages = pages.to_vec();
        self
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        if page_number >= self.page_count {
            return Err(ExtractionError::PdfRendering {
                page: page_number,
                reason: format!(
                    "Page {page_number} out of range (mock has {} pages)",
                    self.page_count
                ),
            });
        }
        if self.failing_pages.contains(&page_number) {
            return Err(ExtractionError::PdfRendering {
                page: page_number,
                reason: "mock render failure".into(),
            });
        }
        Ok(self.page_png.clone())
    }
}

/// 16x16 white PNG; an empty vector if encoding somehow fails.
fn blank_page_png() -> Vec<u8> {
    encode_png(&DynamicImage::ImageLuma8(GrayImage::from_pixel(
        16,
        16,
        Luma([255]),
    )))
    .unwrap_or_default()
}
