//! Image enhancement ahead of OCR.
//!
//! Pure image-to-image transforms: no I/O and no engine calls, so every step
//! is testable on synthetic images. Enhancement is best effort. A failing
//! step hands back the caller's image untouched instead of an error.
//!
//! Steps, in order:
//! 1. Flatten transparency onto white and convert to 8-bit RGB
//! 2. Grayscale (ITU-R BT.601 luminance)
//! 3. Optional deskew (minimum-area rectangle of foreground pixels)
//! 4. Upscale small scans
//! 5. 3x3 median noise reduction
//! 6. Adaptive binarization (`Hard` mode only)

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, ImageOutputFormat, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ExtractionError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Maximum input image size (in bytes) before rejecting.
/// Prevents OOM on corrupt/adversarial files.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Shortest byte sequence any supported decoder can identify.
const MIN_IMAGE_BYTES: usize = 8;

/// Largest declared width or height accepted for decoding.
/// A tiny compressed file can declare a huge canvas.
pub const MAX_DECODE_DIMENSION_PX: u32 = 20_000;

/// Largest declared pixel count accepted for decoding (100 megapixels).
pub const MAX_DECODE_PIXELS: u64 = 100_000_000;

/// Scans narrower or shorter than this are upscaled before recognition.
pub const UPSCALE_THRESHOLD_PX: u32 = 1500;

pub const UPSCALE_FACTOR: u32 = 2;

/// Upscaling is skipped when it would push either side past this.
pub const MAX_WORKING_DIMENSION_PX: u32 = 10_000;

/// Neighbourhood (pixels, odd) for the local-mean threshold.
pub const ADAPTIVE_BLOCK_SIZE: u32 = 31;

/// Subtracted from the local mean; keeps paper grain white.
pub const ADAPTIVE_OFFSET: i32 = 10;

/// Gray level below which a pixel counts as ink.
const INK_THRESHOLD: u8 = 128;

/// Minimum ink pixels before a skew estimate is attempted.
const MIN_FOREGROUND_PIXELS: usize = 64;

/// Corrections smaller than this are noise.
const MIN_DESKEW_DEGREES: f32 = 0.5;

/// Larger "corrections" are almost always a misdetection on an upright page.
pub const MAX_DESKEW_DEGREES: f32 = 15.0;

// ═══════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════

/// `Soft` keeps gray levels (born-digital, color-rich documents).
/// `Hard` adds adaptive binarization (faded scans, receipts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhanceMode {
    Soft,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancerConfig {
    pub upscale_threshold_px: u32,
    pub upscale_factor: u32,
    pub max_working_dimension_px: u32,
    pub adaptive_block_size: u32,
    pub adaptive_offset: i32,
    /// Rotation correction. Off by default: validate on a real corpus first.
    pub deskew: bool,
    pub max_deskew_degrees: f32,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            upscale_threshold_px: UPSCALE_THRESHOLD_PX,
            upscale_factor: UPSCALE_FACTOR,
            max_working_dimension_px: MAX_WORKING_DIMENSION_PX,
            adaptive_block_size: ADAPTIVE_BLOCK_SIZE,
            adaptive_offset: ADAPTIVE_OFFSET,
            deskew: false,
            max_deskew_degrees: MAX_DESKEW_DEGREES,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// ImageEnhancer
// ═══════════════════════════════════════════════════════════

/// Prepares raster images for the recognizer.
#[derive(Debug, Clone, Default)]
pub struct ImageEnhancer {
    config: EnhancerConfig,
}

impl ImageEnhancer {
    pub fn new(config: EnhancerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnhancerConfig {
        &self.config
    }

    /// Whether `enhance` runs the deskew step.
    pub fn supports_deskew(&self) -> bool {
        self.config.deskew
    }

    /// Enhance an image for OCR. Returns the original image on any failure.
    pub fn enhance(&self, image: &DynamicImage, mode: EnhanceMode) -> DynamicImage {
        match self.try_enhance(image, mode) {
            Ok(gray) => DynamicImage::ImageLuma8(gray),
            Err(e) => {
                warn!(error = %e, ?mode, "Image enhancement failed, using original image");
                image.clone()
            }
        }
    }

    /// Fallible core of [`ImageEnhancer::enhance`].
    pub fn try_enhance(
        &self,
        image: &DynamicImage,
        mode: EnhanceMode,
    ) -> Result<GrayImage, ExtractionError> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(ExtractionError::ImageProcessing(format!(
                "Image has zero dimension ({w}x{h})"
            )));
        }

        let rgb = flatten_to_rgb(image);
        let mut gray = rgb_to_gray(&rgb);

        if self.config.deskew {
            gray = deskew_with_limit(&gray, self.config.max_deskew_degrees);
        }

        let gray = self.upscale_if_small(gray);
        let gray = median_filter_3x3(&gray);

        let gray = match mode {
            EnhanceMode::Soft => gray,
            EnhanceMode::Hard => adaptive_threshold(
                &gray,
                self.config.adaptive_block_size,
                self.config.adaptive_offset,
            ),
        };

        debug!(
            original = format!("{w}x{h}"),
            output = format!("{}x{}", gray.width(), gray.height()),
            ?mode,
            "Image enhanced for OCR"
        );

        Ok(gray)
    }

    /// Correct rotation if the estimated skew is within the configured limit.
    /// Never fails; unusable input is returned unchanged.
    pub fn deskew(&self, gray: &GrayImage) -> GrayImage {
        deskew_with_limit(gray, self.config.max_deskew_degrees)
    }

    fn upscale_if_small(&self, gray: GrayImage) -> GrayImage {
        let (w, h) = gray.dimensions();
        let threshold = self.config.upscale_threshold_px;
        if w >= threshold && h >= threshold {
            return gray;
        }

        let factor = self.config.upscale_factor.max(1);
        let target = w.checked_mul(factor).zip(h.checked_mul(factor));
        match target {
            Some((new_w, new_h)) if new_w.max(new_h) <= self.config.max_working_dimension_px => {
                debug!(
                    from = format!("{w}x{h}"),
                    to = format!("{new_w}x{new_h}"),
                    "Upscaling low-resolution image"
                );
                image::imageops::resize(&gray, new_w, new_h, FilterType::CatmullRom)
            }
            _ => {
                debug!(
                    width = w,
                    height = h,
                    limit = self.config.max_working_dimension_px,
                    "Skipping upscale, result would exceed working dimension"
                );
                gray
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Decoding and color normalization
// ═══════════════════════════════════════════════════════════

/// Validate image bytes before decoding.
/// Rejects clearly invalid input before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ExtractionError::ImageDecodeFailure(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ExtractionError::ImageDecodeFailure(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Read the canvas size from the image header without decoding pixels,
/// rejecting canvases over the decode caps.
pub fn check_declared_dimensions(bytes: &[u8]) -> Result<(u32, u32), ExtractionError> {
    let (width, height) = image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ExtractionError::ImageDecodeFailure(format!("Failed to read image header: {e}")))?
        .into_dimensions()
        .map_err(|e| ExtractionError::ImageDecodeFailure(format!("Failed to decode image: {e}")))?;

    let pixels = u64::from(width) * u64::from(height);
    if width.max(height) > MAX_DECODE_DIMENSION_PX || pixels > MAX_DECODE_PIXELS {
        return Err(ExtractionError::ImageDecodeFailure(format!(
            "Image canvas {width}x{height} exceeds decode limit of {MAX_DECODE_DIMENSION_PX}px per side or {MAX_DECODE_PIXELS} pixels"
        )));
    }
    Ok((width, height))
}

/// Decode raster bytes (PNG, JPEG, TIFF, GIF, BMP).
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ExtractionError> {
    validate_image_bytes(bytes)?;
    check_declared_dimensions(bytes)?;
    image::load_from_memory(bytes)
        .map_err(|e| ExtractionError::ImageDecodeFailure(format!("Failed to decode image: {e}")))
}

/// Composite any alpha channel onto a white background and return 8-bit RGB.
///
/// Fully transparent pixels become pure white whatever their stored color,
/// so transparent screenshots never reach the recognizer as black blocks.
pub fn flatten_to_rgb(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, p) in rgba.enumerate_pixels() {
        let alpha = p.0[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(p.0[0]), blend(p.0[1]), blend(p.0[2])]));
    }
    out
}

/// Convert RGB image to grayscale using ITU-R BT.601 luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = rgb.dimensions();
    let mut gray = GrayImage::new(w, h);
    for (x, y, p) in rgb.enumerate_pixels() {
        let luma = (0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32)
            .round()
            .clamp(0.0, 255.0) as u8;
        gray.put_pixel(x, y, Luma([luma]));
    }
    gray
}

/// Encode an image as PNG bytes for the recognizer.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ExtractionError> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

// ── EXIF orientation ──────────────────────────────────────

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform to a `DynamicImage`.
///
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Phone photos embed rotation in EXIF; upright them before OCR.
pub fn correct_orientation(raw_bytes: &[u8], image: DynamicImage) -> DynamicImage {
    let orientation = read_exif_orientation(raw_bytes);
    if orientation != 1 {
        debug!(orientation, "Applying EXIF orientation");
    }
    apply_orientation(image, orientation)
}

// ═══════════════════════════════════════════════════════════
// Filters
// ═══════════════════════════════════════════════════════════

/// 3x3 median filter with edge clamping. Removes salt-and-pepper speckle
/// while keeping stroke edges.
pub fn median_filter_3x3(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    let mut window = [0u8; 9];
    for y in 0..h {
        for x in 0..w {
            let mut i = 0;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                    let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                    window[i] = img.get_pixel(sx, sy).0[0];
                    i += 1;
                }
            }
            window.sort_unstable();
            out.put_pixel(x, y, Luma([window[4]]));
        }
    }
    out
}

/// Local-mean adaptive threshold: a pixel is white when it is brighter than
/// the mean of its `block_size` neighbourhood minus `offset`.
pub fn adaptive_threshold(img: &GrayImage, block_size: u32, offset: i32) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    // Summed-area table, one row/column of zero padding.
    let stride = w as usize + 1;
    let mut integral = vec![0u64; stride * (h as usize + 1)];
    for y in 0..h as usize {
        let mut row_sum = 0u64;
        for x in 0..w as usize {
            row_sum += img.get_pixel(x as u32, y as u32).0[0] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let half = (block_size.max(1) / 2) as usize;
    for y in 0..h as usize {
        let y0 = y.saturating_sub(half);
        let y1 = (y + half + 1).min(h as usize);
        for x in 0..w as usize {
            let x0 = x.saturating_sub(half);
            let x1 = (x + half + 1).min(w as usize);
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let count = ((y1 - y0) * (x1 - x0)) as u64;
            let mean = (sum / count) as i32;

            let value = img.get_pixel(x as u32, y as u32).0[0] as i32;
            let binary = if value > mean - offset { 255 } else { 0 };
            out.put_pixel(x as u32, y as u32, Luma([binary]));
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════
// Deskew
// ═══════════════════════════════════════════════════════════

/// Estimate page skew in degrees from the minimum-area rectangle enclosing
/// all ink pixels. Positive angles mean lines descend to the right.
///
/// Returns `None` for blank or tiny images and for angles under 0.5 degrees.
pub fn detect_skew_angle(img: &GrayImage) -> Option<f32> {
    let points = foreground_extremes(img);
    if points.len() < 3 {
        return None;
    }

    let hull = convex_hull(points);
    let angle = min_area_rect_angle(&hull)?;
    if angle.abs() < MIN_DESKEW_DEGREES {
        None
    } else {
        Some(angle)
    }
}

fn deskew_with_limit(gray: &GrayImage, max_degrees: f32) -> GrayImage {
    let Some(angle) = detect_skew_angle(gray) else {
        return gray.clone();
    };

    if angle.abs() > max_degrees {
        warn!(
            angle,
            limit = max_degrees,
            "Detected skew outside correction range, leaving image as is"
        );
        return gray.clone();
    }

    debug!(angle, "Deskewing image");
    rotate_gray(gray, angle)
}

/// Leftmost and rightmost ink pixel of every row. The convex hull of these
/// equals the hull of all ink pixels.
fn foreground_extremes(img: &GrayImage) -> Vec<(f64, f64)> {
    let (w, h) = img.dimensions();
    let mut points = Vec::new();
    let mut ink = 0usize;

    for y in 0..h {
        let mut first = None;
        let mut last = None;
        for x in 0..w {
            if img.get_pixel(x, y).0[0] < INK_THRESHOLD {
                ink += 1;
                first.get_or_insert(x);
                last = Some(x);
            }
        }
        if let (Some(a), Some(b)) = (first, last) {
            points.push((a as f64, y as f64));
            if b != a {
                points.push((b as f64, y as f64));
            }
        }
    }

    if ink < MIN_FOREGROUND_PIXELS {
        return Vec::new();
    }
    points
}

/// Andrew's monotone chain. Returns hull vertices counter-clockwise.
fn convex_hull(mut points: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    points.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    });
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    let cross = |o: (f64, f64), a: (f64, f64), b: (f64, f64)| {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    };

    let mut lower: Vec<(f64, f64)> = Vec::new();
    for &p in &points {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<(f64, f64)> = Vec::new();
    for &p in points.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Rotating calipers: the minimum-area enclosing rectangle has one side
/// collinear with a hull edge. Returns that edge's angle folded into
/// (-45, 45] degrees.
fn min_area_rect_angle(hull: &[(f64, f64)]) -> Option<f32> {
    if hull.len() < 3 {
        return None;
    }

    let mut best: Option<(f64, f64)> = None; // (area, angle_rad)
    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let len = (dx * dx + dy * dy).sqrt();
        if len == 0.0 {
            continue;
        }
        let (ux, uy) = (dx / len, dy / len);

        let (mut min_u, mut max_u) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_v, mut max_v) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in hull {
            let u = p.0 * ux + p.1 * uy;
            let v = -p.0 * uy + p.1 * ux;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if best.map_or(true, |(best_area, _)| area < best_area) {
            best = Some((area, dy.atan2(dx)));
        }
    }

    let (_, angle) = best?;
    let mut degrees = angle.to_degrees();
    while degrees > 45.0 {
        degrees -= 90.0;
    }
    while degrees <= -45.0 {
        degrees += 90.0;
    }
    Some(degrees as f32)
}

/// Rotate so that a line at `angle_deg` becomes horizontal. The canvas grows
/// to keep every source pixel; new area is filled white.
fn rotate_gray(img: &GrayImage, angle_deg: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let theta = (angle_deg as f64).to_radians();
    let (sin, cos) = theta.sin_cos();

    let new_w = ((w as f64 * cos.abs() + h as f64 * sin.abs()).ceil() as u32).max(1);
    let new_h = ((w as f64 * sin.abs() + h as f64 * cos.abs()).ceil() as u32).max(1);

    let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
    let (ncx, ncy) = (new_w as f64 / 2.0, new_h as f64 / 2.0);

    let mut out = GrayImage::from_pixel(new_w, new_h, Luma([255]));
    for y in 0..new_h {
        for x in 0..new_w {
            let dx = x as f64 + 0.5 - ncx;
            let dy = y as f64 + 0.5 - ncy;
            let sx = dx * cos - dy * sin + cx - 0.5;
            let sy = dx * sin + dy * cos + cy - 0.5;
            if let Some(value) = sample_bilinear(img, sx, sy) {
                out.put_pixel(x, y, Luma([value]));
            }
        }
    }
    out
}

fn sample_bilinear(img: &GrayImage, x: f64, y: f64) -> Option<u8> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x > (w - 1) as f64 || y > (h - 1) as f64 {
        return None;
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p = |px: u32, py: u32| img.get_pixel(px, py).0[0] as f64;
    let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
    let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;
    Some((top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn small_threshold_enhancer() -> ImageEnhancer {
        ImageEnhancer::new(EnhancerConfig {
            upscale_threshold_px: 50,
            ..EnhancerConfig::default()
        })
    }

    /// White canvas with a dark bar rotated by `angle_deg` around the center.
    fn rotated_bar(w: u32, h: u32, angle_deg: f64) -> GrayImage {
        let theta = angle_deg.to_radians();
        let (sin, cos) = theta.sin_cos();
        let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
        GrayImage::from_fn(w, h, |x, y| {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let u = dx * cos + dy * sin;
            let v = -dx * sin + dy * cos;
            if u.abs() < 150.0 && v.abs() < 20.0 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    // ── enhance ──

    #[test]
    fn enhance_outputs_grayscale() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(60, 80, Rgb([200, 30, 30])));
        let out = small_threshold_enhancer().enhance(&img, EnhanceMode::Soft);
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
        assert_eq!(out.dimensions(), (60, 80));
    }

    #[test]
    fn small_images_are_upscaled() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 40, Luma([220])));
        let out = ImageEnhancer::default().enhance(&img, EnhanceMode::Soft);
        assert_eq!(out.dimensions(), (200, 80));
    }

    #[test]
    fn one_small_side_triggers_upscale() {
        let enhancer = small_threshold_enhancer();
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(120, 30, Luma([220])));
        assert_eq!(enhancer.enhance(&img, EnhanceMode::Soft).dimensions(), (240, 60));
    }

    #[test]
    fn upscale_skipped_past_working_limit() {
        let enhancer = ImageEnhancer::new(EnhancerConfig {
            max_working_dimension_px: 150,
            ..EnhancerConfig::default()
        });
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 40, Luma([220])));
        assert_eq!(enhancer.enhance(&img, EnhanceMode::Soft).dimensions(), (100, 40));
    }

    #[test]
    fn soft_mode_keeps_gray_levels() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(60, 60, Luma([128])));
        let out = small_threshold_enhancer()
            .enhance(&img, EnhanceMode::Soft)
            .to_luma8();
        assert!(out.pixels().all(|p| p.0[0] == 128));
    }

    #[test]
    fn hard_mode_is_binary() {
        let gray = GrayImage::from_fn(80, 80, |x, y| {
            if (20..60).contains(&x) && (35..45).contains(&y) {
                Luma([90])
            } else {
                Luma([170])
            }
        });
        let out = small_threshold_enhancer()
            .enhance(&DynamicImage::ImageLuma8(gray), EnhanceMode::Hard)
            .to_luma8();
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert_eq!(out.get_pixel(40, 40).0[0], 0, "stroke should be black");
        assert_eq!(out.get_pixel(5, 5).0[0], 255, "paper should be white");
    }

    #[test]
    fn zero_sized_image_returned_unchanged() {
        let img = DynamicImage::new_rgb8(0, 0);
        let enhancer = ImageEnhancer::default();
        assert!(enhancer.try_enhance(&img, EnhanceMode::Hard).is_err());
        let out = enhancer.enhance(&img, EnhanceMode::Hard);
        assert_eq!(out.dimensions(), (0, 0));
        assert!(matches!(out, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn transparent_pixels_flatten_to_white() {
        let mut rgba = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 1, Rgba([0, 0, 0, 255]));
        rgba.put_pixel(2, 2, Rgba([0, 0, 0, 128]));
        let rgb = flatten_to_rgb(&DynamicImage::ImageRgba8(rgba));

        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([0, 0, 0]));
        let half = rgb.get_pixel(2, 2).0[0];
        assert!((120..=135).contains(&half), "half alpha should be mid gray, got {half}");
    }

    #[test]
    fn transparent_image_enhances_to_white() {
        let rgba = RgbaImage::from_pixel(60, 60, Rgba([0, 0, 0, 0]));
        let out = small_threshold_enhancer()
            .enhance(&DynamicImage::ImageRgba8(rgba), EnhanceMode::Soft)
            .to_luma8();
        assert!(out.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn opaque_images_convert_directly() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([77])));
        assert_eq!(flatten_to_rgb(&gray).get_pixel(1, 1), &Rgb([77, 77, 77]));
    }

    // ── filters ──

    #[test]
    fn median_removes_isolated_speckle() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([255]));
        img.put_pixel(4, 4, Luma([0]));
        let out = median_filter_3x3(&img);
        assert_eq!(out.get_pixel(4, 4).0[0], 255);
    }

    #[test]
    fn median_keeps_thick_strokes() {
        let img = GrayImage::from_fn(12, 12, |x, _| if (4..8).contains(&x) { Luma([0]) } else { Luma([255]) });
        let out = median_filter_3x3(&img);
        assert_eq!(out.get_pixel(5, 6).0[0], 0);
        assert_eq!(out.get_pixel(1, 6).0[0], 255);
    }

    #[test]
    fn adaptive_threshold_handles_uneven_lighting() {
        // Left half dim, right half bright; a dark stroke on each side.
        let img = GrayImage::from_fn(120, 60, |x, y| {
            let base = if x < 60 { 110 } else { 230 };
            if (28..32).contains(&y) && (x % 60) > 10 && (x % 60) < 50 {
                Luma([base - 70])
            } else {
                Luma([base])
            }
        });
        let out = adaptive_threshold(&img, 31, 10);
        assert_eq!(out.get_pixel(30, 30).0[0], 0);
        assert_eq!(out.get_pixel(90, 30).0[0], 0);
        assert_eq!(out.get_pixel(30, 5).0[0], 255);
        assert_eq!(out.get_pixel(90, 5).0[0], 255);
    }

    #[test]
    fn filters_accept_empty_images() {
        let empty = GrayImage::new(0, 0);
        assert_eq!(median_filter_3x3(&empty).dimensions(), (0, 0));
        assert_eq!(adaptive_threshold(&empty, 31, 10).dimensions(), (0, 0));
    }

    // ── encode / decode ──

    #[test]
    fn png_round_trip_through_decoder() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([12])));
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[..4], &[0x89, 0x50, 0x4E, 0x47]);
        let back = decode_image(&png).unwrap();
        assert_eq!(back.dimensions(), (8, 8));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode_image(b"not an image at all"),
            Err(ExtractionError::ImageDecodeFailure(_))
        ));
        assert!(matches!(
            decode_image(b"%PDF"),
            Err(ExtractionError::ImageDecodeFailure(_))
        ));
    }

    /// Minimal 24-bit BMP: file header plus BITMAPINFOHEADER, no pixel data.
    fn bmp_header_only(width: i32, height: i32) -> Vec<u8> {
        let mut bmp = Vec::with_capacity(54);
        bmp.extend_from_slice(b"BM");
        bmp.extend_from_slice(&54u32.to_le_bytes()); // file size
        bmp.extend_from_slice(&0u32.to_le_bytes()); // reserved
        bmp.extend_from_slice(&54u32.to_le_bytes()); // pixel data offset
        bmp.extend_from_slice(&40u32.to_le_bytes()); // info header size
        bmp.extend_from_slice(&width.to_le_bytes());
        bmp.extend_from_slice(&height.to_le_bytes());
        bmp.extend_from_slice(&1u16.to_le_bytes()); // planes
        bmp.extend_from_slice(&24u16.to_le_bytes()); // bits per pixel
        bmp.extend_from_slice(&[0u8; 24]); // compression, sizes, resolution, palette
        bmp
    }

    #[test]
    fn huge_declared_canvas_rejected_before_decoding() {
        let bmp = bmp_header_only(30_000, 30_000);
        assert_eq!(bmp.len(), 54);

        match decode_image(&bmp) {
            Err(ExtractionError::ImageDecodeFailure(msg)) => {
                assert!(msg.contains("30000x30000"), "unexpected message: {msg}")
            }
            other => panic!("expected a decode-limit failure, got {other:?}"),
        }
    }

    #[test]
    fn declared_dimensions_read_from_header() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 25, Luma([200])));
        let png = encode_png(&img).unwrap();
        assert_eq!(check_declared_dimensions(&png).unwrap(), (40, 25));
        assert_eq!(check_declared_dimensions(&bmp_header_only(640, 480)).unwrap(), (640, 480));
    }

    // ── orientation ──

    #[test]
    fn orientation_six_rotates_quarter_turn() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(30, 10));
        assert_eq!(apply_orientation(img.clone(), 6).dimensions(), (10, 30));
        assert_eq!(apply_orientation(img.clone(), 3).dimensions(), (30, 10));
        assert_eq!(apply_orientation(img, 42).dimensions(), (30, 10));
    }

    #[test]
    fn missing_exif_means_upright() {
        assert_eq!(read_exif_orientation(b"no exif here"), 1);
        let png = encode_png(&DynamicImage::ImageLuma8(GrayImage::new(4, 4))).unwrap();
        assert_eq!(read_exif_orientation(&png), 1);
    }

    // ── deskew ──

    #[test]
    fn detects_positive_skew() {
        let img = rotated_bar(400, 300, 5.0);
        let angle = detect_skew_angle(&img).expect("skew should be detected");
        assert!((angle - 5.0).abs() < 0.75, "expected ~5 degrees, got {angle}");
    }

    #[test]
    fn detects_negative_skew() {
        let img = rotated_bar(400, 300, -3.0);
        let angle = detect_skew_angle(&img).expect("skew should be detected");
        assert!((angle + 3.0).abs() < 0.75, "expected ~-3 degrees, got {angle}");
    }

    #[test]
    fn upright_content_has_no_skew() {
        assert_eq!(detect_skew_angle(&rotated_bar(400, 300, 0.0)), None);
    }

    #[test]
    fn blank_page_has_no_skew() {
        assert_eq!(detect_skew_angle(&GrayImage::from_pixel(100, 100, Luma([255]))), None);
        assert_eq!(detect_skew_angle(&GrayImage::new(0, 0)), None);
    }

    #[test]
    fn deskew_levels_rotated_bar() {
        let enhancer = ImageEnhancer::default();
        let straightened = enhancer.deskew(&rotated_bar(400, 300, 6.0));
        assert!(straightened.width() > 400, "canvas should grow to keep corners");
        let residual = detect_skew_angle(&straightened);
        assert!(
            residual.map_or(true, |a| a.abs() < 1.0),
            "residual skew too large: {residual:?}"
        );
    }

    #[test]
    fn deskew_ignores_excessive_angles() {
        let enhancer = ImageEnhancer::new(EnhancerConfig {
            max_deskew_degrees: 2.0,
            ..EnhancerConfig::default()
        });
        let img = rotated_bar(400, 300, 8.0);
        assert_eq!(enhancer.deskew(&img), img);
    }

    #[test]
    fn deskew_never_fails_on_degenerate_input() {
        let enhancer = ImageEnhancer::default();
        assert_eq!(enhancer.deskew(&GrayImage::new(0, 0)).dimensions(), (0, 0));
        let single = GrayImage::from_pixel(1, 1, Luma([0]));
        assert_eq!(enhancer.deskew(&single), single);
    }

    #[test]
    fn deskew_disabled_by_default() {
        assert!(!ImageEnhancer::default().supports_deskew());
        let enabled = ImageEnhancer::new(EnhancerConfig {
            deskew: true,
            ..EnhancerConfig::default()
        });
        assert!(enabled.supports_deskew());
    }
}
