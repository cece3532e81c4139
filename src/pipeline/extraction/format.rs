use std::path::Path;

use serde::{Deserialize, Serialize};

/// PDF files start with `%PDF`.
pub const PDF_SIGNATURE: &[u8; 4] = b"%PDF";

/// Broad file categories we handle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileCategory {
    Pdf,
    Image,
    Unsupported,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Result of format detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormatDetection {
    pub mime_type: String,
    pub category: FileCategory,
}

/// Detect file format from magic bytes, with the filename extension as a
/// secondary hint for PDFs only.
pub fn detect_format(bytes: &[u8], filename: Option<&str>) -> FormatDetection {
    let header = &bytes[..bytes.len().min(16)];

    let (mime_type, category) = match header {
        // PDF: starts with %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => ("application/pdf", FileCategory::Pdf),
        // JPEG: starts with FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => ("image/jpeg", FileCategory::Image),
        // PNG: starts with 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => ("image/png", FileCategory::Image),
        // TIFF: little-endian (49 49 2A 00) or big-endian (4D 4D 00 2A)
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => {
            ("image/tiff", FileCategory::Image)
        }
        // GIF87a / GIF89a
        [0x47, 0x49, 0x46, 0x38, ..] => ("image/gif", FileCategory::Image),
        // BMP: "BM"
        [0x42, 0x4D, ..] => ("image/bmp", FileCategory::Image),
        _ if has_pdf_extension(filename) => ("application/pdf", FileCategory::Pdf),
        _ => ("application/octet-stream", FileCategory::Unsupported),
    };

    FormatDetection {
        mime_type: mime_type.to_string(),
        category,
    }
}

/// True when the bytes carry the PDF signature or the filename ends in `.pdf`.
pub fn is_pdf_container(bytes: &[u8], filename: Option<&str>) -> bool {
    bytes.starts_with(PDF_SIGNATURE) || has_pdf_extension(filename)
}

fn has_pdf_extension(filename: Option<&str>) -> bool {
    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_pdf_from_magic_bytes() {
        let format = detect_format(b"%PDF-1.4\n%...", None);
        assert_eq!(format.category, FileCategory::Pdf);
        assert_eq!(format.mime_type, "application/pdf");
    }

    #[test]
    fn detect_jpeg_from_magic_bytes() {
        let format = detect_format(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00], Some("photo.bin"));
        assert_eq!(format.category, FileCategory::Image);
        assert_eq!(format.mime_type, "image/jpeg");
    }

    #[test]
    fn detect_png_from_magic_bytes() {
        let format = detect_format(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A], None);
        assert_eq!(format.category, FileCategory::Image);
        assert_eq!(format.mime_type, "image/png");
    }

    #[test]
    fn detect_tiff_both_endians() {
        assert_eq!(
            detect_format(&[0x49, 0x49, 0x2A, 0x00], None).category,
            FileCategory::Image
        );
        assert_eq!(
            detect_format(&[0x4D, 0x4D, 0x00, 0x2A], None).category,
            FileCategory::Image
        );
    }

    #[test]
    fn pdf_extension_is_a_hint() {
        let format = detect_format(b"garbage", Some("Scan_2024.PDF"));
        assert_eq!(format.category, FileCategory::Pdf);
    }

    #[test]
    fn unknown_bytes_are_unsupported() {
        let format = detect_format(b"hello world", Some("notes.txt"));
        assert_eq!(format.category, FileCategory::Unsupported);
        assert_eq!(detect_format(&[], None).category, FileCategory::Unsupported);
    }

    #[test]
    fn pdf_container_by_signature_or_name() {
        assert!(is_pdf_container(b"%PDF-1.7", None));
        assert!(is_pdf_container(b"", Some("contrat.pdf")));
        assert!(is_pdf_container(b"", Some("dir/CONTRAT.Pdf")));
        assert!(!is_pdf_container(b"%PD", Some("image.png")));
        assert!(!is_pdf_container(b"", Some("pdf")));
        assert!(!is_pdf_container(b"", None));
    }
}
