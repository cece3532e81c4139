use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::types::{OcrEngine, OcrPageResult};
use super::ExtractionError;

/// Shared handle to a recognizer. One engine serves every strategy.
pub type SharedOcrEngine = Arc<dyn OcrEngine + Send + Sync>;

/// Tesseract OCR engine via leptess.
/// Only available when compiled with the `tesseract` feature flag.
///
/// A fresh `LepTess` handle is created per call, so the engine itself is
/// `Send + Sync` and safe to share between concurrent requests.
#[cfg(feature = "tesseract")]
pub struct TesseractEngine {
    tessdata_dir: Option<PathBuf>,
    default_lang: String,
}

#[cfg(feature = "tesseract")]
impl TesseractEngine {
    /// Initialize with an optional tessdata directory (`None` uses the
    /// system default) and a `+`-joined language list such as `fra+eng`.
    pub fn new(tessdata_dir: Option<&Path>, languages: &str) -> Result<Self, ExtractionError> {
        let default_lang = match tessdata_dir {
            Some(dir) => resolve_languages(dir, languages).ok_or_else(|| {
                ExtractionError::OcrInit(format!(
                    "No traineddata for '{languages}' in {}",
                    dir.display()
                ))
            })?,
            None => languages.to_string(),
        };

        let engine = Self {
            tessdata_dir: tessdata_dir.map(Path::to_path_buf),
            default_lang,
        };
        // Fail fast when libtesseract or the language data is missing.
        engine.open(&engine.default_lang)?;
        tracing::info!(languages = %engine.default_lang, "Tesseract engine ready");
        Ok(engine)
    }

    fn open(&self, lang: &str) -> Result<leptess::LepTess, ExtractionError> {
        let data_path = match &self.tessdata_dir {
            Some(dir) => Some(
                dir.to_str()
                    .ok_or_else(|| ExtractionError::OcrInit("Invalid tessdata path".into()))?,
            ),
            None => None,
        };
        leptess::LepTess::new(data_path, lang).map_err(|e| {
            ExtractionError::OcrInit(format!(
                "Failed to initialize Tesseract with language '{lang}': {e}"
            ))
        })
    }
}

#[cfg(feature = "tesseract")]
impl OcrEngine for TesseractEngine {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        self.ocr_image_with_lang(image_bytes, &self.default_lang)
    }

    fn ocr_image_with_lang(
        &self,
        image_bytes: &[u8],
        lang: &str,
    ) -> Result<OcrPageResult, ExtractionError> {
        let mut lt = self.open(lang)?;

        lt.set_image_from_mem(image_bytes)
            .map_err(|e| ExtractionError::OcrProcessing(format!("Failed to load image: {e}")))?;

        let text = lt
            .get_utf8_text()
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e}")))?;

        let confidence = lt.mean_text_conf().max(0) as f32 / 100.0;

        Ok(OcrPageResult { text, confidence })
    }
}

/// Keep the requested languages whose `<lang>.traineddata` exists in
/// `tessdata_dir`. Returns `None` when none are installed.
pub fn resolve_languages(tessdata_dir: &Path, requested: &str) -> Option<String> {
    let available: Vec<&str> = requested
        .split('+')
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .filter(|lang| tessdata_dir.join(format!("{lang}.traineddata")).exists())
        .collect();

    if available.is_empty() {
        None
    } else {
        Some(available.join("+"))
    }
}

/// Stand-in used when no recognizer could be initialized. Every call fails,
/// so raster inputs end as unreadable/empty instead of crashing the service.
pub struct UnavailableOcrEngine {
    reason: String,
}

impl UnavailableOcrEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl OcrEngine for UnavailableOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        Err(ExtractionError::OcrInit(self.reason.clone()))
    }

    fn ocr_image_with_lang(
        &self,
        _image_bytes: &[u8],
        _lang: &str,
    ) -> Result<OcrPageResult, ExtractionError> {
        Err(ExtractionError::OcrInit(self.reason.clone()))
    }
}

/// Best available recognizer for this build.
pub fn default_ocr_engine(tessdata_dir: Option<&Path>, languages: &str) -> SharedOcrEngine {
    #[cfg(feature = "tesseract")]
    let engine: SharedOcrEngine = match TesseractEngine::new(tessdata_dir, languages) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::warn!(error = %e, "Tesseract unavailable, image recognition disabled");
            Arc::new(UnavailableOcrEngine::new(e.to_string()))
        }
    };

    #[cfg(not(feature = "tesseract"))]
    let engine: SharedOcrEngine = {
        tracing::warn!(
            tessdata = ?tessdata_dir.map(PathBuf::from),
            languages,
            "Built without the tesseract feature, image recognition disabled"
        );
        Arc::new(UnavailableOcrEngine::new(
            "built without the `tesseract` feature",
        ))
    };

    engine
}

/// Mock OCR engine for unit testing without Tesseract.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        self.ocr_image_with_lang(image_bytes, "eng")
    }

    fn ocr_image_with_lang(
        &self,
        _image_bytes: &[u8],
        _lang: &str,
    ) -> Result<OcrPageResult, ExtractionError> {
        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }
}

/// Mock engine that replays queued responses in order and records every
/// image it was handed. Once the queue is drained it returns empty text.
#[derive(Default)]
pub struct ScriptedOcrEngine {
    responses: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedOcrEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful recognition.
    pub fn then_text(self, text: &str) -> Self {
        self.push(Ok(text.to_string()))
    }

    /// Queue a recognition failure.
    pub fn then_error(self, message: &str) -> Self {
        self.push(Err(message.to_string()))
    }

    fn push(self, response: Result<String, String>) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
        self
    }

    /// Encoded images received so far, in call order.
    pub fn calls(&self) -> Vec<Vec<u8>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

impl OcrEngine for ScriptedOcrEngine {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(image_bytes.to_vec());
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| Ok(String::new()));

        match next {
            Ok(text) => Ok(OcrPageResult {
                text,
                confidence: 0.9,
            }),
            Err(message) => Err(ExtractionError::OcrProcessing(message)),
        }
    }

    fn ocr_image_with_lang(
        &self,
        image_bytes: &[u8],
        _lang: &str,
    ) -> Result<OcrPageResult, ExtractionError> {
        self.ocr_image(image_bytes)
    }
}
