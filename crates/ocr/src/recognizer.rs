use std::path::PathBuf;

use pricelens_core::OcrSettings;
use thiserror::Error;

use crate::types::RecognizedText;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Recognition engine is shut down")]
    ShutDown,
}

/// What the engine is initialized with. Fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParams {
    pub language: String,
    pub whitelist: String,
    pub data_path: Option<PathBuf>,
}

impl From<&OcrSettings> for EngineParams {
    fn from(s: &OcrSettings) -> Self {
        Self {
            language: s.language.clone(),
            whitelist: s.whitelist.clone(),
            data_path: s.tessdata_path.clone(),
        }
    }
}

/// Abstraction over a stateful OCR backend.
///
/// Implementations accept normalized PNG bytes. A backend is only ever driven
/// by one worker thread, hence `&mut self` and no `Sync` bound.
pub trait OcrBackend: Send {
    fn recognize(&mut self, image_bytes: &[u8]) -> Result<RecognizedText, OcrError>;

    /// Release engine resources. Called once, after the last job.
    fn terminate(&mut self) {}
}

/// Creates the backend. Expensive; the engine manager calls it at most once per
/// successful initialization.
pub trait BackendFactory: Send + Sync + 'static {
    fn create(&self, params: &EngineParams) -> Result<Box<dyn OcrBackend>, OcrError>;
}

impl<F> BackendFactory for F
where
    F: Fn(&EngineParams) -> Result<Box<dyn OcrBackend>, OcrError> + Send + Sync + 'static,
{
    fn create(&self, params: &EngineParams) -> Result<Box<dyn OcrBackend>, OcrError> {
        self(params)
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set string — useful for unit testing the extraction pipeline
/// without requiring Tesseract to be installed.
#[derive(Debug, Clone)]
pub struct MockRecognizer {
    pub text: String,
    pub confidence: Option<f32>,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), confidence: None }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// A factory handing out clones of this recognizer.
    pub fn factory(self) -> impl BackendFactory {
        move |_: &EngineParams| -> Result<Box<dyn OcrBackend>, OcrError> {
            Ok(Box::new(self.clone()))
        }
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&mut self, _image_bytes: &[u8]) -> Result<RecognizedText, OcrError> {
        Ok(RecognizedText::new(self.text.clone(), self.confidence))
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{BackendFactory, EngineParams, OcrBackend, OcrError};
    use crate::types::RecognizedText;
    use leptess::{LepTess, Variable};

    /// Owns the raw Tesseract handle.
    struct Handle(LepTess);

    // SAFETY: the handle is only ever touched through `&mut self` by the one
    // worker that owns the backend; it is moved between threads, never shared.
    unsafe impl Send for Handle {}

    /// One long-lived Tesseract instance, configured once.
    pub struct TesseractRecognizer {
        lt: Handle,
    }

    impl TesseractRecognizer {
        pub fn new(params: &EngineParams) -> Result<Self, OcrError> {
            let data_path = params.data_path.as_ref().and_then(|p| p.to_str());
            let mut lt = LepTess::new(data_path, &params.language)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_variable(Variable::TesseditCharWhitelist, &params.whitelist)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            Ok(Self { lt: Handle(lt) })
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&mut self, image_bytes: &[u8]) -> Result<RecognizedText, OcrError> {
            let lt = &mut self.lt.0;
            lt.set_image_from_mem(image_bytes)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            let text = lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))?;
            let confidence = lt.mean_text_conf();
            Ok(RecognizedText::new(text, (confidence >= 0).then_some(confidence as f32)))
        }
    }

    pub struct TesseractFactory;

    impl BackendFactory for TesseractFactory {
        fn create(&self, params: &EngineParams) -> Result<Box<dyn OcrBackend>, OcrError> {
            Ok(Box::new(TesseractRecognizer::new(params)?))
        }
    }
}
