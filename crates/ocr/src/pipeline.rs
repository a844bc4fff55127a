use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::engine::{EngineError, EngineManager};
use crate::extract::Extractor;
use crate::hash;
use crate::preprocess::{ImagePreprocessor, PreprocessError, StandardPreprocessor};
use crate::recognizer::OcrError;
use crate::types::Candidate;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("Recognition engine unavailable: {0}")]
    EngineInit(String),
    #[error("OCR recognition failed: {0}")]
    Recognition(#[from] OcrError),
}

impl From<EngineError> for PipelineError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Init(message) => PipelineError::EngineInit(message),
            EngineError::ShutDown => PipelineError::Recognition(OcrError::ShutDown),
        }
    }
}

impl PipelineError {
    /// The underlying failure's message, without the pipeline-stage prefix.
    pub fn details(&self) -> String {
        match self {
            PipelineError::Preprocess(e) => e.to_string(),
            PipelineError::EngineInit(message) => message.clone(),
            PipelineError::Recognition(e) => e.to_string(),
        }
    }
}

/// The result of a single recognition run.
#[derive(Debug, Clone)]
pub struct OcrResult {
    /// Short SHA-256 prefix of the uploaded bytes, for correlating logs.
    pub fingerprint: String,
    /// Raw OCR text output.
    pub text: String,
    pub confidence: Option<f32>,
    /// Ranked amounts, most plausible first.
    pub candidates: Vec<Candidate>,
    pub best: Option<Candidate>,
}

/// Orchestrates: fingerprint → preprocess → queued OCR → amount extraction.
pub struct AmountPipeline<P: ImagePreprocessor = StandardPreprocessor> {
    preprocessor: Arc<P>,
    engine: Arc<EngineManager>,
}

impl<P: ImagePreprocessor> Clone for AmountPipeline<P> {
    fn clone(&self) -> Self {
        Self {
            preprocessor: Arc::clone(&self.preprocessor),
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<P: ImagePreprocessor> AmountPipeline<P> {
    pub fn new(preprocessor: P, engine: Arc<EngineManager>) -> Self {
        Self { preprocessor: Arc::new(preprocessor), engine }
    }

    pub fn engine(&self) -> &Arc<EngineManager> {
        &self.engine
    }

    /// Process raw upload bytes (camera capture or gallery pick).
    pub async fn process_bytes(&self, data: Vec<u8>) -> Result<OcrResult, PipelineError> {
        let fingerprint = hash::fingerprint(&data);
        match self.run(data).await {
            Ok((text, confidence)) => {
                let extraction = Extractor::extract(&text);
                info!(
                    %fingerprint,
                    candidates = extraction.candidates.len(),
                    best = ?extraction.best.as_ref().map(|c| c.normalized.as_str()),
                    "Amounts extracted"
                );
                Ok(OcrResult {
                    fingerprint,
                    text,
                    confidence,
                    candidates: extraction.candidates,
                    best: extraction.best,
                })
            }
            Err(e) => {
                warn!(%fingerprint, error = %e, "Amount extraction failed");
                Err(e)
            }
        }
    }

    async fn run(&self, data: Vec<u8>) -> Result<(String, Option<f32>), PipelineError> {
        // 1. Preprocess image off the async workers.
        let preprocessor = Arc::clone(&self.preprocessor);
        let prepared = tokio::task::spawn_blocking(move || preprocessor.prepare(&data))
            .await
            .map_err(|e| PreprocessError::Task(e.to_string()))??;

        // 2. Queue for OCR and wait for our turn.
        let job = self.engine.submit(prepared).await?;
        let recognized = job.await?;

        Ok((recognized.text, recognized.confidence))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::{EngineParams, MockRecognizer, OcrBackend};
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
    use pricelens_core::OcrSettings;
    use rust_decimal::Decimal;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn tiny_png() -> Vec<u8> {
        let img: GrayImage = ImageBuffer::from_fn(4, 4, |x, _| Luma([(x * 60) as u8]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn pipeline_with(factory: impl crate::recognizer::BackendFactory) -> AmountPipeline {
        let engine = EngineManager::from_settings(&OcrSettings::default(), factory);
        AmountPipeline::new(StandardPreprocessor::default(), Arc::new(engine))
    }

    struct FailingBackend;

    impl OcrBackend for FailingBackend {
        fn recognize(&mut self, _image_bytes: &[u8]) -> Result<crate::types::RecognizedText, OcrError> {
            Err(OcrError::Engine("page segmentation failed".into()))
        }
    }

    #[tokio::test]
    async fn process_bytes_ranks_amounts() {
        let pipeline = pipeline_with(
            MockRecognizer::new("Цена 3.49 лв. стар 12,00").with_confidence(91.0).factory(),
        );

        let result = pipeline.process_bytes(tiny_png()).await.unwrap();

        assert_eq!(result.fingerprint.len(), 12);
        assert_eq!(result.text, "Цена 3.49 лв. стар 12,00");
        assert_eq!(result.confidence, Some(91.0));
        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.best.unwrap().value, Decimal::new(1200, 2));
    }

    #[tokio::test]
    async fn text_without_numbers_has_no_best() {
        let pipeline = pipeline_with(MockRecognizer::new("").factory());
        let result = pipeline.process_bytes(tiny_png()).await.unwrap();
        assert!(result.candidates.is_empty());
        assert!(result.best.is_none());
        assert!(result.confidence.is_none());
    }

    #[tokio::test]
    async fn bad_image_fails_before_engine_is_touched() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let pipeline = pipeline_with(move |_: &EngineParams| -> Result<Box<dyn OcrBackend>, OcrError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockRecognizer::new("1,00")))
        });

        let err = pipeline.process_bytes(b"not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Preprocess(_)));
        assert_eq!(created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn engine_init_failure_is_typed() {
        let pipeline = pipeline_with(|_: &EngineParams| -> Result<Box<dyn OcrBackend>, OcrError> {
            Err(OcrError::Engine("Failed loading language 'eng'".into()))
        });
        let err = pipeline.process_bytes(tiny_png()).await.unwrap_err();
        assert!(matches!(err, PipelineError::EngineInit(_)));
        assert_eq!(err.details(), "OCR engine error: Failed loading language 'eng'");
    }

    #[tokio::test]
    async fn recognition_failure_is_typed_and_engine_survives() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pipeline = pipeline_with(move |_: &EngineParams| -> Result<Box<dyn OcrBackend>, OcrError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FailingBackend))
        });

        for _ in 0..2 {
            let err = pipeline.process_bytes(tiny_png()).await.unwrap_err();
            assert!(matches!(err, PipelineError::Recognition(OcrError::Engine(_))));
            assert_eq!(err.details(), "OCR engine error: page segmentation failed");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn after_shutdown_requests_fail_cleanly() {
        let pipeline = pipeline_with(MockRecognizer::new("5,00").factory());
        pipeline.process_bytes(tiny_png()).await.unwrap();

        pipeline.engine().shutdown().await;

        let err = pipeline.process_bytes(tiny_png()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Recognition(OcrError::ShutDown)));
    }

    #[tokio::test]
    async fn custom_preprocessor_is_used() {
        struct Passthrough;
        impl ImagePreprocessor for Passthrough {
            fn prepare(&self, data: &[u8]) -> Result<Vec<u8>, PreprocessError> {
                Ok(data.to_vec())
            }
        }

        let engine = EngineManager::new(
            EngineParams::from(&OcrSettings::default()),
            MockRecognizer::new("7,20").factory(),
            Duration::from_secs(1),
        );
        let pipeline = AmountPipeline::new(Passthrough, Arc::new(engine));
        // Not an image, but the passthrough does not care.
        let result = pipeline.process_bytes(b"raw".to_vec()).await.unwrap();
        assert_eq!(result.best.unwrap().normalized, "7.20");
    }
}
