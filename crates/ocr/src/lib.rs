pub mod engine;
pub mod extract;
pub mod hash;
pub mod normalize;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use engine::{EngineError, EngineManager, PendingRecognition, RecognitionEngine};
pub use extract::{Extractor, MAX_CANDIDATES};
pub use hash::{fingerprint, sha256_bytes, to_hex};
pub use normalize::{normalize_token, parse_amount, NormalizedAmount};
pub use pipeline::{AmountPipeline, OcrResult, PipelineError};
pub use preprocess::{ImagePreprocessor, PreprocessError, StandardPreprocessor};
pub use recognizer::{BackendFactory, EngineParams, MockRecognizer, OcrBackend, OcrError};
pub use types::{Candidate, Extraction, RecognizedText};

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::{TesseractFactory, TesseractRecognizer};
