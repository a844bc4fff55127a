pub mod error;
pub mod routes;
pub mod telemetry;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use pricelens_core::OcrSettings;
use pricelens_ocr::{AmountPipeline, EngineManager};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Room for multipart boundaries and part headers on top of the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: AmountPipeline,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: AmountPipeline, max_upload_bytes: usize) -> Self {
        Self { pipeline, max_upload_bytes }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD;
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/convert", get(routes::convert))
        .route("/api/ocr", post(routes::ocr))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The engine manager for this build: Tesseract when compiled in, otherwise
/// the mock recognizer, which returns no text.
#[cfg(feature = "tesseract")]
pub fn engine_manager(settings: &OcrSettings) -> EngineManager {
    EngineManager::from_settings(settings, pricelens_ocr::TesseractFactory)
}

#[cfg(not(feature = "tesseract"))]
pub fn engine_manager(settings: &OcrSettings) -> EngineManager {
    tracing::warn!("Built without the `tesseract` feature; OCR will return empty text");
    EngineManager::from_settings(settings, pricelens_ocr::MockRecognizer::new("").factory())
}
