use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use pricelens_core::{fixed_rate, Conversion, Currency};
use pricelens_ocr::{Candidate, OcrResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

// ── Health ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthOutput {
    pub ok: bool,
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
}

pub async fn health() -> Json<HealthOutput> {
    Json(HealthOutput { ok: true, rate: fixed_rate() })
}

// ── Conversion ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ConvertParams {
    pub amount: Option<String>,
    pub from: Option<String>,
}

pub async fn convert(Query(params): Query<ConvertParams>) -> Result<Json<Conversion>, ApiError> {
    let amount = params
        .amount
        .as_deref()
        .and_then(|a| a.trim().parse::<f64>().ok())
        .filter(|a| a.is_finite())
        .ok_or_else(|| ApiError::InvalidInput("amount must be a finite number".into()))?;
    let from: Currency = params
        .from
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(|_| ApiError::InvalidInput("from must be BGN or EUR".into()))?;

    let conversion = Conversion::from_f64(amount, from)
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
    Ok(Json(conversion))
}

// ── OCR ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CandidateOutput {
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    pub normalized: String,
}

impl From<Candidate> for CandidateOutput {
    fn from(c: Candidate) -> Self {
        CandidateOutput { value: c.value, normalized: c.normalized }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrOutput {
    pub ok: bool,
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
    pub confidence: Option<f32>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub best_amount: Option<Decimal>,
    pub candidates: Vec<CandidateOutput>,
    pub raw_text: String,
}

impl From<OcrResult> for OcrOutput {
    fn from(r: OcrResult) -> Self {
        OcrOutput {
            ok: true,
            rate: fixed_rate(),
            confidence: r.confidence,
            best_amount: r.best.map(|c| c.value),
            candidates: r.candidates.into_iter().map(CandidateOutput::from).collect(),
            raw_text: r.text,
        }
    }
}

/// Recognize amounts in one uploaded photo.
pub async fn ocr(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<OcrOutput>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("ocr", %request_id);
    async move {
        let mut multipart =
            multipart.map_err(|e| ApiError::InvalidInput(format!("expected multipart upload: {e}")))?;
        let image = read_image(&mut multipart, state.max_upload_bytes).await?;
        debug!(bytes = image.len(), "Image received");
        let result = state.pipeline.process_bytes(image).await?;
        Ok::<_, ApiError>(Json(OcrOutput::from(result)))
    }
    .instrument(span)
    .await
}

/// Pick the upload: the first part that looks like a file, or a field named `image`.
fn is_image_field(field: &Field<'_>) -> bool {
    field.file_name().is_some()
        || field.content_type().is_some_and(|ct| ct.starts_with("image/"))
        || field.name() == Some("image")
}

async fn read_image(multipart: &mut Multipart, max_bytes: usize) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if !is_image_field(&field) {
            continue;
        }
        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.len() > max_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "image exceeds {max_bytes} bytes"
            )));
        }
        if bytes.is_empty() {
            break;
        }
        return Ok(bytes.to_vec());
    }
    Err(ApiError::InvalidInput("image file is required".into()))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::InvalidInput(e.body_text())
    }
}
