use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Text produced by the recognition engine for one image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognizedText {
    pub text: String,
    /// Mean engine confidence (0–100), when the backend reports one.
    pub confidence: Option<f32>,
}

impl RecognizedText {
    pub fn new(text: impl Into<String>, confidence: Option<f32>) -> Self {
        Self { text: text.into(), confidence }
    }
}

/// One plausible monetary amount found in recognized text.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Candidate {
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    /// Canonical form: thousands separators removed, `.` as the decimal point.
    pub normalized: String,
    pub score: f64,
}

/// Ranked candidates, most plausible first.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Extraction {
    pub candidates: Vec<Candidate>,
    pub best: Option<Candidate>,
}

impl Extraction {
    pub fn from_ranked(candidates: Vec<Candidate>) -> Self {
        let best = candidates.first().cloned();
        Self { candidates, best }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
