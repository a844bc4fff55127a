use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Leva per euro. The BGN is pegged, so this never changes at runtime.
pub fn fixed_rate() -> Decimal {
    Decimal::new(195_583, 5)
}

/// Round to two decimals, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CurrencyError {
    #[error("Amount must be a finite number")]
    NonFinite,
    #[error("Amount is out of range: {0}")]
    OutOfRange(f64),
    #[error("Unsupported currency: '{0}' (expected BGN or EUR)")]
    Unsupported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "BGN")]
    Bgn,
    #[serde(rename = "EUR")]
    Eur,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Bgn => write!(f, "BGN"),
            Currency::Eur => write!(f, "EUR"),
        }
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    /// Codes are matched exactly; `bgn` is not accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BGN" => Ok(Currency::Bgn),
            "EUR" => Ok(Currency::Eur),
            other => Err(CurrencyError::Unsupported(other.to_string())),
        }
    }
}

/// An amount expressed in both currencies at the fixed rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub from: Currency,
    #[serde(with = "rust_decimal::serde::float")]
    pub bgn: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub eur: Decimal,
}

impl Conversion {
    /// Fails with `OutOfRange` when the other side does not fit in a `Decimal`.
    pub fn new(amount: Decimal, from: Currency) -> Result<Self, CurrencyError> {
        let rate = fixed_rate();
        let (bgn, eur) = match from {
            Currency::Bgn => (Some(amount), amount.checked_div(rate)),
            Currency::Eur => (amount.checked_mul(rate), Some(amount)),
        };
        let (Some(bgn), Some(eur)) = (bgn, eur) else {
            return Err(CurrencyError::OutOfRange(amount.to_f64().unwrap_or(f64::MAX)));
        };
        Ok(Conversion {
            rate,
            amount,
            from,
            bgn: round2(bgn),
            eur: round2(eur),
        })
    }

    /// Convert a raw `f64` as received from a query string.
    pub fn from_f64(amount: f64, from: Currency) -> Result<Self, CurrencyError> {
        if !amount.is_finite() {
            return Err(CurrencyError::NonFinite);
        }
        let amount = Decimal::from_f64(amount).ok_or(CurrencyError::OutOfRange(amount))?;
        Self::new(amount, from)
    }
}
