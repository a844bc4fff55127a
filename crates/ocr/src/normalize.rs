//! Canonicalization of locale-ambiguous number tokens.
//!
//! Price tags mix conventions: `1.234,56` (continental), `1,234.56` (anglo)
//! and `3,49` (comma decimal, no grouping) all show up in the same city. The
//! normalizer resolves them without any locale hint:
//!
//! * when both `.` and `,` are present, whichever appears **last** is the
//!   decimal separator and the other one groups thousands;
//! * when only one kind is present, `,` is read as a decimal separator, and if
//!   several separators remain only the final one is kept as the decimal point.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Amounts at or above this are treated as noise (phone numbers, barcodes).
pub const MAX_AMOUNT: u32 = 100_000;

/// A token that survived normalization and parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAmount {
    pub value: Decimal,
    pub normalized: String,
}

/// Turn one raw number token into a canonical `1234.56`-style string.
///
/// Returns an empty string when nothing parseable remains.
pub fn normalize_token(raw: &str) -> String {
    let s: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if !s.bytes().any(|b| b.is_ascii_digit()) {
        return String::new();
    }

    let canonical = match (s.rfind('.'), s.rfind(',')) {
        (Some(dot), Some(comma)) => {
            let (decimal, grouping) = if dot > comma { ('.', ',') } else { (',', '.') };
            let ungrouped: String = s.chars().filter(|&c| c != grouping).collect();
            keep_last_separator(&ungrouped, decimal)
        }
        _ => keep_last_separator(&s.replace(',', "."), '.'),
    };

    let trimmed = if canonical.starts_with("0.") {
        canonical.as_str()
    } else {
        canonical.trim_start_matches('0')
    };
    // `00.` would otherwise leave a bare `.` behind.
    if trimmed.bytes().any(|b| b.is_ascii_digit()) {
        trimmed.to_string()
    } else {
        String::new()
    }
}

/// Treat the last `sep` as the decimal point and every earlier one as grouping.
fn keep_last_separator(s: &str, sep: char) -> String {
    match s.rfind(sep) {
        Some(idx) => {
            let head: String = s[..idx].chars().filter(|&c| c != sep).collect();
            format!("{head}.{}", &s[idx + sep.len_utf8()..])
        }
        None => s.to_string(),
    }
}

/// Normalize and parse a token, keeping it only if `0 < value < 100000`.
pub fn parse_amount(raw: &str) -> Option<NormalizedAmount> {
    let normalized = normalize_token(raw);
    if normalized.is_empty() {
        return None;
    }
    let value = if normalized.starts_with('.') {
        Decimal::from_str(&format!("0{normalized}")).ok()?
    } else {
        Decimal::from_str(&normalized).ok()?
    };
    if value <= Decimal::ZERO || value >= Decimal::from(MAX_AMOUNT) {
        return None;
    }
    Some(NormalizedAmount { value, normalized })
}
