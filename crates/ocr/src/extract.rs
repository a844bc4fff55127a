use std::collections::HashSet;
use std::sync::OnceLock;

use pricelens_core::round2;
use regex::Regex;
use rust_decimal::Decimal;

use crate::normalize::{parse_amount, NormalizedAmount};
use crate::types::{Candidate, Extraction};

/// Longest ranked list handed back to the client.
pub const MAX_CANDIDATES: usize = 8;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// A digit, up to 15 digits/separators/spaces, a digit. ASCII only: OCR output
// is whitelisted to ASCII digits, and Unicode `\d` would admit other scripts.
re!(re_number_token, r"[0-9][0-9., ]{0,15}[0-9]");
re!(re_short_fraction, r"\.[0-9]{1,2}$");

// ── Public extraction API ─────────────────────────────────────────────────────

pub struct Extractor;

impl Extractor {
    /// Rank every plausible amount in `text`, most plausible first.
    pub fn extract(text: &str) -> Extraction {
        let mut seen = HashSet::new();
        let mut candidates: Vec<Candidate> = Self::tokens(text)
            .filter_map(parse_amount)
            .filter(|amount| seen.insert(round2(amount.value)))
            .map(|amount| {
                let score = score(&amount);
                Candidate { value: amount.value, normalized: amount.normalized, score }
            })
            .collect();

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(b.value.cmp(&a.value)));
        candidates.truncate(MAX_CANDIDATES);

        Extraction::from_ranked(candidates)
    }

    /// Non-overlapping greedy number tokens, left to right.
    pub fn tokens(text: &str) -> impl Iterator<Item = &str> {
        re_number_token().find_iter(text).map(|m| m.as_str())
    }
}

// ── Scoring ───────────────────────────────────────────────────────────────────

/// Favors two-decimal prices in a typical retail range.
fn score(amount: &NormalizedAmount) -> f64 {
    let well_formed = if re_short_fraction().is_match(&amount.normalized) { 2.0 } else { 0.0 };
    let retail_range = if amount.value >= Decimal::new(20, 2) && amount.value <= Decimal::from(5000) {
        2.0
    } else {
        0.0
    };
    let length = amount.normalized.chars().count().min(10) as f64 / 10.0;
    well_formed + retail_range + length
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn values(e: &Extraction) -> Vec<Decimal> {
        e.candidates.iter().map(|c| c.value).collect()
    }

    fn assert_invariants(e: &Extraction) {
        assert!(e.candidates.len() <= MAX_CANDIDATES);
        let mut keys = HashSet::new();
        for c in &e.candidates {
            assert!(c.value > Decimal::ZERO && c.value < Decimal::from(100_000));
            assert!(keys.insert(round2(c.value)), "duplicate {}", c.value);
        }
        for pair in e.candidates.windows(2) {
            assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                assert!(pair[0].value >= pair[1].value);
            }
        }
        assert_eq!(e.best.as_ref(), e.candidates.first());
    }

    // ── Tokens ────────────────────────────────────────────────────────────────

    #[test]
    fn tokens_are_greedy_and_non_overlapping() {
        let t: Vec<_> = Extractor::tokens("a 1 234,56 b 7 c 89").collect();
        assert_eq!(t, vec!["1 234,56", "89"]);
    }

    #[test]
    fn token_length_is_capped() {
        // 20 digits: first match is 17 long, the rest forms a second token.
        let t: Vec<_> = Extractor::tokens("12345678901234567890").collect();
        assert_eq!(t, vec!["12345678901234567", "890"]);
    }

    #[test]
    fn single_digits_are_not_tokens() {
        assert_eq!(Extractor::tokens("5 лв").count(), 0);
    }

    // ── Ranking ───────────────────────────────────────────────────────────────

    #[test]
    fn price_tag_example_ranks_by_score_then_value() {
        let e = Extractor::extract("Цена 3.49 лв. стар 12,00");
        assert_eq!(values(&e), vec![dec("12.00"), dec("3.49")]);
        // 2 + 2 + 0.5 vs 2 + 2 + 0.4
        assert!((e.candidates[0].score - 4.5).abs() < 1e-9);
        assert!((e.candidates[1].score - 4.4).abs() < 1e-9);
        assert_eq!(e.best.unwrap().normalized, "12.00");
        assert_invariants(&Extractor::extract("Цена 3.49 лв. стар 12,00"));
    }

    #[test]
    fn well_formed_price_beats_bare_integer() {
        let e = Extractor::extract("Art 4711\nTotal 23,90");
        assert_eq!(e.best.as_ref().unwrap().value, dec("23.90"));
        assert_invariants(&e);
    }

    #[test]
    fn out_of_range_values_score_lower() {
        // 9999.99 is well formed but outside the retail range.
        let e = Extractor::extract("9999.99\n0.15\n2.30");
        assert_eq!(values(&e), vec![dec("2.30"), dec("9999.99"), dec("0.15")]);
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let e = Extractor::extract("3,49\n3.49\n3.490");
        assert_eq!(e.candidates.len(), 1);
        assert_eq!(e.candidates[0].normalized, "3.49");
    }

    #[test]
    fn neighbouring_numbers_on_one_line_merge_into_one_token() {
        // Spaces are allowed inside a token, so this reads as 3.493.49 -> 3493.49.
        let e = Extractor::extract("3,49 3.49");
        assert_eq!(values(&e), vec![dec("3493.49")]);
    }

    #[test]
    fn zero_and_huge_values_are_dropped() {
        let e = Extractor::extract("0,00\n123456,78\n00\n5,50");
        assert_eq!(values(&e), vec![dec("5.50")]);
    }

    #[test]
    fn list_is_truncated_to_eight() {
        let text = (1..=12).map(|i| format!("{i}.{i:02}")).collect::<Vec<_>>().join("\n");
        let e = Extractor::extract(&text);
        assert_eq!(e.candidates.len(), MAX_CANDIDATES);
        assert_invariants(&e);
        // All score the same bonuses; longer strings and then larger values win.
        assert_eq!(e.candidates[0].value, dec("12.12"));
    }

    #[test]
    fn empty_text_yields_nothing() {
        let e = Extractor::extract("");
        assert!(e.is_empty());
        assert!(e.best.is_none());
    }

    #[test]
    fn no_panic_on_garbage_input() {
        let e = Extractor::extract("!@#$%^&*()\n\0\x01\x02 ..,, 1.,.,.,.,.,.,.,.,9");
        assert_invariants(&e);
    }

    #[test]
    fn invariants_hold_on_noisy_receipt() {
        let text = "KAUFLAND 0888 123 456\n2024 10 15\n1.234,56\n1,234.56\n\
                    3,49 x 2 = 6,98\nОБЩО 10,47\nБОН 000123 ДДС 1,75\n99 999,99 100 000,00";
        assert_invariants(&Extractor::extract(text));
    }
}
