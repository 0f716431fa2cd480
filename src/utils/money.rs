//! Helpers for two-decimal currency amounts

use bigdecimal::{BigDecimal, RoundingMode};
use std::str::FromStr;

/// `n` hundredths of a currency unit, e.g. `cents(1)` is 0.01
pub fn cents(n: i64) -> BigDecimal {
    BigDecimal::from(n) / BigDecimal::from(100)
}

/// Round to two decimals, half away from zero
pub fn round_cents(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(2, RoundingMode::HalfUp)
}

/// Render with exactly two decimals and a dot separator
pub fn format_amount(amount: &BigDecimal) -> String {
    round_cents(amount).to_string()
}

/// Parse an amount written with either decimal separator.
///
/// Spaces (including no-break spaces) are treated as thousands separators.
/// A comma is only accepted as the decimal separator when `decimal_comma` is set.
pub fn parse_amount(text: &str, decimal_comma: bool) -> Option<BigDecimal> {
    let mut cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if decimal_comma {
        cleaned = cleaned.replace(',', ".");
    }
    if cleaned.is_empty() {
        return None;
    }
    BigDecimal::from_str(&cleaned).ok()
}
