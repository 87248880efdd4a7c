//! Money helpers for Swedish receipt amounts.
//!
//! Every monetary value is a [`Decimal`] carried at two fraction digits.
//! Receipts print amounts with a comma separator (`33,80`), sometimes with
//! thousands grouping (`1 234,50`) and a trailing currency (`25,00 kr`).

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Fraction digits for every stored amount (öre).
pub const MONEY_SCALE: u32 = 2;

/// Parse a Swedish-formatted decimal (`0,512`, `-1 234,50`, `25`).
///
/// Dots and spaces are treated as grouping when a comma is present.
/// Returns `None` for anything that is not a plain number.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let mut s = text.trim();
    for suffix in ["kr", "Kr", "KR", "SEK", "sek"] {
        if let Some(rest) = s.strip_suffix(suffix) {
            s = rest.trim_end();
            break;
        }
    }

    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, s),
    };
    if body.is_empty() {
        return None;
    }

    let (int_raw, frac) = match body.split_once(',') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };

    // Grouping is only legal in the integer part.
    let int_part: String = if frac.is_some() {
        int_raw
            .chars()
            .filter(|c| !matches!(c, ' ' | '.' | '\u{a0}'))
            .collect()
    } else {
        int_raw
            .chars()
            .filter(|c| !matches!(c, ' ' | '\u{a0}'))
            .collect()
    };

    if int_part.is_empty() || !int_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut normalized = String::with_capacity(int_part.len() + 4);
    if negative {
        normalized.push('-');
    }
    normalized.push_str(&int_part);
    if let Some(f) = frac {
        if f.is_empty() || !f.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        normalized.push('.');
        normalized.push_str(f);
    }

    Decimal::from_str(&normalized).ok()
}

/// Parse a money amount: like [`parse_decimal`] but at most two fraction
/// digits, normalized to öre precision.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let value = parse_decimal(text)?;
    if value.scale() > MONEY_SCALE {
        return None;
    }
    Some(normalize(value))
}

/// Round half-up (away from zero) to two fraction digits and pin the scale.
pub fn normalize(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Sum amounts, `None` on overflow.
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .map(normalize)
}

/// Display form used on receipts: `25,00 kr`.
pub fn format_kr(value: Decimal) -> String {
    format!("{} kr", normalize(value).to_string().replace('.', ","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_comma_amounts() {
        assert_eq!(parse_amount("41,90"), Some(dec!(41.90)));
        assert_eq!(parse_amount(" 129,80 "), Some(dec!(129.80)));
        assert_eq!(parse_amount("-33,80"), Some(dec!(-33.80)));
        assert_eq!(parse_amount("25"), Some(dec!(25.00)));
        assert_eq!(parse_amount("27,5"), Some(dec!(27.50)));
    }

    #[test]
    fn test_parse_grouping_and_currency() {
        assert_eq!(parse_amount("1 234,50"), Some(dec!(1234.50)));
        assert_eq!(parse_amount("1.234,50"), Some(dec!(1234.50)));
        assert_eq!(parse_amount("144,00 kr"), Some(dec!(144.00)));
        assert_eq!(parse_amount("89 SEK"), Some(dec!(89.00)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("-"), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("12,"), None);
        assert_eq!(parse_amount("1,2,3"), None);
        assert_eq!(parse_amount("2F25"), None);
        // Money never carries more than öre precision.
        assert_eq!(parse_amount("0,512"), None);
        assert_eq!(parse_decimal("0,512"), Some(dec!(0.512)));
    }

    #[test]
    fn test_normalize_rounds_half_up() {
        assert_eq!(normalize(dec!(30.665)), dec!(30.67));
        assert_eq!(normalize(dec!(30.664)), dec!(30.66));
        assert_eq!(normalize(dec!(-0.005)), dec!(-0.01));
        assert_eq!(normalize(dec!(25)).to_string(), "25.00");
    }

    #[test]
    fn test_no_binary_rounding_artifacts() {
        let a = parse_amount("0,10").unwrap();
        let b = parse_amount("0,20").unwrap();
        assert_eq!(a + b, dec!(0.30));
        assert_eq!(parse_amount("41,90").unwrap() - parse_amount("25").unwrap(), dec!(16.90));
    }

    #[test]
    fn test_checked_sum() {
        assert_eq!(checked_sum([dec!(25), dec!(16.9)]), Some(dec!(41.90)));
        assert_eq!(checked_sum(Vec::new()), Some(dec!(0.00)));
        assert_eq!(checked_sum([Decimal::MAX, Decimal::ONE]), None);
    }

    #[test]
    fn test_format_kr() {
        assert_eq!(format_kr(dec!(25)), "25,00 kr");
        assert_eq!(format_kr(dec!(16.9)), "16,90 kr");
    }
}
