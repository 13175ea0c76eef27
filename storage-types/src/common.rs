//! Value coercion shared by the observation and persistence layers.
//!
//! LVM reports arrive either as already-parsed JSON numbers or as the raw
//! strings printed by `pvs`/`vgs`/`lvs` (`"1024207093760B"`, `"12.50"`).
//! Everything here is lossy on purpose: a value that cannot be read becomes
//! `0` (or `None` for percentages) so one malformed column never aborts a
//! whole sync cycle.

use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};

/// A numeric column as handed over by a collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Integer(u64),
    Float(f64),
    Text(String),
}

impl From<u64> for RawValue {
    fn from(value: u64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Convert a host-tool byte size into a byte count.
///
/// Integers pass through unchanged. Strings may carry one trailing unit
/// letter, which is dropped without scaling (`--units b` prints a `B`).
/// Missing, empty, negative or non-numeric input yields `0`.
pub fn parse_bytes(raw: Option<&RawValue>) -> u64 {
    match raw {
        None => 0,
        Some(RawValue::Integer(value)) => *value,
        Some(RawValue::Float(value)) => float_to_u64(*value),
        Some(RawValue::Text(text)) => parse_size_text(text).unwrap_or(0),
    }
}

/// Same coercion as [`parse_bytes`], saturated into a `u32` count.
pub fn parse_count(raw: Option<&RawValue>) -> u32 {
    u32::try_from(parse_bytes(raw)).unwrap_or(u32::MAX)
}

/// Parse a fill percentage such as `"12.50"` or `"12.5%"`.
///
/// Unlike byte sizes, an unreadable percentage is "unknown" rather than zero.
pub fn parse_percent(raw: Option<&RawValue>) -> Option<f64> {
    let value = match raw? {
        RawValue::Integer(value) => *value as f64,
        RawValue::Float(value) => *value,
        RawValue::Text(text) => {
            let text = text.trim();
            let text = text.strip_suffix('%').unwrap_or(text).trim();
            if text.is_empty() {
                return None;
            }
            text.parse::<f64>().ok()?
        }
    };

    value.is_finite().then_some(value)
}

fn float_to_u64(value: f64) -> u64 {
    if value.is_finite() && value >= 0.0 {
        value.trunc() as u64
    } else {
        0
    }
}

fn parse_size_text(text: &str) -> Option<u64> {
    let text = text.trim();
    let digits = match text.chars().last() {
        Some(last) if last.is_ascii_alphabetic() => &text[..text.len() - 1],
        _ => text,
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits, None),
    };

    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(fraction) = fraction
        && !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    whole.parse().ok()
}

/// Convert bytes to human-readable format (e.g., "1.50 GB")
pub fn bytes_to_pretty(bytes: &u64, add_bytes: bool) -> String {
    let mut steps = 0;
    let mut val: f64 = *bytes as f64;

    while val > 1024. && steps <= 8 {
        val /= 1024.;
        steps += 1;
    }

    let unit = match steps {
        0 => "B",
        1 => "KB",
        2 => "MB",
        3 => "GB",
        4 => "TB",
        5 => "PB",
        6 => "EB",
        7 => "ZB",
        8 => "YB",
        _ => "Not Supported",
    };

    if add_bytes {
        let bytes_str = bytes.to_formatted_string(&Locale::en);
        format!("{:.2} {} ({} bytes)", val, unit, bytes_str)
    } else {
        format!("{:.2} {}", val, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> RawValue {
        RawValue::Text(value.to_string())
    }

    #[test]
    fn parses_suffixed_byte_strings() {
        assert_eq!(parse_bytes(Some(&text("1024207093760B"))), 1024207093760);
        assert_eq!(parse_bytes(Some(&text("  4096 "))), 4096);
        assert_eq!(parse_bytes(Some(&text("10G"))), 10);
        assert_eq!(parse_bytes(Some(&text("1024.00B"))), 1024);
    }

    #[test]
    fn numbers_pass_through() {
        assert_eq!(parse_bytes(Some(&RawValue::Integer(500))), 500);
        assert_eq!(parse_bytes(Some(&RawValue::Float(512.9))), 512);
        assert_eq!(parse_bytes(Some(&RawValue::Float(-3.0))), 0);
    }

    #[test]
    fn unreadable_sizes_become_zero() {
        assert_eq!(parse_bytes(None), 0);
        assert_eq!(parse_bytes(Some(&text(""))), 0);
        assert_eq!(parse_bytes(Some(&text("abc"))), 0);
        assert_eq!(parse_bytes(Some(&text("B"))), 0);
        assert_eq!(parse_bytes(Some(&text("-12"))), 0);
        assert_eq!(parse_bytes(Some(&text("12BB"))), 0);
    }

    #[test]
    fn counts_saturate() {
        assert_eq!(parse_count(Some(&text("3"))), 3);
        assert_eq!(parse_count(Some(&RawValue::Integer(u64::MAX))), u32::MAX);
        assert_eq!(parse_count(Some(&text("n/a"))), 0);
    }

    #[test]
    fn percentages_are_optional() {
        assert_eq!(parse_percent(Some(&text("12.50"))), Some(12.5));
        assert_eq!(parse_percent(Some(&text("7%"))), Some(7.0));
        assert_eq!(parse_percent(Some(&text(""))), None);
        assert_eq!(parse_percent(Some(&text("x"))), None);
        assert_eq!(parse_percent(None), None);
    }

    #[test]
    fn raw_values_deserialize_from_numbers_and_strings() {
        let values: Vec<RawValue> = serde_json::from_str(r#"[500, 1.5, "2048B"]"#).unwrap();
        assert_eq!(
            values,
            vec![RawValue::Integer(500), RawValue::Float(1.5), text("2048B")]
        );
    }

    #[test]
    fn pretty_prints_sizes() {
        assert_eq!(bytes_to_pretty(&512, false), "512.00 B");
        assert_eq!(
            bytes_to_pretty(&(3 * 1024 * 1024), true),
            "3.00 MB (3,145,728 bytes)"
        );
    }
}
