//! Numeric coercion policies
//!
//! Source cells arrive as text. Every place the engine turns a cell into a
//! number goes through one of the named policies below, so the permissive
//! behaviour (a non-numeric cell silently counting as zero) is visible and
//! testable in one place.

use crate::types::CellValue;

/// Parse the longest numeric prefix of `s` (leading whitespace ignored).
///
/// `"12.5abc"` → 12.5, `"-3e2x"` → -300, `"abc"` → None.
pub fn parse_leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    if s[end..].starts_with("Infinity") {
        let sign = if s.starts_with('-') { -1.0 } else { 1.0 };
        return Some(sign * f64::INFINITY);
    }

    let mut digits = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        digits += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return None;
    }

    // Exponent only counts when at least one digit follows it
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok()
}

/// Parse the leading base-10 integer of `s` (leading whitespace ignored).
pub fn parse_leading_int(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let digits: String = body.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let value = digits.parse::<f64>().ok()?;
    Some(if negative { -value } else { value })
}

/// Float reading of a cell; `None` when the cell has no numeric prefix
pub fn parse_float_value(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Null => None,
        CellValue::Number(n) if n.is_nan() => None,
        CellValue::Number(n) => Some(*n),
        CellValue::Text(s) => parse_leading_float(s),
    }
}

/// Integer reading of a cell (fraction truncated)
pub fn parse_int_value(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Null => None,
        CellValue::Number(n) if !n.is_finite() => None,
        CellValue::Number(n) => Some(n.trunc()),
        CellValue::Text(s) => parse_leading_int(s),
    }
}

/// Best-effort numeric coercion: the float reading of the cell, or 0 when the
/// cell is missing, null, or not numeric. Never fails.
pub fn best_effort_number(value: &CellValue) -> f64 {
    parse_float_value(value).unwrap_or(0.0)
}

/// Strict whole-value conversion used by loose comparisons.
///
/// Null and blank text read as 0; text must be a complete number
/// (surrounding whitespace allowed), otherwise the result is NaN.
pub fn strict_number(value: &CellValue) -> f64 {
    match value {
        CellValue::Null => 0.0,
        CellValue::Number(n) => *n,
        CellValue::Text(s) => strict_number_str(s),
    }
}

/// [`strict_number`] for raw text
pub fn strict_number_str(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust accepts "inf"/"nan" spellings; only plain decimal literals count here
    if !t
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_leading_float_prefixes() {
        assert_eq!(parse_leading_float("12.5abc"), Some(12.5));
        assert_eq!(parse_leading_float("  -3e2x"), Some(-300.0));
        assert_eq!(parse_leading_float("4e"), Some(4.0));
        assert_eq!(parse_leading_float(".5"), Some(0.5));
        assert_eq!(parse_leading_float("2030-05-01"), Some(2030.0));
        assert_eq!(parse_leading_float("abc"), None);
        assert_eq!(parse_leading_float(""), None);
        assert_eq!(parse_leading_float("-"), None);
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("20"), Some(20.0));
        assert_eq!(parse_leading_int("15.9"), Some(15.0));
        assert_eq!(parse_leading_int("-7 units"), Some(-7.0));
        assert_eq!(parse_leading_int("x7"), None);
    }

    #[test]
    fn test_best_effort_number_defaults_to_zero() {
        assert_eq!(best_effort_number(&CellValue::text("150")), 150.0);
        assert_eq!(best_effort_number(&CellValue::text("n/a")), 0.0);
        assert_eq!(best_effort_number(&CellValue::Null), 0.0);
        assert_eq!(best_effort_number(&CellValue::Number(f64::NAN)), 0.0);
    }

    #[test]
    fn test_strict_number() {
        assert_eq!(strict_number(&CellValue::Null), 0.0);
        assert_eq!(strict_number(&CellValue::text(" 20 ")), 20.0);
        assert_eq!(strict_number(&CellValue::text("")), 0.0);
        assert!(strict_number(&CellValue::text("20abc")).is_nan());
        assert!(strict_number(&CellValue::text("nan")).is_nan());
        assert!(strict_number(&CellValue::text("2039-12-11")).is_nan());
    }
}
