//! Calendar date handling shared by statistics, filters and formulas
//!
//! Accepted shapes: `YYYY-MM-DD`, `MM/DD/YYYY` (one or two digit month/day)
//! and `YYYY/MM/DD`. Day counts are whole days since 1970-01-01.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_SHAPES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date pattern"), "%Y-%m-%d"),
        (Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").expect("valid date pattern"), "%m/%d/%Y"),
        (Regex::new(r"^\d{4}/\d{2}/\d{2}$").expect("valid date pattern"), "%Y/%m/%d"),
    ]
});

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn parse_shape(s: &str) -> Option<NaiveDate> {
    DATE_SHAPES
        .iter()
        .find(|(re, _)| re.is_match(s))
        .and_then(|(_, fmt)| NaiveDate::parse_from_str(s, fmt).ok())
}

/// True when `value` is exactly one of the accepted date shapes and names a
/// real calendar day. Surrounding whitespace and one pair of quotes are ignored.
pub fn is_date_literal(value: &str) -> bool {
    let stripped = value.trim();
    let stripped = stripped
        .strip_prefix(['\'', '"'])
        .unwrap_or(stripped);
    let stripped = stripped.strip_suffix(['\'', '"']).unwrap_or(stripped);
    parse_shape(stripped).is_some()
}

/// Parse a date cell. Besides the strict shapes, an ISO timestamp
/// (`2024-01-01T10:00:00Z`) is read by its date part.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let s = value.trim();
    if let Some(date) = parse_shape(s) {
        return Some(date);
    }
    if s.len() > 10 && s.is_char_boundary(10) && matches!(s.as_bytes()[10], b'T' | b' ') {
        return parse_shape(&s[..10]);
    }
    None
}

pub fn days_since_epoch(date: NaiveDate) -> i64 {
    (date - epoch()).num_days()
}

/// Date `days` after the epoch, the fraction floored
pub fn date_from_days(days: f64) -> Option<NaiveDate> {
    if !days.is_finite() || days.abs() > 100_000_000.0 {
        return None;
    }
    epoch().checked_add_signed(chrono::Duration::days(days.floor() as i64))
}

pub fn to_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Whole months from `from` to `to`, one less when `to`'s day of month has
/// not been reached yet
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let years = i64::from(to.year() - from.year());
    let months = i64::from(to.month() as i32 - from.month() as i32);
    let mut total = years * 12 + months;
    if from.day() > to.day() {
        total -= 1;
    }
    total
}
