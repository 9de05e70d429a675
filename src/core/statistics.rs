//! Per-column descriptive statistics
//!
//! Every key observed across a set of rows is classified value by value:
//! strict date literals are set aside, everything else is read as a number
//! when it has a numeric prefix, and the rest is ignored. Columns with at
//! least one numeric value get a [`ColumnStatistics`] snapshot.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;

use super::coerce::parse_float_value;
use super::dates::is_date_literal;
use crate::types::{CellValue, Row};

/// Most frequent value, or every value sharing the top frequency (ascending)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModeValue {
    Single(f64),
    Tied(Vec<f64>),
}

impl ModeValue {
    fn from_ties(mut ties: Vec<f64>) -> Self {
        ties.sort_by(f64::total_cmp);
        if ties.len() == 1 {
            ModeValue::Single(ties[0])
        } else {
            ModeValue::Tied(ties)
        }
    }

    /// The single mode, or the smallest of a tie
    pub fn primary(&self) -> f64 {
        match self {
            ModeValue::Single(v) => *v,
            ModeValue::Tied(values) => values.first().copied().unwrap_or(f64::NAN),
        }
    }
}

/// One point of the convex probability curve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityPoint {
    pub value: f64,
    pub probability: f64,
}

/// Immutable statistics snapshot for one column
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub mode: ModeValue,
    pub variance: f64,
    pub std_deviation: f64,
    pub two_std_deviations: [f64; 2],
    pub three_std_deviations: [f64; 2],
    pub sum: f64,
    pub count: usize,
    pub unique: usize,
    pub nonzero_min: Option<f64>,
    pub area_mode: Option<ModeValue>,
    #[serde(rename = "YTDfactor")]
    pub ytd_factor: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_array: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convex_probability: Option<Vec<ProbabilityPoint>>,
}

/// Statistics for every numeric column of a data set, in first-seen column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsTable {
    columns: Vec<(String, ColumnStatistics)>,
}

impl StatisticsTable {
    pub fn get(&self, column: &str) -> Option<&ColumnStatistics> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, stats)| stats)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnStatistics)> {
        self.columns.iter().map(|(name, stats)| (name.as_str(), stats))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Serialize for StatisticsTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, stats) in &self.columns {
            map.serialize_entry(name, stats)?;
        }
        map.end()
    }
}

/// Compute statistics for every numeric column across `rows`.
pub fn compute_statistics(rows: &[Row]) -> StatisticsTable {
    let mut order: Vec<String> = Vec::new();
    let mut numeric: HashMap<String, Vec<f64>> = HashMap::new();

    for row in rows {
        for (key, value) in row.iter() {
            if let CellValue::Text(s) = value {
                if is_date_literal(s) {
                    continue;
                }
            }
            let Some(n) = parse_float_value(value) else {
                continue;
            };
            numeric
                .entry(key.to_string())
                .or_insert_with(|| {
                    order.push(key.to_string());
                    Vec::new()
                })
                .push(n);
        }
    }

    let columns = order
        .into_iter()
        .filter_map(|name| {
            let values = numeric.remove(&name)?;
            let stats = column_statistics(&name, &values)?;
            Some((name, stats))
        })
        .collect();

    StatisticsTable { columns }
}

/// Statistics for one column's numeric values; `None` when there are none
pub fn column_statistics(name: &str, values: &[f64]) -> Option<ColumnStatistics> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut distinct = sorted.clone();
    distinct.dedup();

    let count = values.len();
    let sum: f64 = values.iter().sum();
    let mean = sum / count as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    let sd = variance.sqrt();
    let mode = frequency_mode(values);
    let (area_mode, nonzero_min) = area_mode(values);

    let mut stats = ColumnStatistics {
        min: sorted[0],
        max: sorted[count - 1],
        mean,
        median: median(&sorted),
        mode,
        variance,
        std_deviation: sd,
        two_std_deviations: [mean - 2.0 * sd, mean + 2.0 * sd],
        three_std_deviations: [mean - 3.0 * sd, mean + 3.0 * sd],
        sum,
        count,
        unique: distinct.len(),
        nonzero_min,
        area_mode,
        ytd_factor: ytd_factor(name),
        unique_array: None,
        convex_probability: None,
    };

    if stats.unique > 4
        && stats.unique <= 16
        && stats.median.trunc() < (stats.unique - 1) as f64
    {
        stats.convex_probability = convex_probability(stats.mode.primary(), &distinct);
        stats.unique_array = Some(distinct);
    }

    Some(stats)
}

fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

fn frequency_mode(values: &[f64]) -> ModeValue {
    let mut counts: Vec<(f64, usize)> = Vec::new();
    for &v in values {
        match counts.iter_mut().find(|(seen, _)| *seen == v) {
            Some((_, n)) => *n += 1,
            None => counts.push((v, 1)),
        }
    }
    let top = counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
    ModeValue::from_ties(
        counts
            .into_iter()
            .filter(|(_, n)| *n == top)
            .map(|(v, _)| v)
            .collect(),
    )
}

/// Half-up rounding (`-2.5` → `-2`)
fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Mode of the values rounded to the order of magnitude of the smallest
/// positive value, paired with that smallest positive value.
pub fn area_mode(values: &[f64]) -> (Option<ModeValue>, Option<f64>) {
    let Some(min_positive) = values
        .iter()
        .copied()
        .filter(|v| *v > 0.0)
        .min_by(f64::total_cmp)
    else {
        return (None, None);
    };

    let factor = 10f64.powi(min_positive.log10().floor() as i32);
    let rounded: Vec<f64> = values
        .iter()
        .map(|v| round_half_up(v / factor) * factor)
        .collect();

    (Some(frequency_mode(&rounded)), Some(min_positive))
}

/// Annualization multiplier for period-to-date columns
pub fn ytd_factor(column: &str) -> f64 {
    let lower = column.to_lowercase();
    if lower.contains("mtd") {
        12.0
    } else if lower.contains("day") || lower.contains("daily") {
        365.0
    } else {
        1.0
    }
}

/// `n` evenly spaced points from `a` to `b` inclusive. Fewer than two points
/// degenerate to `[a]` (n = 1) or nothing.
pub fn interpolate(a: f64, b: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![a],
        _ => {
            let step = (b - a) / (n - 1) as f64;
            (0..n).map(|i| a + i as f64 * step).collect()
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Two-segment probability curve over the sorted distinct values: the first
/// `mode` values rise 0 → 1, the remaining values rise 5 → 100. The curve
/// steepens past the modal value.
pub fn convex_probability(mode: f64, distinct: &[f64]) -> Option<Vec<ProbabilityPoint>> {
    if !mode.is_finite() || mode < 0.0 {
        return None;
    }
    let split = mode.trunc() as usize;
    if split > distinct.len() {
        return None;
    }

    let probabilities = interpolate(0.0, 1.0, split)
        .into_iter()
        .chain(interpolate(5.0, 100.0, distinct.len() - split));

    Some(
        distinct
            .iter()
            .zip(probabilities)
            .map(|(&value, p)| ProbabilityPoint {
                value,
                probability: round2(p),
            })
            .collect(),
    )
}
