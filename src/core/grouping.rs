//! Row selection, grouping by the unique column, and aggregation

use tracing::{debug, warn};

use super::coerce::{best_effort_number, parse_float_value, parse_int_value};
use super::filter::{ColumnFilter, CompiledFilters};
use crate::types::{format_number, CellValue, DataType, Group, Row, Schema, SheetView};

/// Grouping key of a unique-column value. Null and blank text stay distinct.
fn group_key(value: &CellValue) -> String {
    match value {
        CellValue::Null => "null".to_string(),
        CellValue::Number(n) => format_number(*n),
        CellValue::Text(s) => s.clone(),
    }
}

/// Partition rows by the value of `key_column`, preserving first appearance order
fn partition<'a>(rows: impl IntoIterator<Item = &'a Row>, key_column: &str) -> Vec<Vec<&'a Row>> {
    let mut keys: Vec<String> = Vec::new();
    let mut groups: Vec<Vec<&'a Row>> = Vec::new();
    for row in rows {
        let key = group_key(row.value(key_column));
        match keys.iter().position(|k| *k == key) {
            Some(idx) => groups[idx].push(row),
            None => {
                keys.push(key);
                groups.push(vec![row]);
            }
        }
    }
    groups
}

fn satisfies(filter: &ColumnFilter, row: &Row) -> bool {
    filter.condition.matches(row.value(&filter.column_id))
}

/// Select rows with truth-propagating group filters.
///
/// A group of rows sharing the unique value qualifies when every group filter
/// is satisfied by at least one member from the filter's source. From a
/// qualifying group, only the rows passing every applicable row filter are
/// kept; a row filter scoped to another source does not apply.
pub fn select<'a>(rows: &'a [Row], schema: &Schema) -> Vec<&'a Row> {
    let Some(unique) = schema.unique_column() else {
        warn!("schema has no unique column, nothing selected");
        return Vec::new();
    };
    let filters = CompiledFilters::compile(schema);

    let selected: Vec<&Row> = partition(rows, &unique.id)
        .into_iter()
        .filter(|group| {
            filters.group.iter().all(|filter| {
                group
                    .iter()
                    .any(|row| filter.applies_to(row.source.as_deref()) && satisfies(filter, row))
            })
        })
        .flatten()
        .filter(|row| {
            filters
                .row
                .iter()
                .all(|filter| !filter.applies_to(row.source.as_deref()) || satisfies(filter, row))
        })
        .collect();

    debug!(
        rows = rows.len(),
        selected = selected.len(),
        group_filters = filters.group.len(),
        row_filters = filters.row.len(),
        "selected rows"
    );
    selected
}

/// Most frequent value; the first value to reach the top count wins ties
pub fn mode(values: &[f64]) -> Option<f64> {
    let mut counts: Vec<(f64, usize)> = Vec::new();
    let mut best: Option<(f64, usize)> = None;
    for &v in values {
        let count = match counts.iter_mut().find(|(seen, _)| *seen == v) {
            Some((_, n)) => {
                *n += 1;
                *n
            }
            None => {
                counts.push((v, 1));
                1
            }
        };
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((v, count));
        }
    }
    best.map(|(v, _)| v)
}

/// Aggregate several rows into one, column by column by declared data type
pub fn combine_rows(rows: &[&Row], schema: &Schema) -> Row {
    let mut combined = Row::new(None);
    for col in &schema.columns {
        let values: Vec<&CellValue> = rows.iter().map(|row| row.value(&col.id)).collect();
        let first = || values.first().map(|v| (*v).clone()).unwrap_or_default();

        let value = match col.data_type {
            DataType::Currency | DataType::Float => {
                CellValue::Number(values.iter().map(|v| best_effort_number(v)).sum())
            }
            DataType::Rate => {
                let nums: Vec<f64> = values.iter().filter_map(|v| parse_float_value(v)).collect();
                if nums.is_empty() {
                    CellValue::Number(0.0)
                } else {
                    CellValue::Number(nums.iter().sum::<f64>() / nums.len() as f64)
                }
            }
            DataType::Integer => {
                let ints: Vec<f64> = values.iter().filter_map(|v| parse_int_value(v)).collect();
                mode(&ints).map(CellValue::Number).unwrap_or_default()
            }
            DataType::Strings => CellValue::Text(
                values
                    .iter()
                    .map(|v| v.as_text())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            // Unique keys, dates and any other type keep the first value
            DataType::Unique | DataType::Date => first(),
        };
        combined.set(col.id.as_str(), value);
    }
    combined
}

/// Group selected rows by the unique column. Singletons carry the row itself
/// and no sub-rows; without a unique column every row is a singleton.
pub fn group(selected: &[&Row], schema: &Schema) -> Vec<Group> {
    let Some(unique) = schema.unique_column() else {
        return selected
            .iter()
            .map(|row| Group {
                key: CellValue::Null,
                combined: (*row).clone(),
                sub_rows: Vec::new(),
            })
            .collect();
    };

    partition(selected.iter().copied(), &unique.id)
        .into_iter()
        .map(|members| {
            let key = members[0].value(&unique.id).clone();
            if members.len() == 1 {
                Group {
                    key,
                    combined: members[0].clone(),
                    sub_rows: Vec::new(),
                }
            } else {
                Group {
                    key,
                    combined: combine_rows(&members, schema),
                    sub_rows: members.into_iter().cloned().collect(),
                }
            }
        })
        .collect()
}

/// Whole-sheet totals over the combined row of every group.
///
/// Currency and float columns sum, rate columns average their numeric
/// values, integer columns take the mode; every other column is blank, as is
/// a rate or integer column without numeric values.
pub fn compute_totals(groups: &[Group], schema: &Schema) -> Row {
    let mut totals = Row::new(None);
    for col in &schema.columns {
        let values = groups.iter().map(|g| g.combined.value(&col.id));
        let total = match col.data_type {
            DataType::Currency | DataType::Float => {
                CellValue::Number(values.map(best_effort_number).sum())
            }
            DataType::Rate => {
                let nums: Vec<f64> = values.filter_map(parse_float_value).collect();
                if nums.is_empty() {
                    CellValue::Null
                } else {
                    CellValue::Number(nums.iter().sum::<f64>() / nums.len() as f64)
                }
            }
            DataType::Integer => {
                let ints: Vec<f64> = values.filter_map(parse_int_value).collect();
                mode(&ints).map(CellValue::Number).unwrap_or_default()
            }
            DataType::Unique | DataType::Strings | DataType::Date => CellValue::Null,
        };
        totals.set(col.id.as_str(), total);
    }
    totals
}

/// Select, group and total in one step. Without a unique column the rows are
/// shown unfiltered, one group each.
pub fn build_sheet(rows: &[Row], schema: &Schema) -> SheetView {
    let selected: Vec<&Row> = if schema.unique_column().is_some() {
        select(rows, schema)
    } else {
        rows.iter().collect()
    };
    let groups = group(&selected, schema);
    let totals = compute_totals(&groups, schema);
    SheetView { groups, totals }
}
