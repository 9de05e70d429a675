//! Schema export and sheet rendering

use crate::core::coerce::{parse_float_value, parse_int_value, strict_number};
use crate::error::LedgerResult;
use crate::parser::SchemaFormat;
use crate::types::{CellValue, DataType, Group, Row, Schema, SheetView};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Write a schema document, as YAML for `.yaml`/`.yml` paths and pretty JSON
/// otherwise. Reloading the file yields the same columns in the same order.
pub fn write_schema(schema: &Schema, path: &Path) -> LedgerResult<()> {
    let content = match SchemaFormat::from_path(path) {
        SchemaFormat::Yaml => serde_yaml::to_string(schema)?,
        SchemaFormat::Json => {
            let mut json = serde_json::to_string_pretty(schema)?;
            json.push('\n');
            json
        }
    };
    fs::write(path, content)?;
    Ok(())
}

//==============================================================================
// Display formatting
//==============================================================================

/// Insert thousands separators into the integer part of a formatted number
fn group_thousands(formatted: &str) -> String {
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted, None),
    };
    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }
    match frac_part {
        Some(f) => format!("{}.{}", grouped, f),
        None => grouped,
    }
}

/// `$1,234.50`, with a leading minus for negatives
pub fn format_currency(n: f64) -> String {
    let body = group_thousands(&format!("{:.2}", n.abs()));
    if n < 0.0 && body != "0.00" {
        format!("-${}", body)
    } else {
        format!("${}", body)
    }
}

/// Display form of a cell for a column of `data_type`. Null and blank cells
/// render empty; cells that do not read as numbers render as-is.
pub fn format_value(value: &CellValue, data_type: DataType) -> String {
    if value.is_blank() {
        return String::new();
    }
    let formatted = match data_type {
        DataType::Currency => {
            let n = strict_number(value);
            (!n.is_nan()).then(|| format_currency(n))
        }
        DataType::Rate => parse_float_value(value).map(|n| format!("{:.2}%", n * 100.0)),
        DataType::Integer => parse_int_value(value).map(|n| format!("{}", n as i64)),
        DataType::Float => parse_float_value(value).map(|n| format!("{:.2}", n)),
        DataType::Unique | DataType::Strings | DataType::Date => None,
    };
    formatted.unwrap_or_else(|| value.as_text())
}

//==============================================================================
// Sheet reports
//==============================================================================

/// A row restricted to the schema's columns, in declaration order
fn project(row: &Row, schema: &Schema) -> Row {
    let mut projected = Row::new(row.source.clone());
    for col in &schema.columns {
        projected.set(col.id.as_str(), row.value(&col.id).clone());
    }
    projected
}

#[derive(Serialize)]
struct GroupReport {
    key: CellValue,
    combined: Row,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sub_rows: Vec<Row>,
}

#[derive(Serialize)]
struct SheetReport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    sheet_name: Option<&'a str>,
    groups: Vec<GroupReport>,
    totals: Row,
}

fn report<'a>(view: &SheetView, schema: &'a Schema) -> SheetReport<'a> {
    SheetReport {
        sheet_name: schema.sheet_name.as_deref(),
        groups: view
            .groups
            .iter()
            .map(|g: &Group| GroupReport {
                key: g.key.clone(),
                combined: project(&g.combined, schema),
                sub_rows: g.sub_rows.iter().map(|r| project(r, schema)).collect(),
            })
            .collect(),
        totals: project(&view.totals, schema),
    }
}

pub fn render_json(view: &SheetView, schema: &Schema) -> LedgerResult<String> {
    Ok(serde_json::to_string_pretty(&report(view, schema))?)
}

pub fn render_yaml(view: &SheetView, schema: &Schema) -> LedgerResult<String> {
    Ok(serde_yaml::to_string(&report(view, schema))?)
}

/// Top-level rows plus the totals row, headed by column headings, every
/// cell quoted
pub fn render_csv(view: &SheetView, schema: &Schema) -> LedgerResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(schema.columns.iter().map(|c| c.heading.as_str()))?;
    for row in view.groups.iter().map(|g| &g.combined).chain(std::iter::once(&view.totals)) {
        writer.write_record(schema.columns.iter().map(|c| row.value(&c.id).as_text()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| crate::error::LedgerError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Terminal table: numbered combined rows, their sub-rows as `n.m`, then totals
pub fn render_table(view: &SheetView, schema: &Schema) -> String {
    let mut lines: Vec<(String, Vec<String>, RowStyle)> = Vec::new();

    for (idx, group) in view.groups.iter().enumerate() {
        let number = idx + 1;
        lines.push((number.to_string(), formatted_cells(&group.combined, schema), RowStyle::Combined));
        for (sub_idx, sub) in group.sub_rows.iter().enumerate() {
            lines.push((
                format!("{}.{}", number, sub_idx + 1),
                formatted_cells(sub, schema),
                RowStyle::Sub,
            ));
        }
    }
    lines.push((String::new(), formatted_cells(&view.totals, schema), RowStyle::Totals));

    let headings: Vec<&str> = schema.columns.iter().map(|c| c.heading.as_str()).collect();
    let label_width = lines
        .iter()
        .map(|(label, _, _)| label.len())
        .max()
        .unwrap_or(0)
        .max("Row".len());
    let widths: Vec<usize> = headings
        .iter()
        .enumerate()
        .map(|(i, h)| {
            lines
                .iter()
                .map(|(_, cells, _)| cells[i].chars().count())
                .max()
                .unwrap_or(0)
                .max(h.chars().count())
        })
        .collect();

    let mut out = String::new();
    let header: Vec<String> = headings
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{:<w$}", h, w = w))
        .collect();
    out.push_str(&format!(
        "{}\n",
        format!("{:<lw$}  {}", "Row", header.join("  "), lw = label_width).bold()
    ));

    for (label, cells, style) in &lines {
        let body: Vec<String> = cells
            .iter()
            .zip(&widths)
            .zip(&schema.columns)
            .map(|((cell, w), col)| align(cell, *w, col.data_type))
            .collect();
        let line = format!("{:<lw$}  {}", label, body.join("  "), lw = label_width);
        let styled = match style {
            RowStyle::Combined => line.normal(),
            RowStyle::Sub => line.dimmed(),
            RowStyle::Totals => line.bold().green(),
        };
        out.push_str(&format!("{}\n", styled));
    }
    out
}

enum RowStyle {
    Combined,
    Sub,
    Totals,
}

fn formatted_cells(row: &Row, schema: &Schema) -> Vec<String> {
    schema
        .columns
        .iter()
        .map(|c| format_value(row.value(&c.id), c.data_type))
        .collect()
}

fn align(cell: &str, width: usize, data_type: DataType) -> String {
    match data_type {
        DataType::Currency | DataType::Rate | DataType::Integer | DataType::Float => {
            format!("{:>w$}", cell, w = width)
        }
        _ => format!("{:<w$}", cell, w = width),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_schema;
    use crate::types::{ColumnSpec, ColumnType};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_format_values_by_type() {
        assert_eq!(format_value(&CellValue::text("1234.5"), DataType::Currency), "$1,234.50");
        assert_eq!(format_value(&CellValue::Number(-1234567.0), DataType::Currency), "-$1,234,567.00");
        assert_eq!(format_value(&CellValue::Number(0.05), DataType::Rate), "5.00%");
        assert_eq!(format_value(&CellValue::text("20.9"), DataType::Integer), "20");
        assert_eq!(format_value(&CellValue::Number(2.0 / 3.0), DataType::Float), "0.67");
        assert_eq!(format_value(&CellValue::text("2030-01-01"), DataType::Date), "2030-01-01");
        assert_eq!(format_value(&CellValue::Null, DataType::Currency), "");
        assert_eq!(format_value(&CellValue::text("n/a"), DataType::Currency), "n/a");
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands("1234567.89"), "1,234,567.89");
        assert_eq!(group_thousands("999"), "999");
        assert_eq!(group_thousands("1000"), "1,000");
    }

    fn schema() -> Schema {
        let mut schema = Schema::new(vec![
            ColumnSpec::new("Portfolio", "portfolio", ColumnType::Data, DataType::Unique),
            ColumnSpec::new("Principal", "principal", ColumnType::Data, DataType::Currency)
                .with_source("loan")
                .with_filter("> 100"),
            ColumnSpec::new("Interest", "interest", ColumnType::Function, DataType::Currency)
                .with_function("interestIncome(principal, rate)"),
        ]);
        schema.sheet_name = Some("Loans".to_string());
        schema
    }

    #[test]
    fn test_schema_round_trip_json_and_yaml() {
        let dir = TempDir::new().unwrap();
        for name in ["sheet.json", "sheet.yaml"] {
            let path = dir.path().join(name);
            write_schema(&schema(), &path).unwrap();
            let reloaded = parse_schema(&path).unwrap();
            assert_eq!(reloaded, schema());
        }
    }

    fn view() -> SheetView {
        let a = Row::from_pairs(Some("loan"), [("portfolio", "A"), ("principal", "150")]);
        let b = Row::from_pairs(Some("loan"), [("portfolio", "B"), ("principal", "200")]);
        let totals = Row::from_pairs(None, [("principal", CellValue::Number(350.0))]);
        SheetView {
            groups: vec![
                Group {
                    key: CellValue::text("A"),
                    combined: a,
                    sub_rows: Vec::new(),
                },
                Group {
                    key: CellValue::text("B"),
                    combined: b,
                    sub_rows: Vec::new(),
                },
            ],
            totals,
        }
    }

    #[test]
    fn test_render_csv_quotes_every_cell() {
        let csv = render_csv(&view(), &schema()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], r#""Portfolio","Principal","Interest""#);
        assert_eq!(lines[1], r#""A","150","""#);
        assert_eq!(lines[3], r#""","350","""#);
    }

    #[test]
    fn test_render_json_projects_schema_columns() {
        let json = render_json(&view(), &schema()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["sheet_name"], "Loans");
        assert_eq!(value["groups"][0]["combined"]["principal"], "150");
        assert_eq!(value["groups"][0]["combined"]["__source"], "loan");
        assert!(value["groups"][0]["combined"]["interest"].is_null());
        assert_eq!(value["totals"]["principal"], 350.0);
    }

    #[test]
    fn test_render_table_lists_rows_and_totals() {
        colored::control::set_override(false);
        let table = render_table(&view(), &schema());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Row"));
        assert!(lines[1].contains("$150.00"));
        assert!(lines[3].contains("$350.00"));
    }
}
