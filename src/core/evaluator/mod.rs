//! Computed-column evaluation
//!
//! Recalculation runs two passes over every row: `function` columns first,
//! then `formula` columns, so formulas can read function results. A failing
//! cell is set to null and recorded; evaluation of other cells continues.

pub mod functions;
pub mod parser;
pub mod tokenizer;

pub use functions::{Arg, FunctionContext, FunctionRegistry, ParamKind, RowFunction};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::coerce::best_effort_number;
use super::dates::{date_from_days, parse_date, to_iso};
use super::risk::RiskScorer;
use crate::error::{CellError, ErrorList, LedgerError, LedgerResult};
use crate::types::{CellValue, ColumnSpec, ColumnType, DataType, Row, Schema};

static CALL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\(([^)]*)\)$").expect("valid call pattern"));

/// A parsed `name(arg, ...)` call
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<String>,
}

/// Parse a function column's call text. Empty arguments are dropped, so
/// `f()` takes no arguments.
pub fn parse_call(text: &str) -> Option<FunctionCall> {
    let caps = CALL_SHAPE.captures(text.trim())?;
    Some(FunctionCall {
        name: caps[1].to_string(),
        args: caps[2]
            .split(',')
            .map(str::trim)
            .filter(|arg| !arg.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

/// Ids referenced by a formula: whole-word matches of declared column ids
pub fn formula_references<'a>(formula: &str, schema: &'a Schema) -> Vec<&'a str> {
    schema
        .ids()
        .filter(|id| whole_word(id).is_some_and(|re| re.is_match(formula)))
        .collect()
}

fn whole_word(id: &str) -> Option<Regex> {
    if id.is_empty() {
        return None;
    }
    Regex::new(&format!(r"\b{}\b", regex::escape(id))).ok()
}

/// Text substituted for one column reference, or `None` to leave the id in
/// place (which the tokenizer then rejects).
fn substitution(column: &ColumnSpec, value: &CellValue) -> Option<String> {
    if column.data_type == DataType::Date {
        if value.is_blank() {
            return None;
        }
        let parsed = match value {
            CellValue::Text(s) => parse_date(s),
            CellValue::Number(n) => date_from_days(*n),
            CellValue::Null => None,
        };
        return Some(match parsed {
            Some(date) => format!("DATE({})", to_iso(date)),
            None => "DATE(Invalid)".to_string(),
        });
    }
    if value.is_null() {
        return None;
    }
    Some(crate::types::format_number(best_effort_number(value)))
}

/// Replace every declared column id in `formula` with the row's value
pub fn substitute(formula: &str, row: &Row, schema: &Schema) -> String {
    let mut text = formula.to_string();
    for column in &schema.columns {
        let Some(pattern) = whole_word(&column.id) else {
            continue;
        };
        if let Some(replacement) = substitution(column, row.value(&column.id)) {
            text = pattern
                .replace_all(&text, regex::NoExpand(&replacement))
                .into_owned();
        }
    }
    text
}

/// Evaluate substituted formula text.
///
/// Only numbers, `+ - * /`, parentheses, whitespace and `DATE(...)` literals
/// are accepted. For a `date` column the result is read as a day offset from
/// the epoch and returned as `YYYY-MM-DD`, or as the raw number when no such
/// date exists.
pub fn safe_eval_formula(text: &str, data_type: DataType) -> LedgerResult<CellValue> {
    let tokens = tokenizer::tokenize(text)?;
    let expr = parser::Parser::new(tokens).parse()?;
    let value = parser::evaluate(&expr);
    if !value.is_finite() {
        return Err(LedgerError::NonFiniteResult(text.to_string()));
    }

    if data_type == DataType::Date {
        if let Some(date) = date_from_days(value) {
            return Ok(CellValue::Text(to_iso(date)));
        }
    }
    Ok(CellValue::Number(value))
}

/// Inputs to a recalculation besides rows and schema
pub struct Recalc<'a> {
    pub schema: &'a Schema,
    pub registry: &'a FunctionRegistry,
    pub as_of: NaiveDate,
    pub risk: RiskScorer<'a>,
    /// Record formula failures in the returned list
    pub report_formula_errors: bool,
}

impl<'a> Recalc<'a> {
    /// Run both passes over `rows`
    pub fn run(&self, rows: &mut [Row]) -> ErrorList {
        let mut errors = ErrorList::new();

        let function_columns: Vec<&ColumnSpec> = self
            .schema
            .columns_of_type(ColumnType::Function)
            .filter(|col| col.function.is_some())
            .collect();
        for (index, row) in rows.iter_mut().enumerate() {
            for col in &function_columns {
                self.function_cell(index, row, col, &mut errors);
            }
        }

        let formula_columns: Vec<&ColumnSpec> = self
            .schema
            .columns_of_type(ColumnType::Formula)
            .filter(|col| col.formula.is_some())
            .collect();
        for (index, row) in rows.iter_mut().enumerate() {
            for col in &formula_columns {
                self.formula_cell(index, row, col, &mut errors);
            }
        }

        debug!(
            rows = rows.len(),
            functions = function_columns.len(),
            formulas = formula_columns.len(),
            errors = errors.len(),
            "recalculated"
        );
        errors
    }

    fn function_cell(&self, index: usize, row: &mut Row, col: &ColumnSpec, errors: &mut ErrorList) {
        let text = col.function.as_deref().unwrap_or_default();
        let Some(call) = parse_call(text) else {
            warn!(column = %col.id, function = text, "function column is not a call, skipped");
            return;
        };

        let result = match self.registry.get(&call.name) {
            Some(function) => {
                let args: Vec<Arg> = call
                    .args
                    .iter()
                    .zip(function.params().iter().chain(std::iter::repeat(&ParamKind::Number)))
                    .map(|(arg, kind)| Arg::coerce(*kind, row.value(arg)))
                    .collect();
                let ctx = FunctionContext {
                    source: row.source.as_deref(),
                    as_of: self.as_of,
                    risk: self.risk,
                };
                self.registry.call(&call.name, &ctx, &args)
            }
            None => Err(LedgerError::FunctionNotFound(call.name.clone())),
        };

        match result {
            Ok(value) => row.set(col.id.as_str(), value),
            Err(err) => {
                debug!(row = index + 1, column = %col.id, error = %err, "function failed");
                row.set(col.id.as_str(), CellValue::Null);
                errors.push(CellError::new(index, &col.id, &col.heading, &err));
            }
        }
    }

    fn formula_cell(&self, index: usize, row: &mut Row, col: &ColumnSpec, errors: &mut ErrorList) {
        let formula = col.formula.as_deref().unwrap_or_default();
        let text = substitute(formula, row, self.schema);
        match safe_eval_formula(&text, col.data_type) {
            Ok(value) => row.set(col.id.as_str(), value),
            Err(err) => {
                debug!(row = index + 1, column = %col.id, error = %err, "formula failed");
                row.set(col.id.as_str(), CellValue::Null);
                if self.report_formula_errors {
                    errors.push(CellError::new(index, &col.id, &col.heading, &err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::core::risk::RiskProfiles;
    use crate::error::CellErrorKind;

    fn loan_schema() -> Schema {
        Schema::new(vec![
            ColumnSpec::new("Portfolio", "portfolio", ColumnType::Data, DataType::Unique),
            ColumnSpec::new("Principal", "principal", ColumnType::Data, DataType::Currency)
                .with_source("loan"),
            ColumnSpec::new("Rate", "rate", ColumnType::Data, DataType::Rate).with_source("loan"),
            ColumnSpec::new("Maturity", "maturity", ColumnType::Data, DataType::Date)
                .with_source("loan"),
            ColumnSpec::new("Interest", "interest", ColumnType::Function, DataType::Currency)
                .with_function("interestIncome(principal, rate)"),
            ColumnSpec::new("Monthly", "monthly", ColumnType::Formula, DataType::Currency)
                .with_formula("interest / 12"),
            ColumnSpec::new("Grace End", "grace", ColumnType::Formula, DataType::Date)
                .with_formula("maturity + 30"),
        ])
    }

    fn run(schema: &Schema, rows: &mut [Row], report: bool) -> ErrorList {
        let registry = FunctionRegistry::with_builtins();
        let profiles = RiskProfiles::new();
        let config = RiskConfig::default();
        Recalc {
            schema,
            registry: &registry,
            as_of: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
            risk: RiskScorer::new(&profiles, &config),
            report_formula_errors: report,
        }
        .run(rows)
    }

    #[test]
    fn test_parse_call() {
        assert_eq!(
            parse_call("interestIncome(principal, rate)"),
            Some(FunctionCall {
                name: "interestIncome".to_string(),
                args: vec!["principal".to_string(), "rate".to_string()],
            })
        );
        assert_eq!(parse_call("now()").map(|c| c.args.len()), Some(0));
        assert_eq!(parse_call("now( , )").map(|c| c.args.len()), Some(0));
        assert_eq!(parse_call("not a call"), None);
    }

    #[test]
    fn test_safe_eval_date_difference() {
        assert_eq!(
            safe_eval_formula("DATE(2024-01-01) - DATE(2023-01-01)", DataType::Integer).unwrap(),
            CellValue::Number(365.0)
        );
    }

    #[test]
    fn test_safe_eval_date_result_and_rejections() {
        assert_eq!(
            safe_eval_formula("DATE(2024-01-01) + 31", DataType::Date).unwrap(),
            CellValue::text("2024-02-01")
        );
        for text in ["1; 2", "alert(1)", "1 = 1", "x + 1"] {
            assert!(matches!(
                safe_eval_formula(text, DataType::Float),
                Err(LedgerError::UnsafeExpression(_))
            ));
        }
        assert!(matches!(
            safe_eval_formula("1 / 0", DataType::Float),
            Err(LedgerError::NonFiniteResult(_))
        ));
    }

    #[test]
    fn test_substitute_dates_numbers_and_missing() {
        let schema = loan_schema();
        let row = Row::from_pairs(
            Some("loan"),
            [("principal", "1,000"), ("maturity", "09/28/2037")],
        );
        assert_eq!(substitute("principal * 2", &row, &schema), "1 * 2");
        assert_eq!(substitute("maturity + 30", &row, &schema), "DATE(2037-09-28) + 30");
        // Absent reference stays as the id
        assert_eq!(substitute("rate * 2", &row, &schema), "rate * 2");

        let bad = Row::from_pairs(Some("loan"), [("maturity", "someday")]);
        assert_eq!(substitute("maturity", &bad, &schema), "DATE(Invalid)");
    }

    #[test]
    fn test_recalc_functions_before_formulas() {
        let schema = loan_schema();
        let mut rows = vec![Row::from_pairs(
            Some("loan"),
            [
                ("portfolio", "A"),
                ("principal", "1200"),
                ("rate", "0.05"),
                ("maturity", "2030-01-01"),
            ],
        )];
        let errors = run(&schema, &mut rows, true);

        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(rows[0].value("interest"), &CellValue::Number(60.0));
        assert_eq!(rows[0].value("monthly"), &CellValue::Number(5.0));
        assert_eq!(rows[0].value("grace"), &CellValue::text("2030-01-31"));
    }

    #[test]
    fn test_function_failures_are_always_reported() {
        let mut schema = loan_schema();
        schema.columns.push(
            ColumnSpec::new("Mystery", "mystery", ColumnType::Function, DataType::Float)
                .with_function("mystery(principal)"),
        );
        let mut rows = vec![
            Row::from_pairs(Some("loan"), [("principal", "1")]),
            Row::from_pairs(Some("loan"), [("principal", "2")]),
        ];
        let errors = run(&schema, &mut rows, false);

        let mystery: Vec<&CellError> = errors.iter().filter(|e| e.column_id == "mystery").collect();
        assert_eq!(mystery.len(), 2);
        assert_eq!(mystery[1].row_index, 2);
        assert_eq!(mystery[0].kind, CellErrorKind::FunctionNotFound);
        assert_eq!(
            mystery[0].to_string(),
            "Row 1, column \"Mystery\": Function \"mystery\" not found."
        );
        assert_eq!(rows[0].value("mystery"), &CellValue::Null);
    }

    #[test]
    fn test_formula_failures_follow_reporting_policy() {
        let schema = loan_schema();
        // No maturity: `maturity + 30` keeps the id and is rejected
        let mut rows = vec![Row::from_pairs(
            Some("loan"),
            [("principal", "100"), ("rate", "0.1")],
        )];
        let quiet = run(&schema, &mut rows, false);
        assert!(quiet.is_empty());
        assert_eq!(rows[0].value("grace"), &CellValue::Null);

        let loud = run(&schema, &mut rows, true);
        assert_eq!(loud.len(), 1);
        assert_eq!(loud[0].kind, CellErrorKind::UnsafeExpression);
    }
}
