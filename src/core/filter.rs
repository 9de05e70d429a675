//! Filter literal compilation
//!
//! A column filter is one of four literal forms, tried in order:
//!
//! | Form            | Example        | Meaning                                   |
//! |-----------------|----------------|-------------------------------------------|
//! | double brace    | `{{20}}`       | loose equality; marks a group filter      |
//! | JSON array      | `[20, 23]`     | membership, numeric first                 |
//! | comparison      | `>= 2024-01-01`| `> < >= <= == !=`, date-aware on dates    |
//! | anything else   | `20`           | loose equality with the literal           |
//!
//! Equality follows loose scripting semantics: a number equals text that reads
//! as the same number, null equals nothing, and blank text reads as zero.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use tracing::warn;

use super::coerce::strict_number_str;
use super::dates::parse_date;
use crate::error::LedgerError;
use crate::types::{CellValue, DataType, Schema};

static COMPARISON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(>=|<=|>|<|==|!=)\s*(.+)$").expect("valid comparison pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            ">" => CompareOp::Gt,
            "<" => CompareOp::Lt,
            ">=" => CompareOp::Ge,
            "<=" => CompareOp::Le,
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            _ => return None,
        })
    }

    fn holds(&self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (CompareOp::Ne, Some(Ordering::Equal)) => false,
            (CompareOp::Ne, _) => true,
            (_, None) => false,
            (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
            (CompareOp::Lt, Some(o)) => o == Ordering::Less,
            (CompareOp::Ge, Some(o)) => o != Ordering::Less,
            (CompareOp::Le, Some(o)) => o != Ordering::Greater,
            (CompareOp::Eq, Some(o)) => o == Ordering::Equal,
        }
    }
}

/// Comparison operand: a number, or text that does not read as one
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Number(f64),
    Text(String),
}

impl Operand {
    /// Numeric reading of a cell when it has one, the raw text otherwise.
    /// Null reads as 0.
    fn of_cell(value: &CellValue) -> Self {
        match value {
            CellValue::Null => Operand::Number(0.0),
            CellValue::Number(n) => Operand::Number(*n),
            CellValue::Text(s) => Operand::of_text(s),
        }
    }

    fn of_text(s: &str) -> Self {
        let n = strict_number_str(s);
        if n.is_nan() {
            Operand::Text(s.to_string())
        } else {
            Operand::Number(n)
        }
    }

    /// Ordering between two operands; a number never orders against
    /// non-numeric text
    fn compare(&self, other: &Operand) -> Option<Ordering> {
        match (self, other) {
            (Operand::Number(a), Operand::Number(b)) => a.partial_cmp(b),
            (Operand::Text(a), Operand::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Literal compared by loose equality
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

impl Literal {
    fn loosely_equals(&self, value: &CellValue) -> bool {
        match (self, value) {
            (_, CellValue::Null) => false,
            (Literal::Number(n), CellValue::Number(v)) => v == n,
            (Literal::Number(n), CellValue::Text(s)) => strict_number_str(s) == *n,
            (Literal::Text(t), CellValue::Text(s)) => s == t,
            (Literal::Text(t), CellValue::Number(v)) => strict_number_str(t) == *v,
        }
    }
}

/// A compiled filter
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Literal),
    OneOf(Vec<Value>),
    Compare {
        op: CompareOp,
        operand: String,
        dates: bool,
    },
    /// A literal that failed to compile; matches nothing
    Never,
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// True for the double-brace form, which selects group semantics
pub fn is_group_filter(filter: &str) -> bool {
    let trimmed = filter.trim();
    trimmed.starts_with("{{") && trimmed.ends_with("}}")
}

/// Compile a filter literal for a column of `data_type`
pub fn create_condition(filter: &str, data_type: DataType) -> Condition {
    let filter = filter.trim();

    if is_group_filter(filter) {
        let inner = filter[2..filter.len() - 2].trim();
        let n = strict_number_str(inner);
        return Condition::Equals(if n.is_nan() {
            Literal::Text(strip_quotes(inner).to_string())
        } else {
            Literal::Number(n)
        });
    }

    if filter.starts_with('[') && filter.ends_with(']') {
        return match serde_json::from_str::<Vec<Value>>(filter) {
            Ok(allowed) => Condition::OneOf(allowed),
            Err(err) => {
                let err = LedgerError::MalformedFilterLiteral {
                    filter: filter.to_string(),
                    message: err.to_string(),
                };
                warn!(error = %err, "filter matches nothing");
                Condition::Never
            }
        };
    }

    if let Some(caps) = COMPARISON.captures(filter) {
        if let Some(op) = CompareOp::parse(&caps[1]) {
            return Condition::Compare {
                op,
                operand: strip_quotes(caps[2].trim()).to_string(),
                dates: data_type == DataType::Date,
            };
        }
    }

    let n = strict_number_str(filter);
    Condition::Equals(if n.is_nan() {
        Literal::Text(filter.to_string())
    } else {
        Literal::Number(n)
    })
}

/// Numeric reading of a JSON array item
fn json_number(item: &Value) -> f64 {
    match item {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => strict_number_str(s),
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

impl Condition {
    pub fn matches(&self, value: &CellValue) -> bool {
        match self {
            Condition::Never => false,
            Condition::Equals(literal) => literal.loosely_equals(value),
            Condition::OneOf(allowed) => {
                let numeric = match value {
                    CellValue::Null => 0.0,
                    CellValue::Number(n) => *n,
                    CellValue::Text(s) => strict_number_str(s),
                };
                if !numeric.is_nan() {
                    return allowed.iter().any(|item| json_number(item) == numeric);
                }
                match value {
                    CellValue::Text(s) => allowed.iter().any(|item| item.as_str() == Some(s)),
                    _ => false,
                }
            }
            Condition::Compare { op, operand, dates } => {
                if *dates {
                    let row_date = value.as_str().and_then(parse_date);
                    if let (Some(row_date), Some(cmp_date)) = (row_date, parse_date(operand)) {
                        return op.holds(Some(row_date.cmp(&cmp_date)));
                    }
                }
                let lhs = Operand::of_cell(value);
                let rhs = Operand::of_text(operand);
                op.holds(lhs.compare(&rhs))
            }
        }
    }
}

/// A compiled column filter, scoped to the column's source when it has one
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFilter {
    pub column_id: String,
    pub source: Option<String>,
    pub condition: Condition,
}

impl ColumnFilter {
    /// Whether this filter says anything about rows from `source`
    pub fn applies_to(&self, source: Option<&str>) -> bool {
        match &self.source {
            Some(own) => source == Some(own.as_str()),
            None => true,
        }
    }
}

/// Filters of a schema, split into group filters and row filters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilters {
    pub group: Vec<ColumnFilter>,
    pub row: Vec<ColumnFilter>,
}

impl CompiledFilters {
    pub fn compile(schema: &Schema) -> Self {
        let mut compiled = Self::default();
        for col in &schema.columns {
            let Some(filter) = col.filter.as_deref().filter(|f| !f.trim().is_empty()) else {
                continue;
            };
            let compiled_filter = ColumnFilter {
                column_id: col.id.clone(),
                source: col.source_name.clone(),
                condition: create_condition(filter, col.data_type),
            };
            if is_group_filter(filter) {
                compiled.group.push(compiled_filter);
            } else {
                compiled.row.push(compiled_filter);
            }
        }
        compiled
    }
}
