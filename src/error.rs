use serde::Serialize;
use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Unsafe characters detected in formula: {0}")]
    UnsafeExpression(String),

    #[error("Formula syntax error at position {position}: {message}")]
    FormulaSyntax { message: String, position: usize },

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Formula result is not a finite number: {0}")]
    NonFiniteResult(String),

    #[error("Function \"{0}\" not found.")]
    FunctionNotFound(String),

    #[error("{function}: {message}")]
    FunctionRuntime { function: String, message: String },

    #[error("Malformed filter literal '{filter}': {message}")]
    MalformedFilterLiteral { filter: String, message: String },

    #[error("Cannot resolve field '{field}' among the statistics of source '{source_key}'")]
    UnresolvedFieldName { field: String, source_key: String },
}

impl LedgerError {
    pub fn runtime(function: impl Into<String>, message: impl Into<String>) -> Self {
        LedgerError::FunctionRuntime {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Classification used when the error is recorded against a single cell.
    pub fn kind(&self) -> CellErrorKind {
        match self {
            LedgerError::UnsafeExpression(_) => CellErrorKind::UnsafeExpression,
            LedgerError::FunctionNotFound(_) => CellErrorKind::FunctionNotFound,
            LedgerError::FunctionRuntime { .. } => CellErrorKind::FunctionRuntimeError,
            LedgerError::UnresolvedFieldName { .. } => CellErrorKind::UnresolvedFieldName,
            LedgerError::MalformedFilterLiteral { .. } => CellErrorKind::MalformedFilterLiteral,
            _ => CellErrorKind::EvaluationError,
        }
    }
}

/// Kind of a per-cell failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellErrorKind {
    UnsafeExpression,
    FunctionNotFound,
    FunctionRuntimeError,
    MalformedFilterLiteral,
    UnresolvedFieldName,
    EvaluationError,
}

/// A failure recorded against one cell. Processing of other cells continues.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellError {
    /// 1-based, as displayed to the user
    pub row_index: usize,
    pub column_id: String,
    pub column_heading: String,
    pub kind: CellErrorKind,
    pub message: String,
}

impl CellError {
    pub fn new(row: usize, column_id: &str, column_heading: &str, error: &LedgerError) -> Self {
        Self {
            row_index: row + 1,
            column_id: column_id.to_string(),
            column_heading: column_heading.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for CellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Row {}, column \"{}\": {}",
            self.row_index, self.column_heading, self.message
        )
    }
}

/// Ordered error channel surfaced to the caller
pub type ErrorList = Vec<CellError>;
