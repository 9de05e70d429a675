//! Ledger - schema-driven reconciliation of multi-source tabular records
//!
//! Rows from several sources are mapped onto the columns a schema declares,
//! computed columns are derived per row, filters select groups by the unique
//! column, and the selection is combined and totalled.
//!
//! # Features
//!
//! - JSON or YAML schema documents, shape-checked with JSON Schema
//! - Field names resolved to source headers by stem and synonym
//! - Per-column statistics (mean, median, mode, σ bands, convex probability)
//! - Row functions and arithmetic formulas with `DATE(...)` literals
//! - Truth-propagating group filters
//! - Weighted risk scoring against per-source statistics
//!
//! # Example
//!
//! ```no_run
//! use royalbit_ledger::config::EngineConfig;
//! use royalbit_ledger::core::{FunctionRegistry, Session};
//! use royalbit_ledger::ingest::read_csv;
//! use royalbit_ledger::parser::{parse_schema, validate_schema};
//! use std::path::Path;
//!
//! let schema = parse_schema(Path::new("sheet.json"))?;
//! validate_schema(&schema, &FunctionRegistry::with_builtins())?;
//!
//! let mut session = Session::new(schema, EngineConfig::default());
//! session.ingest("loan", read_csv("loan", Path::new("loans.csv"))?);
//! let errors = session.process("loan");
//!
//! let sheet = session.sheet();
//! println!("Groups: {}, errors: {}", sheet.groups.len(), errors.len());
//! # Ok::<(), royalbit_ledger::error::LedgerError>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod ingest;
pub mod parser;
pub mod types;
pub mod writer;

// Re-export commonly used types
pub use error::{CellError, ErrorList, LedgerError, LedgerResult};
pub use types::{CellValue, ColumnSpec, ColumnType, DataType, Row, Schema, SchemaDocument, SheetView};
