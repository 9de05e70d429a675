//! Schema document loading and validation
//!
//! A schema document is `{ sheetName?, columnsConfig: [...] }`, stored as JSON
//! or, for hand-written schemas, YAML. Loading checks the document's shape
//! against the embedded JSON Schema; [`validate_schema`] checks what a shape
//! check cannot (ids, references, cycles).

use crate::core::evaluator::{formula_references, parse_call, tokenizer, FunctionRegistry};
use crate::error::{LedgerError, LedgerResult};
use crate::types::{ColumnSpec, ColumnType, Schema};
use jsonschema::JSONSchema;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::HashMap;
use std::path::Path;

/// On-disk encoding of a schema document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    Json,
    Yaml,
}

impl SchemaFormat {
    /// `.yaml`/`.yml` are YAML; everything else is JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                SchemaFormat::Yaml
            }
            _ => SchemaFormat::Json,
        }
    }
}

/// Load a schema document from disk.
///
/// Columns declared without an `id` get one derived from their heading.
///
/// # Example
/// ```no_run
/// use royalbit_ledger::parser::parse_schema;
/// use std::path::Path;
///
/// let schema = parse_schema(Path::new("portfolio.json"))?;
/// println!("Columns: {}", schema.columns.len());
/// # Ok::<(), royalbit_ledger::error::LedgerError>(())
/// ```
pub fn parse_schema(path: &Path) -> LedgerResult<Schema> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content, SchemaFormat::from_path(path))
}

/// Parse schema document text
pub fn parse_schema_str(content: &str, format: SchemaFormat) -> LedgerResult<Schema> {
    let document: serde_json::Value = match format {
        SchemaFormat::Json => serde_json::from_str(content)?,
        SchemaFormat::Yaml => serde_yaml::from_str(content)?,
    };
    validate_against_schema(&document)?;

    let mut schema: Schema = serde_json::from_value(document)?;
    assign_ids(&mut schema);
    Ok(schema)
}

/// Validate a document against the embedded sheet JSON Schema
fn validate_against_schema(document: &serde_json::Value) -> LedgerResult<()> {
    let schema_str = include_str!("../../schema/sheet.schema.json");
    let schema_value: serde_json::Value = serde_json::from_str(schema_str)
        .map_err(|e| LedgerError::Validation(format!("Failed to parse schema: {}", e)))?;

    let compiled_schema = JSONSchema::compile(&schema_value)
        .map_err(|e| LedgerError::Validation(format!("Failed to compile schema: {}", e)))?;

    if let Err(errors) = compiled_schema.validate(document) {
        let error_messages: Vec<String> = errors
            .map(|e| format!("  - {} (at {})", e, e.instance_path))
            .collect();
        return Err(LedgerError::Validation(format!(
            "Schema document is malformed:\n{}",
            error_messages.join("\n")
        )));
    }

    Ok(())
}

fn assign_ids(schema: &mut Schema) {
    for col in &mut schema.columns {
        if col.id.trim().is_empty() {
            col.id = ColumnSpec::derive_id(&col.heading);
        }
    }
}

/// Check the rules a shape check cannot express.
///
/// - column ids are unique
/// - exactly one `unique` column
/// - every other `data` column names its source
/// - `function` columns call a registered function with declared ids as arguments
/// - `formula` columns use only declared ids, numbers, operators and `DATE(...)`
/// - computed columns do not reference each other in a cycle
///
/// All problems are reported together.
pub fn validate_schema(schema: &Schema, registry: &FunctionRegistry) -> LedgerResult<()> {
    let mut problems: Vec<String> = Vec::new();

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for col in &schema.columns {
        *seen.entry(col.id.as_str()).or_default() += 1;
    }
    let mut duplicates: Vec<&str> = seen
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(id, _)| *id)
        .collect();
    duplicates.sort_unstable();
    for id in duplicates {
        problems.push(format!("column id '{}' is declared more than once", id));
    }

    let unique_count = schema.columns.iter().filter(|c| c.is_unique()).count();
    if unique_count != 1 {
        problems.push(format!(
            "expected exactly one unique column, found {}",
            unique_count
        ));
    }

    for col in &schema.columns {
        match col.column_type {
            ColumnType::Data => {
                if !col.is_unique() && col.source_name.as_deref().map_or(true, str::is_empty) {
                    problems.push(format!("data column '{}' has no source_name", col.id));
                }
            }
            ColumnType::Function => check_function_column(col, schema, registry, &mut problems),
            ColumnType::Formula => check_formula_column(col, schema, &mut problems),
        }
    }

    if !problems.is_empty() {
        let messages: Vec<String> = problems.iter().map(|p| format!("  - {}", p)).collect();
        return Err(LedgerError::Validation(format!(
            "Schema is invalid:\n{}",
            messages.join("\n")
        )));
    }

    dependency_order(schema).map(|_| ())
}

fn check_function_column(
    col: &ColumnSpec,
    schema: &Schema,
    registry: &FunctionRegistry,
    problems: &mut Vec<String>,
) {
    let text = col.function.as_deref().unwrap_or_default();
    let Some(call) = parse_call(text) else {
        problems.push(format!(
            "function column '{}' must be a call like name(arg, ...), got '{}'",
            col.id, text
        ));
        return;
    };
    match registry.get(&call.name) {
        None => problems.push(format!(
            "function column '{}' calls unknown function '{}'",
            col.id, call.name
        )),
        Some(function) if function.params().len() != call.args.len() => {
            problems.push(format!(
                "function column '{}': {} takes {} argument(s), got {}",
                col.id,
                call.name,
                function.params().len(),
                call.args.len()
            ))
        }
        Some(_) => {}
    }
    for arg in &call.args {
        if schema.column(arg).is_none() {
            problems.push(format!(
                "function column '{}' references undeclared column '{}'",
                col.id, arg
            ));
        }
    }
}

fn check_formula_column(col: &ColumnSpec, schema: &Schema, problems: &mut Vec<String>) {
    let formula = col.formula.as_deref().unwrap_or_default();
    let mut probe = formula.to_string();
    for id in formula_references(formula, schema) {
        if let Ok(pattern) = regex::Regex::new(&format!(r"\b{}\b", regex::escape(id))) {
            probe = pattern.replace_all(&probe, "1").into_owned();
        }
    }
    if let Err(LedgerError::UnsafeExpression(_)) = tokenizer::tokenize(&probe) {
        problems.push(format!(
            "formula column '{}' uses names other than declared columns and DATE: '{}'",
            col.id, formula
        ));
    }
}

/// Ids a computed column reads
fn references<'a>(col: &'a ColumnSpec, schema: &'a Schema) -> Vec<&'a str> {
    match col.column_type {
        ColumnType::Data => Vec::new(),
        ColumnType::Function => col
            .function
            .as_deref()
            .and_then(parse_call)
            .map(|call| {
                call.args
                    .iter()
                    .filter_map(|arg| schema.column(arg).map(|c| c.id.as_str()))
                    .collect()
            })
            .unwrap_or_default(),
        ColumnType::Formula => {
            formula_references(col.formula.as_deref().unwrap_or_default(), schema)
        }
    }
}

/// Computed columns in an order where every column follows the columns it
/// reads. Fails when references form a cycle.
pub fn dependency_order(schema: &Schema) -> LedgerResult<Vec<String>> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut nodes = HashMap::new();
    for col in &schema.columns {
        nodes
            .entry(col.id.as_str())
            .or_insert_with(|| graph.add_node(col.id.as_str()));
    }

    for col in &schema.columns {
        let target = nodes[col.id.as_str()];
        for dep in references(col, schema) {
            if let Some(&source) = nodes.get(dep) {
                graph.add_edge(source, target, ());
            }
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| {
        let id = graph.node_weight(cycle.node_id()).copied().unwrap_or_default();
        LedgerError::CircularDependency(format!("column '{}' depends on itself", id))
    })?;

    Ok(order
        .into_iter()
        .filter_map(|idx| graph.node_weight(idx))
        .filter(|id| {
            schema
                .column(id)
                .is_some_and(|c| c.column_type != ColumnType::Data)
        })
        .map(|id| id.to_string())
        .collect())
}
