//! Working session: the row set, schema, statistics cache and risk profiles
//!
//! All state is owned here and changed only through the methods below, one
//! call at a time. Loading a new schema discards everything derived from the
//! previous one.

use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use tracing::{debug, info};

use super::evaluator::{FunctionRegistry, Recalc};
use super::mapper::map_columns;
use super::risk::{build_profile, RiskProfile, RiskProfiles, RiskScorer, UnresolvedSignal};
use super::statistics::{compute_statistics, StatisticsTable};
use crate::config::EngineConfig;
use crate::error::ErrorList;
use crate::types::{Row, Schema, SheetView};

/// Counts outstanding source loads for one batch. Recalculation should run
/// once, after the last load completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadBarrier {
    pending: usize,
}

impl LoadBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `n` more loads
    pub fn expect(&mut self, n: usize) {
        self.pending += n;
    }

    /// Mark one load finished; true when it was the last one outstanding
    pub fn complete(&mut self) -> bool {
        if self.pending == 0 {
            return false;
        }
        self.pending -= 1;
        self.pending == 0
    }

    pub fn pending(&self) -> usize {
        self.pending
    }
}

pub struct Session {
    schema: Schema,
    config: EngineConfig,
    as_of: NaiveDate,
    registry: FunctionRegistry,
    rows: Vec<Row>,
    statistics: HashMap<String, StatisticsTable>,
    risk: RiskProfiles,
}

impl Session {
    /// Start a session. The reference date is the configured `as_of`, or
    /// today's local date captured once here.
    pub fn new(schema: Schema, config: EngineConfig) -> Self {
        let as_of = config.as_of.unwrap_or_else(|| Local::now().date_naive());
        Self {
            schema,
            config,
            as_of,
            registry: FunctionRegistry::with_builtins(),
            rows: Vec::new(),
            statistics: HashMap::new(),
            risk: RiskProfiles::new(),
        }
    }

    /// Replace the function registry
    pub fn with_registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the schema and discard all rows and cached results
    pub fn load_schema(&mut self, schema: Schema) {
        self.schema = schema;
        self.reset();
    }

    /// Discard all rows and cached results
    pub fn reset(&mut self) {
        self.rows.clear();
        self.statistics.clear();
        self.risk.clear();
    }

    /// Add rows loaded from `source`. Each row is tagged with the source.
    pub fn ingest(&mut self, source: &str, rows: impl IntoIterator<Item = Row>) {
        let before = self.rows.len();
        self.rows.extend(rows.into_iter().map(|mut row| {
            row.source = Some(source.to_string());
            row
        }));
        debug!(source, rows = self.rows.len() - before, "ingested rows");
    }

    /// Bring derived state up to date after `source` finished loading.
    ///
    /// Maps columns for every source present, recomputes statistics over all
    /// loaded rows and caches them under `source` together with its risk
    /// profile, then recalculates all computed columns. Returns the per-cell
    /// failures.
    pub fn process(&mut self, source: &str) -> ErrorList {
        for present in self.present_sources() {
            map_columns(&mut self.rows, &self.schema, &present);
        }

        let stats = compute_statistics(&self.rows);
        build_profile(&mut self.risk, source, &stats, &self.config.risk);
        self.statistics.insert(source.to_string(), stats);

        let errors = self.recalc();
        info!(
            source,
            rows = self.rows.len(),
            errors = errors.len(),
            "processed source"
        );
        errors
    }

    /// Run both evaluation passes over the current rows
    pub fn recalc(&mut self) -> ErrorList {
        let recalc = Recalc {
            schema: &self.schema,
            registry: &self.registry,
            as_of: self.as_of,
            risk: RiskScorer::new(&self.risk, &self.config.risk),
            report_formula_errors: self.config.report_formula_errors,
        };
        recalc.run(&mut self.rows)
    }

    /// Selected, grouped rows with totals
    pub fn sheet(&self) -> SheetView {
        super::grouping::build_sheet(&self.rows, &self.schema)
    }

    fn present_sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for source in self.rows.iter().filter_map(|row| row.source.as_deref()) {
            if !sources.iter().any(|s| s == source) {
                sources.push(source.to_string());
            }
        }
        sources
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn statistics(&self, source: &str) -> Option<&StatisticsTable> {
        self.statistics.get(source)
    }

    pub fn risk_profile(&self, source: &str) -> Option<&Result<RiskProfile, UnresolvedSignal>> {
        self.risk.get(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CellValue, ColumnSpec, ColumnType, DataType};

    #[test]
    fn test_barrier_signals_last_completion_only() {
        let mut barrier = LoadBarrier::new();
        barrier.expect(2);
        assert!(!barrier.complete());
        assert!(barrier.complete());
        assert!(!barrier.complete());
        assert_eq!(barrier.pending(), 0);
    }

    fn schema() -> Schema {
        Schema::new(vec![
            ColumnSpec::new("Portfolio", "portfolio", ColumnType::Data, DataType::Unique),
            ColumnSpec::new("Principal", "principal", ColumnType::Data, DataType::Currency)
                .with_source("loan"),
            ColumnSpec::new("Rate", "rate", ColumnType::Data, DataType::Rate).with_source("loan"),
            ColumnSpec::new("Interest", "interest", ColumnType::Function, DataType::Currency)
                .with_function("interestIncome(principal, rate)"),
        ])
    }

    #[test]
    fn test_process_maps_computes_and_caches() {
        let mut session = Session::new(schema(), EngineConfig::default());
        session.ingest(
            "loan",
            vec![
                Row::from_pairs(None, [("Portfolio", "A"), ("PRINCIPAL", "100"), ("Rate", "0.1")]),
                Row::from_pairs(None, [("Portfolio", "B"), ("PRINCIPAL", "300"), ("Rate", "0.1")]),
            ],
        );
        let errors = session.process("loan");

        assert!(errors.is_empty());
        assert_eq!(session.rows()[0].value("interest"), &CellValue::Number(10.0));
        assert_eq!(session.rows()[1].value("portfolio"), &CellValue::text("B"));
        let stats = session.statistics("loan").unwrap();
        assert_eq!(stats.get("PRINCIPAL").unwrap().mean, 200.0);
        assert!(session.risk_profile("loan").is_some());
    }

    #[test]
    fn test_load_schema_discards_state() {
        let mut session = Session::new(schema(), EngineConfig::default());
        session.ingest("loan", vec![Row::from_pairs(None, [("principal", "1")])]);
        session.process("loan");
        session.load_schema(schema());
        assert!(session.rows().is_empty());
        assert!(session.statistics("loan").is_none());
        assert!(session.risk_profile("loan").is_none());
    }

    #[test]
    fn test_statistics_cover_every_loaded_source() {
        let mut session = Session::new(schema(), EngineConfig::default());
        session.ingest(
            "loan",
            vec![
                Row::from_pairs(None, [("Portfolio", "A"), ("Principal", "100")]),
                Row::from_pairs(None, [("Portfolio", "B"), ("Principal", "300")]),
            ],
        );
        session.process("loan");
        session.ingest("checking", vec![Row::from_pairs(None, [("Balance", "50")])]);
        session.process("checking");

        let loan = session.statistics("loan").unwrap();
        assert!(loan.get("Balance").is_none());

        let checking = session.statistics("checking").unwrap();
        assert_eq!(checking.get("Principal").unwrap().count, 2);
        assert_eq!(checking.get("Principal").unwrap().mean, 200.0);
        assert_eq!(checking.get("Balance").unwrap().count, 1);
    }
}
