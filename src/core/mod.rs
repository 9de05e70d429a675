//! Reconciliation engine: mapping, statistics, derivation, selection, scoring

pub mod coerce;
pub mod dates;
pub mod evaluator;
pub mod filter;
pub mod grouping;
pub mod lexicon;
pub mod mapper;
pub mod risk;
pub mod session;
pub mod statistics;

pub use evaluator::{FunctionRegistry, Recalc, RowFunction};
pub use lexicon::{resolve_field, stem};
pub use mapper::map_columns;
pub use risk::{RiskInputs, RiskProfile, RiskScorer};
pub use session::{LoadBarrier, Session};
pub use statistics::{compute_statistics, ColumnStatistics, StatisticsTable};
