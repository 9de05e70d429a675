//! Engine configuration
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. Files are read as JSON when the extension is `.json` and as
//! YAML otherwise.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::LedgerResult;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reference date for maturity functions; the session's creation date when unset
    pub as_of: Option<NaiveDate>,
    /// Record formula failures in the error list (function failures are always recorded)
    pub report_formula_errors: bool,
    pub risk: RiskConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub weights: RiskWeights,
    pub signals: RiskSignals,
    /// Resolve signal columns by direct match only, skipping synonym groups
    pub strict_resolution: bool,
}

/// Multipliers applied to each signal's tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub balance: f64,
    pub checks: f64,
    pub deposits: f64,
    pub nsf: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            balance: 5.0,
            checks: 5.0,
            deposits: 3.0,
            nsf: 1.0,
        }
    }
}

/// Field names used to find each signal's statistics column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSignals {
    pub balance: String,
    pub checks: String,
    pub deposits: String,
    pub nsf: String,
}

impl Default for RiskSignals {
    fn default() -> Self {
        Self {
            balance: "balance".to_string(),
            checks: "checks".to_string(),
            deposits: "deposits".to_string(),
            nsf: "nsf".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration file
    pub fn load(path: &Path) -> LedgerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Ok(serde_json::from_str(&content)?)
        } else if content.trim().is_empty() {
            Ok(Self::default())
        } else {
            Ok(serde_yaml::from_str(&content)?)
        }
    }
}
