//! Weighted composite risk score
//!
//! Each of four signals is located among a source's statistics columns by
//! intent (through the lexical normalizer), then the observed value is placed
//! in a tier by comparing it against that column's mean and 2σ/3σ upper
//! bounds. The score is the weighted sum of the four tiers.

use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

use super::lexicon::resolve_field;
use super::statistics::{ColumnStatistics, StatisticsTable};
use crate::config::{RiskConfig, RiskSignals, RiskWeights};
use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Balance,
    Checks,
    Deposits,
    Nsf,
}

impl Signal {
    pub const ALL: [Signal; 4] = [Signal::Balance, Signal::Checks, Signal::Deposits, Signal::Nsf];

    pub fn name(&self) -> &'static str {
        match self {
            Signal::Balance => "balance",
            Signal::Checks => "checks",
            Signal::Deposits => "deposits",
            Signal::Nsf => "nsf",
        }
    }

    /// Tier of `value` against `bands`. Every boundary is exclusive.
    pub fn tier(&self, value: f64, bands: &SignalBands) -> u8 {
        let above_3 = value > bands.three_sigma_upper;
        let above_2 = value > bands.two_sigma_upper;
        let above_mean = value > bands.mean;
        match self {
            Signal::Balance if above_3 => 5,
            Signal::Balance if above_mean => 3,
            Signal::Checks if above_3 => 5,
            Signal::Checks if above_2 => 4,
            Signal::Checks if above_mean => 2,
            Signal::Deposits if above_3 => 5,
            Signal::Deposits if above_2 => 2,
            Signal::Nsf if above_3 => 5,
            _ => 1,
        }
    }

    fn field<'a>(&self, signals: &'a RiskSignals) -> &'a str {
        match self {
            Signal::Balance => &signals.balance,
            Signal::Checks => &signals.checks,
            Signal::Deposits => &signals.deposits,
            Signal::Nsf => &signals.nsf,
        }
    }

    fn weight(&self, weights: &RiskWeights) -> f64 {
        match self {
            Signal::Balance => weights.balance,
            Signal::Checks => weights.checks,
            Signal::Deposits => weights.deposits,
            Signal::Nsf => weights.nsf,
        }
    }
}

/// Thresholds taken from one statistics column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalBands {
    pub column: String,
    pub mean: f64,
    pub two_sigma_upper: f64,
    pub three_sigma_upper: f64,
}

impl SignalBands {
    pub fn from_statistics(column: &str, stats: &ColumnStatistics) -> Self {
        Self {
            column: column.to_string(),
            mean: stats.mean,
            two_sigma_upper: stats.two_std_deviations[1],
            three_sigma_upper: stats.three_std_deviations[1],
        }
    }
}

/// Observed values for one entity
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RiskInputs {
    pub balance: f64,
    pub checks: f64,
    pub deposits: f64,
    pub nsf: f64,
}

impl RiskInputs {
    pub fn value(&self, signal: Signal) -> f64 {
        match signal {
            Signal::Balance => self.balance,
            Signal::Checks => self.checks,
            Signal::Deposits => self.deposits,
            Signal::Nsf => self.nsf,
        }
    }
}

/// A signal field that matched no statistics column of a source
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedSignal {
    pub field: String,
    pub source: String,
}

impl From<UnresolvedSignal> for LedgerError {
    fn from(unresolved: UnresolvedSignal) -> Self {
        LedgerError::UnresolvedFieldName {
            field: unresolved.field,
            source_key: unresolved.source,
        }
    }
}

/// The resolved bands of all four signals for one source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskProfile {
    pub source: String,
    pub balance: SignalBands,
    pub checks: SignalBands,
    pub deposits: SignalBands,
    pub nsf: SignalBands,
}

impl RiskProfile {
    /// Resolve every signal against `stats`. The first signal that cannot be
    /// resolved makes the whole profile unavailable.
    pub fn resolve(
        source: &str,
        stats: &StatisticsTable,
        config: &RiskConfig,
    ) -> Result<Self, UnresolvedSignal> {
        let keys = stats.keys();
        let bands = |signal: Signal| -> Result<SignalBands, UnresolvedSignal> {
            let field = signal.field(&config.signals);
            resolve_field(&keys, field, config.strict_resolution)
                .and_then(|column| {
                    stats
                        .get(column)
                        .map(|column_stats| SignalBands::from_statistics(column, column_stats))
                })
                .ok_or_else(|| UnresolvedSignal {
                    field: field.to_string(),
                    source: source.to_string(),
                })
        };

        Ok(Self {
            source: source.to_string(),
            balance: bands(Signal::Balance)?,
            checks: bands(Signal::Checks)?,
            deposits: bands(Signal::Deposits)?,
            nsf: bands(Signal::Nsf)?,
        })
    }

    pub fn bands(&self, signal: Signal) -> &SignalBands {
        match signal {
            Signal::Balance => &self.balance,
            Signal::Checks => &self.checks,
            Signal::Deposits => &self.deposits,
            Signal::Nsf => &self.nsf,
        }
    }

    /// Tier per signal, in [`Signal::ALL`] order
    pub fn tiers(&self, inputs: &RiskInputs) -> [u8; 4] {
        Signal::ALL.map(|signal| signal.tier(inputs.value(signal), self.bands(signal)))
    }

    /// Weighted sum of the tiers
    pub fn score(&self, inputs: &RiskInputs, weights: &RiskWeights) -> f64 {
        Signal::ALL
            .iter()
            .zip(self.tiers(inputs))
            .map(|(signal, tier)| signal.weight(weights) * f64::from(tier))
            .sum()
    }
}

/// Per-source resolution outcome, built when a source's statistics change
pub type RiskProfiles = HashMap<String, Result<RiskProfile, UnresolvedSignal>>;

/// Build (or rebuild) the profile of `source`
pub fn build_profile(
    profiles: &mut RiskProfiles,
    source: &str,
    stats: &StatisticsTable,
    config: &RiskConfig,
) {
    let resolved = RiskProfile::resolve(source, stats, config);
    if let Err(unresolved) = &resolved {
        warn!(
            source,
            field = %unresolved.field,
            "risk signal has no matching statistics column"
        );
    }
    profiles.insert(source.to_string(), resolved);
}

/// Scores entities against the cached per-source profiles
#[derive(Debug, Clone, Copy)]
pub struct RiskScorer<'a> {
    profiles: &'a RiskProfiles,
    config: &'a RiskConfig,
}

impl<'a> RiskScorer<'a> {
    pub fn new(profiles: &'a RiskProfiles, config: &'a RiskConfig) -> Self {
        Self { profiles, config }
    }

    /// Composite score for `inputs` against the profile of `source`.
    ///
    /// A zero balance or a missing source scores 0 without consulting any
    /// profile. A source whose signals could not be resolved is an
    /// [`LedgerError::UnresolvedFieldName`].
    pub fn score(&self, inputs: &RiskInputs, source: Option<&str>) -> LedgerResult<f64> {
        let source = match source {
            Some(s) if !s.is_empty() => s,
            _ => return Ok(0.0),
        };
        if inputs.balance == 0.0 {
            return Ok(0.0);
        }

        match self.profiles.get(source) {
            Some(Ok(profile)) => Ok(profile.score(inputs, &self.config.weights)),
            Some(Err(unresolved)) => Err(unresolved.clone().into()),
            None => Err(LedgerError::UnresolvedFieldName {
                field: self.config.signals.balance.clone(),
                source_key: source.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::statistics::compute_statistics;
    use crate::types::Row;

    fn bands(mean: f64, two: f64, three: f64) -> SignalBands {
        SignalBands {
            column: "x".to_string(),
            mean,
            two_sigma_upper: two,
            three_sigma_upper: three,
        }
    }

    #[test]
    fn test_tier_boundaries_are_exclusive() {
        let b = bands(100.0, 200.0, 300.0);
        assert_eq!(Signal::Balance.tier(100.0, &b), 1);
        assert_eq!(Signal::Balance.tier(100.5, &b), 3);
        assert_eq!(Signal::Balance.tier(250.0, &b), 3);
        assert_eq!(Signal::Balance.tier(300.5, &b), 5);

        assert_eq!(Signal::Checks.tier(150.0, &b), 2);
        assert_eq!(Signal::Checks.tier(200.0, &b), 2);
        assert_eq!(Signal::Checks.tier(201.0, &b), 4);
        assert_eq!(Signal::Checks.tier(301.0, &b), 5);

        assert_eq!(Signal::Deposits.tier(150.0, &b), 1);
        assert_eq!(Signal::Deposits.tier(250.0, &b), 2);

        assert_eq!(Signal::Nsf.tier(250.0, &b), 1);
        assert_eq!(Signal::Nsf.tier(301.0, &b), 5);
    }

    fn checking_rows() -> Vec<Row> {
        [
            ("1000", "4", "2", "0"),
            ("2000", "6", "3", "1"),
            ("3000", "8", "4", "0"),
            ("4000", "10", "5", "1"),
        ]
        .iter()
        .map(|(bal, checks, deposits, nsf)| {
            Row::from_pairs(
                Some("checking"),
                [
                    ("Avg Balance", *bal),
                    ("Checks Paid", *checks),
                    ("Deposit Count", *deposits),
                    ("NSF Count", *nsf),
                ],
            )
        })
        .collect()
    }

    #[test]
    fn test_profile_resolves_signals_by_intent() {
        let stats = compute_statistics(&checking_rows());
        let profile = RiskProfile::resolve("checking", &stats, &RiskConfig::default()).unwrap();
        assert_eq!(profile.balance.column, "Avg Balance");
        assert_eq!(profile.checks.column, "Checks Paid");
        assert_eq!(profile.deposits.column, "Deposit Count");
        assert_eq!(profile.nsf.column, "NSF Count");
        assert_eq!(profile.balance.mean, 2500.0);
    }

    #[test]
    fn test_score_at_means_is_all_tier_one() {
        let stats = compute_statistics(&checking_rows());
        let config = RiskConfig::default();
        let mut profiles = RiskProfiles::new();
        build_profile(&mut profiles, "checking", &stats, &config);

        let scorer = RiskScorer::new(&profiles, &config);
        let inputs = RiskInputs {
            balance: 2500.0,
            checks: 7.0,
            deposits: 3.5,
            nsf: 0.5,
        };
        assert_eq!(scorer.score(&inputs, Some("checking")).unwrap(), 14.0);

        let above = RiskInputs {
            balance: 2600.0,
            ..inputs
        };
        assert_eq!(scorer.score(&above, Some("checking")).unwrap(), 24.0);
    }

    #[test]
    fn test_zero_balance_or_missing_source_scores_zero() {
        let profiles = RiskProfiles::new();
        let config = RiskConfig::default();
        let scorer = RiskScorer::new(&profiles, &config);
        let inputs = RiskInputs {
            balance: 0.0,
            checks: 99.0,
            ..Default::default()
        };
        assert_eq!(scorer.score(&inputs, Some("checking")).unwrap(), 0.0);
        let inputs = RiskInputs {
            balance: 10.0,
            ..Default::default()
        };
        assert_eq!(scorer.score(&inputs, None).unwrap(), 0.0);
    }

    #[test]
    fn test_unresolved_signal_is_an_error() {
        let rows = vec![Row::from_pairs(Some("loan"), [("Principal", "100")])];
        let stats = compute_statistics(&rows);
        let config = RiskConfig {
            strict_resolution: true,
            ..Default::default()
        };
        let mut profiles = RiskProfiles::new();
        build_profile(&mut profiles, "loan", &stats, &config);

        let scorer = RiskScorer::new(&profiles, &config);
        let inputs = RiskInputs {
            balance: 10.0,
            ..Default::default()
        };
        let err = scorer.score(&inputs, Some("loan")).unwrap_err();
        assert!(matches!(err, LedgerError::UnresolvedFieldName { .. }));

        let err = scorer.score(&inputs, Some("savings")).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::UnresolvedFieldName { ref source_key, .. } if source_key == "savings"
        ));
    }
}
