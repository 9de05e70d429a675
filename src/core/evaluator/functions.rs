//! Row functions available to `function` columns
//!
//! Each function declares its parameters. A `Number` parameter receives the
//! referenced cell under best-effort numeric coercion; a `Date` parameter
//! receives the raw cell parsed as a calendar date.

use chrono::NaiveDate;

use crate::core::dates::{months_between, parse_date};
use crate::core::risk::{RiskInputs, RiskScorer};
use crate::error::{LedgerError, LedgerResult};
use crate::types::CellValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Number,
    Date,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Number => "number",
            ParamKind::Date => "date",
        }
    }
}

/// An argument after coercion
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    Number(f64),
    /// `None` when the cell is blank or not a date
    Date(Option<NaiveDate>),
}

impl Arg {
    /// Coerce `value` for a parameter of `kind`
    pub fn coerce(kind: ParamKind, value: &CellValue) -> Self {
        match kind {
            ParamKind::Number => Arg::Number(crate::core::coerce::best_effort_number(value)),
            ParamKind::Date => Arg::Date(value.as_str().and_then(parse_date)),
        }
    }

    fn number(&self) -> f64 {
        match self {
            Arg::Number(n) => *n,
            Arg::Date(_) => 0.0,
        }
    }

    fn date(&self) -> Option<NaiveDate> {
        match self {
            Arg::Date(d) => *d,
            Arg::Number(_) => None,
        }
    }
}

/// What a function can see besides its arguments
pub struct FunctionContext<'a> {
    /// Source tag of the row being evaluated
    pub source: Option<&'a str>,
    /// Reference date for maturity arithmetic
    pub as_of: NaiveDate,
    pub risk: RiskScorer<'a>,
}

pub trait RowFunction: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn params(&self) -> &'static [ParamKind];
    fn invoke(&self, ctx: &FunctionContext<'_>, args: &[Arg]) -> LedgerResult<CellValue>;
}

/// Functions by name, in registration order
pub struct FunctionRegistry {
    functions: Vec<Box<dyn RowFunction>>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self {
            functions: Vec::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(InterestIncome));
        registry.register(Box::new(AverageBalance));
        registry.register(Box::new(UntilMaturity));
        registry.register(Box::new(YearsUntilMaturity));
        registry.register(Box::new(Risk));
        registry
    }

    /// Register a function, replacing any function of the same name
    pub fn register(&mut self, function: Box<dyn RowFunction>) {
        self.functions.retain(|f| f.name() != function.name());
        self.functions.push(function);
    }

    pub fn get(&self, name: &str) -> Option<&dyn RowFunction> {
        self.functions
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn RowFunction> {
        self.functions.iter().map(|f| f.as_ref())
    }

    /// Invoke `name` after checking arity
    pub fn call(
        &self,
        name: &str,
        ctx: &FunctionContext<'_>,
        args: &[Arg],
    ) -> LedgerResult<CellValue> {
        let function = self
            .get(name)
            .ok_or_else(|| LedgerError::FunctionNotFound(name.to_string()))?;
        let expected = function.params().len();
        if args.len() != expected {
            return Err(LedgerError::runtime(
                name,
                format!("expected {} argument(s), got {}", expected, args.len()),
            ));
        }
        function.invoke(ctx, args)
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Months and years from `as_of` to `maturity`, each at least 1.
/// A missing maturity date counts as twelve months.
pub fn until_maturity(maturity: Option<NaiveDate>, as_of: NaiveDate) -> (f64, f64) {
    match maturity {
        Some(maturity) => {
            let months = months_between(as_of, maturity).max(1) as f64;
            (months, (months / 12.0).max(1.0))
        }
        None => (12.0, 1.0),
    }
}

/// Average outstanding principal over the months to maturity, simulating a
/// fixed monthly payment. Rates below 1 are annual fractions, otherwise
/// annual percentages.
pub fn average_balance(principal: f64, payment: f64, rate: f64, months: f64) -> f64 {
    let monthly_rate = if rate < 1.0 {
        rate / 12.0
    } else {
        rate / 100.0 / 12.0
    };

    let mut cumulative = 0.0;
    let mut remaining = principal;
    let mut month = 0.0;
    while month < months && remaining > 0.0 {
        cumulative += remaining;
        remaining -= payment - remaining * monthly_rate;
        month += 1.0;
    }
    round2(cumulative / months)
}

//==============================================================================
// Built-ins
//==============================================================================

struct InterestIncome;

impl RowFunction for InterestIncome {
    fn name(&self) -> &'static str {
        "interestIncome"
    }

    fn description(&self) -> &'static str {
        "Calculates the interest income based on principal and annual rate"
    }

    fn params(&self) -> &'static [ParamKind] {
        &[ParamKind::Number, ParamKind::Number]
    }

    fn invoke(&self, _ctx: &FunctionContext<'_>, args: &[Arg]) -> LedgerResult<CellValue> {
        Ok(CellValue::Number(args[0].number() * args[1].number()))
    }
}

struct AverageBalance;

impl RowFunction for AverageBalance {
    fn name(&self) -> &'static str {
        "averageBalance"
    }

    fn description(&self) -> &'static str {
        "Calculates the average balance of a loan over its term"
    }

    fn params(&self) -> &'static [ParamKind] {
        &[
            ParamKind::Number,
            ParamKind::Number,
            ParamKind::Number,
            ParamKind::Date,
        ]
    }

    fn invoke(&self, ctx: &FunctionContext<'_>, args: &[Arg]) -> LedgerResult<CellValue> {
        let (months, _) = until_maturity(args[3].date(), ctx.as_of);
        Ok(CellValue::Number(average_balance(
            args[0].number(),
            args[1].number(),
            args[2].number(),
            months,
        )))
    }
}

struct UntilMaturity;

impl RowFunction for UntilMaturity {
    fn name(&self) -> &'static str {
        "untilMaturity"
    }

    fn description(&self) -> &'static str {
        "Calculates the number of months to maturity of a financial instrument"
    }

    fn params(&self) -> &'static [ParamKind] {
        &[ParamKind::Date]
    }

    fn invoke(&self, ctx: &FunctionContext<'_>, args: &[Arg]) -> LedgerResult<CellValue> {
        let (months, _) = until_maturity(args[0].date(), ctx.as_of);
        Ok(CellValue::Number(months))
    }
}

struct YearsUntilMaturity;

impl RowFunction for YearsUntilMaturity {
    fn name(&self) -> &'static str {
        "yearsUntilMaturity"
    }

    fn description(&self) -> &'static str {
        "Calculates the number of years to maturity of a financial instrument"
    }

    fn params(&self) -> &'static [ParamKind] {
        &[ParamKind::Date]
    }

    fn invoke(&self, ctx: &FunctionContext<'_>, args: &[Arg]) -> LedgerResult<CellValue> {
        let (_, years) = until_maturity(args[0].date(), ctx.as_of);
        Ok(CellValue::Number(years))
    }
}

struct Risk;

impl RowFunction for Risk {
    fn name(&self) -> &'static str {
        "risk"
    }

    fn description(&self) -> &'static str {
        "Weighted risk score from balance, checks, deposits and NSF count"
    }

    fn params(&self) -> &'static [ParamKind] {
        &[ParamKind::Number; 4]
    }

    fn invoke(&self, ctx: &FunctionContext<'_>, args: &[Arg]) -> LedgerResult<CellValue> {
        let inputs = RiskInputs {
            balance: args[0].number(),
            checks: args[1].number(),
            deposits: args[2].number(),
            nsf: args[3].number(),
        };
        ctx.risk
            .score(&inputs, ctx.source)
            .map(CellValue::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::core::risk::RiskProfiles;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_until_maturity() {
        let as_of = date(2025, 1, 15);
        assert_eq!(until_maturity(Some(date(2026, 1, 15)), as_of), (12.0, 1.0));
        assert_eq!(until_maturity(Some(date(2027, 7, 20)), as_of), (30.0, 2.5));
        assert_eq!(until_maturity(Some(date(2025, 1, 20)), as_of), (1.0, 1.0));
        assert_eq!(until_maturity(Some(date(2020, 1, 1)), as_of), (1.0, 1.0));
        assert_eq!(until_maturity(None, as_of), (12.0, 1.0));
    }

    #[test]
    fn test_average_balance_simulation() {
        // 1000 at 12% (1%/month), 500 payment over 3 months:
        // 1000 -> 510 -> 15.1 -> stop
        let avg = average_balance(1000.0, 500.0, 12.0, 3.0);
        assert_eq!(avg, round2((1000.0 + 510.0 + 15.1) / 3.0));
        // Fractional rate is the same loan
        assert_eq!(average_balance(1000.0, 500.0, 0.12, 3.0), avg);
    }

    #[test]
    fn test_registry_call_checks_name_and_arity() {
        let registry = FunctionRegistry::with_builtins();
        let profiles = RiskProfiles::new();
        let config = RiskConfig::default();
        let ctx = FunctionContext {
            source: Some("loan"),
            as_of: date(2025, 1, 1),
            risk: RiskScorer::new(&profiles, &config),
        };

        let income = registry
            .call("interestIncome", &ctx, &[Arg::Number(1000.0), Arg::Number(0.05)])
            .unwrap();
        assert_eq!(income, CellValue::Number(50.0));

        assert!(matches!(
            registry.call("nope", &ctx, &[]),
            Err(LedgerError::FunctionNotFound(_))
        ));
        assert!(matches!(
            registry.call("interestIncome", &ctx, &[Arg::Number(1.0)]),
            Err(LedgerError::FunctionRuntime { .. })
        ));
    }

    #[test]
    fn test_date_param_coercion() {
        assert_eq!(
            Arg::coerce(ParamKind::Date, &CellValue::text("2030-05-01")),
            Arg::Date(Some(date(2030, 5, 1)))
        );
        assert_eq!(
            Arg::coerce(ParamKind::Date, &CellValue::Null),
            Arg::Date(None)
        );
        assert_eq!(
            Arg::coerce(ParamKind::Number, &CellValue::text("n/a")),
            Arg::Number(0.0)
        );
    }
}
