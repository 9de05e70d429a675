//! End-to-end engine tests over the fixtures in test-data/

use pretty_assertions::assert_eq;
use royalbit_ledger::config::EngineConfig;
use royalbit_ledger::core::evaluator::safe_eval_formula;
use royalbit_ledger::core::risk::{RiskProfile, Signal};
use royalbit_ledger::core::statistics::ModeValue;
use royalbit_ledger::core::{compute_statistics, FunctionRegistry, LoadBarrier, RiskInputs, Session};
use royalbit_ledger::error::CellErrorKind;
use royalbit_ledger::ingest::{read_csv, rows_from_records};
use royalbit_ledger::parser::{parse_schema, validate_schema};
use royalbit_ledger::types::{CellValue, ColumnSpec, ColumnType, DataType, Row, Schema};
use royalbit_ledger::writer::write_schema;
use royalbit_ledger::LedgerError;
use std::path::Path;
use tempfile::TempDir;

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("test-data").join(name)
}

fn number(value: &CellValue) -> f64 {
    match value {
        CellValue::Number(n) => *n,
        other => panic!("expected a number, got {:?}", other),
    }
}

fn approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// FULL PIPELINE
// ═══════════════════════════════════════════════════════════════════════════

fn portfolio_session() -> Session {
    let schema = parse_schema(&fixture("portfolio.json")).unwrap();
    validate_schema(&schema, &FunctionRegistry::with_builtins()).unwrap();
    let config = EngineConfig::load(&fixture("config.yaml")).unwrap();
    Session::new(schema, config)
}

#[test]
fn test_two_sources_reconcile_into_groups() {
    let mut session = portfolio_session();

    session.ingest("loan", read_csv("loan", &fixture("loan.csv")).unwrap());
    let loan_errors = session.process("loan");
    assert!(loan_errors.is_empty(), "{:?}", loan_errors);

    session.ingest("checking", read_csv("checking", &fixture("checking.csv")).unwrap());
    let errors = session.process("checking");
    assert!(errors.is_empty(), "{:?}", errors);

    let first = &session.rows()[0];
    approx(number(first.value("interest")), 15.0);
    approx(number(first.value("gross")), 165.0);

    let view = session.sheet();
    let keys: Vec<CellValue> = view.groups.iter().map(|g| g.key.clone()).collect();
    assert_eq!(
        keys,
        vec![CellValue::text("A"), CellValue::text("B"), CellValue::text("C")]
    );
    assert_eq!(view.groups[0].sub_rows.len(), 3);
    assert!(!view.groups[2].has_sub_rows());

    approx(number(view.totals.value("principal")), 450.0);
    approx(number(view.totals.value("interest")), 35.0);
    assert_eq!(view.totals.value("portfolio"), &CellValue::Null);
}

#[test]
fn test_risk_function_scores_checking_rows_only() {
    let mut session = portfolio_session();
    session.ingest("loan", read_csv("loan", &fixture("loan.csv")).unwrap());
    session.process("loan");
    session.ingest("checking", read_csv("checking", &fixture("checking.csv")).unwrap());
    session.process("checking");

    assert!(matches!(session.risk_profile("loan"), Some(Err(_))));
    assert!(matches!(session.risk_profile("checking"), Some(Ok(_))));

    for row in session.rows() {
        let score = number(row.value("risk"));
        if row.is_from("loan") {
            assert_eq!(score, 0.0);
        } else {
            assert!(score >= 14.0, "checking score {}", score);
        }
    }
}

#[test]
fn test_load_barrier_processes_once_per_batch() {
    let mut session = portfolio_session();
    let mut barrier = LoadBarrier::new();
    barrier.expect(2);

    let batches = [
        rows_from_records("loan", &["Portfolio", "Principal", "Rate"], vec![vec!["A", "100", "0.1"]]),
        rows_from_records("loan", &["Portfolio", "Principal", "Rate"], vec![vec!["B", "300", "0.1"]]),
    ];
    let mut processed = 0;
    for rows in batches {
        session.ingest("loan", rows);
        if barrier.complete() {
            session.process("loan");
            processed += 1;
        }
    }

    assert_eq!(processed, 1);
    let stats = session.statistics("loan").unwrap();
    assert_eq!(stats.get("Principal").unwrap().count, 2);
    assert_eq!(stats.get("Principal").unwrap().mean, 200.0);
}

// ═══════════════════════════════════════════════════════════════════════════
// SELECTION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_group_filter_keeps_qualifying_group_rows() {
    let schema = Schema::new(vec![
        ColumnSpec::new("Portfolio", "portfolio", ColumnType::Data, DataType::Unique),
        ColumnSpec::new("Principal", "principal", ColumnType::Data, DataType::Currency)
            .with_source("loan")
            .with_filter("> 100"),
        ColumnSpec::new("Type", "type", ColumnType::Data, DataType::Integer)
            .with_source("loan")
            .with_filter("{{20}}"),
    ]);
    let mut session = Session::new(schema, EngineConfig::default());
    session.ingest(
        "loan",
        rows_from_records(
            "loan",
            &["Portfolio", "Principal", "Type"],
            vec![
                vec!["A", "150", "20"],
                vec!["A", "50", "20"],
                vec!["A", "200", "15"],
                vec!["B", "500", "15"],
            ],
        ),
    );
    session.process("loan");

    let view = session.sheet();
    assert_eq!(view.groups.len(), 1);
    let a = &view.groups[0];
    let principals: Vec<&CellValue> = a.sub_rows.iter().map(|r| r.value("principal")).collect();
    assert_eq!(principals, vec![&CellValue::text("150"), &CellValue::text("200")]);
    assert_eq!(a.combined.value("principal"), &CellValue::Number(350.0));
    assert_eq!(a.combined.value("type"), &CellValue::Number(20.0));
}

// ═══════════════════════════════════════════════════════════════════════════
// FORMULAS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_formula_column_adds_row_values() {
    let schema = Schema::new(vec![
        ColumnSpec::new("Id", "id", ColumnType::Data, DataType::Unique),
        ColumnSpec::new("A", "a", ColumnType::Data, DataType::Currency).with_source("s"),
        ColumnSpec::new("B", "b", ColumnType::Data, DataType::Currency).with_source("s"),
        ColumnSpec::new("Sum", "sum", ColumnType::Formula, DataType::Currency)
            .with_formula("a + b"),
    ]);
    let mut session = Session::new(schema, EngineConfig::default());
    session.ingest("s", vec![Row::from_pairs(None, [("id", "1"), ("a", "150"), ("b", "200")])]);
    session.process("s");
    assert_eq!(session.rows()[0].value("sum"), &CellValue::Number(350.0));
}

#[test]
fn test_date_literals_subtract_to_days() {
    let value = safe_eval_formula("DATE(2024-01-01) - DATE(2023-01-01)", DataType::Integer).unwrap();
    assert_eq!(value, CellValue::Number(365.0));
}

#[test]
fn test_unsafe_formula_text_is_rejected() {
    let err = safe_eval_formula("1 + 2; drop", DataType::Float).unwrap_err();
    assert!(matches!(err, LedgerError::UnsafeExpression(_)));
}

#[test]
fn test_formula_errors_reported_when_configured() {
    let schema = Schema::new(vec![
        ColumnSpec::new("Id", "id", ColumnType::Data, DataType::Unique),
        ColumnSpec::new("A", "a", ColumnType::Data, DataType::Float).with_source("s"),
        ColumnSpec::new("Half", "half", ColumnType::Formula, DataType::Float)
            .with_formula("a / 2"),
    ]);
    let rows = || vec![Row::from_pairs(None, [("id", "1"), ("a", "")])];

    let mut quiet = Session::new(schema.clone(), EngineConfig::default());
    quiet.ingest("s", rows());
    assert!(quiet.process("s").is_empty());
    assert_eq!(quiet.rows()[0].value("half"), &CellValue::Null);

    let config = EngineConfig {
        report_formula_errors: true,
        ..EngineConfig::default()
    };
    let mut loud = Session::new(schema, config);
    loud.ingest("s", rows());
    let errors = loud.process("s");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, CellErrorKind::UnsafeExpression);
    assert_eq!(errors[0].row_index, 1);
    assert_eq!(errors[0].column_heading, "Half");
}

// ═══════════════════════════════════════════════════════════════════════════
// STATISTICS AND RISK
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_statistics_over_fixture() {
    let rows = read_csv("checking", &fixture("checking.csv")).unwrap();
    let stats = compute_statistics(&rows);

    assert_eq!(stats.keys(), vec!["Balance", "Checks", "Deposits", "NSF"]);
    let balance = stats.get("Balance").unwrap();
    assert_eq!(balance.count, 3);
    assert_eq!(balance.min, 800.0);
    assert_eq!(balance.max, 5000.0);
    assert_eq!(balance.median, 1200.0);
    assert_eq!(balance.sum, 7000.0);

    let nsf = stats.get("NSF").unwrap();
    assert_eq!(nsf.mode, ModeValue::Single(0.0));
}

#[test]
fn test_risk_at_the_mean_is_lowest_tier() {
    let rows = read_csv("checking", &fixture("checking.csv")).unwrap();
    let stats = compute_statistics(&rows);
    let config = EngineConfig::default();
    let profile = RiskProfile::resolve("checking", &stats, &config.risk).unwrap();

    let at_mean = RiskInputs {
        balance: profile.bands(Signal::Balance).mean,
        checks: profile.bands(Signal::Checks).mean,
        deposits: profile.bands(Signal::Deposits).mean,
        nsf: profile.bands(Signal::Nsf).mean,
    };
    assert_eq!(profile.tiers(&at_mean), [1, 1, 1, 1]);
    assert_eq!(profile.score(&at_mean, &config.risk.weights), 14.0);
    assert_eq!(profile.bands(Signal::Deposits).column, "Deposits");
}

// ═══════════════════════════════════════════════════════════════════════════
// SCHEMA DOCUMENTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_schema_export_round_trip() {
    let schema = parse_schema(&fixture("portfolio.json")).unwrap();
    let dir = TempDir::new().unwrap();

    let json = dir.path().join("copy.json");
    write_schema(&schema, &json).unwrap();
    assert_eq!(parse_schema(&json).unwrap(), schema);

    let yaml = dir.path().join("copy.yml");
    write_schema(&schema, &yaml).unwrap();
    assert_eq!(parse_schema(&yaml).unwrap(), schema);
}

#[test]
fn test_yaml_fixture_matches_sources() {
    let schema = parse_schema(&fixture("portfolio.yaml")).unwrap();
    validate_schema(&schema, &FunctionRegistry::with_builtins()).unwrap();
    assert_eq!(schema.sources(), vec!["loan".to_string()]);
    assert_eq!(schema.column("principal").unwrap().filter.as_deref(), Some("> 120"));
}

#[test]
fn test_cyclic_schema_is_rejected() {
    let schema = parse_schema(&fixture("invalid.json")).unwrap();
    let err = validate_schema(&schema, &FunctionRegistry::with_builtins()).unwrap_err();
    assert!(matches!(err, LedgerError::CircularDependency(_)));
}
