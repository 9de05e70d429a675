use crate::cli::{DocumentFormat, OutputFormat, SourceFiles};
use crate::config::EngineConfig;
use crate::core::risk::{RiskInputs, RiskProfile, Signal};
use crate::core::{compute_statistics, resolve_field, FunctionRegistry, LoadBarrier, Session};
use crate::error::{CellError, LedgerError, LedgerResult};
use crate::ingest;
use crate::parser;
use crate::types::format_number;
use crate::writer;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

fn load_config(config: Option<&Path>) -> LedgerResult<EngineConfig> {
    match config {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

/// Source name for a standalone CSV: the given name, else the file stem
fn source_name(name: Option<String>, file: &Path) -> String {
    name.unwrap_or_else(|| {
        file.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string())
    })
}

fn print_cell_errors(errors: &[CellError]) {
    if errors.is_empty() {
        return;
    }
    eprintln!(
        "{}",
        format!("⚠️  {} cell(s) could not be computed:", errors.len()).yellow()
    );
    for error in errors {
        eprintln!("  - {}", error);
    }
}

fn emit(content: &str, output: Option<&Path>) -> LedgerResult<()> {
    match output {
        Some(path) => {
            fs::write(path, content)?;
            eprintln!("{}", format!("✅ Wrote {}", path.display()).green());
        }
        None => print!("{}", content),
    }
    Ok(())
}

/// Execute the run command: load every source, recalculate, render the sheet
pub fn run(
    schema_path: PathBuf,
    sources: Vec<SourceFiles>,
    format: OutputFormat,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
) -> LedgerResult<()> {
    let banner = format == OutputFormat::Table && output.is_none();
    if banner {
        println!("{}", "📒 Ledger - Reconciling sources".bold().green());
        println!("   Schema: {}", schema_path.display());
        println!();
    }

    let schema = parser::parse_schema(&schema_path)?;
    let registry = FunctionRegistry::with_builtins();
    parser::validate_schema(&schema, &registry)?;
    let config = load_config(config.as_deref())?;

    for declared in schema.sources() {
        if !sources.iter().any(|s| s.name == declared) {
            eprintln!(
                "{}",
                format!("⚠️  No files given for source '{}'", declared).yellow()
            );
        }
    }

    let mut session = Session::new(schema, config).with_registry(registry);
    let mut errors = Vec::new();

    for source in &sources {
        let mut barrier = LoadBarrier::new();
        barrier.expect(source.files.len());
        for file in &source.files {
            let rows = ingest::read_csv(&source.name, file)?;
            if banner {
                println!(
                    "   📥 {} ← {} ({} rows)",
                    source.name.bright_blue().bold(),
                    file.display(),
                    rows.len()
                );
            }
            session.ingest(&source.name, rows);
            if barrier.complete() {
                errors = session.process(&source.name);
            }
        }
    }
    if banner {
        println!();
    }

    print_cell_errors(&errors);

    let sheet = session.sheet();
    let schema = session.schema();
    let rendered = match format {
        OutputFormat::Table => writer::render_table(&sheet, schema),
        OutputFormat::Json => writer::render_json(&sheet, schema)?,
        OutputFormat::Yaml => writer::render_yaml(&sheet, schema)?,
        OutputFormat::Csv => writer::render_csv(&sheet, schema)?,
    };
    emit(&rendered, output.as_deref())?;

    if banner {
        println!();
        println!(
            "{}",
            format!(
                "✅ {} group(s), {} row(s) loaded",
                sheet.groups.len(),
                session.rows().len()
            )
            .bold()
            .green()
        );
    }
    Ok(())
}

/// Execute the stats command: per-column statistics of one CSV
pub fn stats(file: PathBuf, source: Option<String>, format: DocumentFormat) -> LedgerResult<()> {
    let source = source_name(source, &file);
    let rows = ingest::read_csv(&source, &file)?;
    let table = compute_statistics(&rows);

    let rendered = match format {
        DocumentFormat::Json => {
            let mut json = serde_json::to_string_pretty(&table)?;
            json.push('\n');
            json
        }
        DocumentFormat::Yaml => serde_yaml::to_string(&table)?,
    };
    print!("{}", rendered);
    Ok(())
}

/// Execute the resolve command: find the header a field name refers to
pub fn resolve(field: String, headers: Vec<String>, strict: bool) -> LedgerResult<()> {
    match resolve_field(&headers, &field, strict) {
        Some(header) => {
            println!("{} → {}", field.cyan(), header.bright_blue().bold());
            Ok(())
        }
        None => {
            println!(
                "{}",
                format!("❌ No header matches '{}'", field).bold().red()
            );
            Err(LedgerError::UnresolvedFieldName {
                field,
                source_key: headers.join(","),
            })
        }
    }
}

/// Execute the stem command
pub fn stem(words: Vec<String>) -> LedgerResult<()> {
    for word in words {
        println!("{} → {}", word.cyan(), crate::core::stem(&word).bold());
    }
    Ok(())
}

/// Execute the validate command over one or more schema documents
pub fn validate(files: Vec<PathBuf>) -> LedgerResult<()> {
    println!("{}", "✅ Validating schemas".bold().green());
    println!();

    let registry = FunctionRegistry::with_builtins();
    let mut failed = 0;

    for file in &files {
        let outcome = parser::parse_schema(file).and_then(|schema| {
            parser::validate_schema(&schema, &registry)?;
            Ok(schema)
        });
        match outcome {
            Ok(schema) => {
                println!("   {} {}", "✓".green(), file.display());
                println!(
                    "      {} columns, sources: {}",
                    schema.columns.len(),
                    schema.sources().join(", ").cyan()
                );
            }
            Err(e) => {
                failed += 1;
                println!("   {} {}", "✗".red(), file.display());
                for line in e.to_string().lines() {
                    println!("      {}", line.red());
                }
            }
        }
    }
    println!();

    if failed > 0 {
        println!(
            "{}",
            format!("❌ {} of {} schema(s) invalid", failed, files.len())
                .bold()
                .red()
        );
        return Err(LedgerError::Validation(format!(
            "{} of {} schema documents failed validation",
            failed,
            files.len()
        )));
    }

    println!("{}", "✅ All schemas are valid".bold().green());
    Ok(())
}

/// Execute the risk command: score one entity against a source's statistics
pub fn risk(
    file: PathBuf,
    source: Option<String>,
    inputs: RiskInputs,
    config: Option<PathBuf>,
) -> LedgerResult<()> {
    let source = source_name(source, &file);
    let config = load_config(config.as_deref())?;
    let rows = ingest::read_csv(&source, &file)?;
    let table = compute_statistics(&rows);

    let profile = RiskProfile::resolve(&source, &table, &config.risk).map_err(LedgerError::from)?;

    println!("{}", "📊 Ledger - Risk score".bold().green());
    println!("   Source: {}", source.bright_blue().bold());
    println!();

    let score = if inputs.balance == 0.0 {
        println!("{}", "   Zero balance: nothing at risk".yellow());
        0.0
    } else {
        for (signal, tier) in Signal::ALL.iter().zip(profile.tiers(&inputs)) {
            let bands = profile.bands(*signal);
            println!(
                "   {:<9} {:>12}  column {}  mean {}  2σ {}  3σ {}  tier {}",
                signal.name().cyan(),
                format_number(inputs.value(*signal)),
                bands.column.bright_blue(),
                format_number(bands.mean),
                format_number(bands.two_sigma_upper),
                format_number(bands.three_sigma_upper),
                tier.to_string().bold()
            );
        }
        profile.score(&inputs, &config.risk.weights)
    };

    println!();
    println!(
        "{}",
        format!("✅ Score: {}", format_number(score)).bold().green()
    );
    Ok(())
}

/// Execute the schema-export command: reload a schema and write it back out
pub fn schema_export(input: PathBuf, output: PathBuf) -> LedgerResult<()> {
    let schema = parser::parse_schema(&input)?;
    writer::write_schema(&schema, &output)?;
    println!(
        "{}",
        format!(
            "✅ Exported {} column(s) from {} to {}",
            schema.columns.len(),
            input.display(),
            output.display()
        )
        .green()
    );
    Ok(())
}

/// Execute the functions command: list the registered row functions
pub fn functions() -> LedgerResult<()> {
    println!("{}", "🧮 Registered functions".bold().green());
    println!();
    let registry = FunctionRegistry::with_builtins();
    for function in registry.iter() {
        let params: Vec<&str> = function
            .params()
            .iter()
            .map(|kind| kind.as_str())
            .collect();
        println!(
            "   {}({})",
            function.name().bright_blue().bold(),
            params.join(", ")
        );
        println!("      {}", function.description());
    }
    Ok(())
}
