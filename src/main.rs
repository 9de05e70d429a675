use anyhow::Result;
use clap::{Parser, Subcommand};
use royalbit_ledger::cli::{self, DocumentFormat, OutputFormat, SourceFiles};
use royalbit_ledger::core::RiskInputs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ledger")]
#[command(about = "Schema-driven reconciliation of multi-source tabular records")]
#[command(long_about = "Ledger - Schema-driven reconciliation of multi-source tabular records

Maps CSV sources onto declared columns, derives computed columns, applies
truth-propagating filters, groups by the unique column and totals the sheet.

COMMANDS:
  run           - Reconcile sources against a schema and render the sheet
  stats         - Per-column statistics of a CSV file
  resolve       - Find which header a field name refers to
  stem          - Show the stem of each word
  validate      - Check schema documents
  risk          - Score one entity against a source's statistics
  schema-export - Re-export a schema document as JSON or YAML
  functions     - List the registered row functions

EXAMPLES:
  ledger run sheet.json --source loan=loans.csv --source checking=checking.csv
  ledger stats checking.csv --format yaml
  ledger resolve \"checking.deposit\" --headers \"Account,Total Deposits\"
  ledger risk checking.csv --balance 5000 --checks 12 --deposits 3 --nsf 0")]
#[command(version)]
struct Cli {
    /// Log engine progress (debug level) to stderr
    #[arg(short, long, global = true, env = "LEDGER_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Reconcile sources against a schema and render the sheet.

Each --source names one source and the CSV files loaded for it. All files of
a source are ingested before that source is processed: columns are mapped,
statistics and the risk profile are rebuilt, and computed columns are
recalculated. Cells that cannot be computed are listed on stderr.")]
    /// Reconcile sources against a schema and render the sheet
    Run {
        /// Schema document (.json, .yaml or .yml)
        schema: PathBuf,

        /// Source files as <name>=<csv>[,<csv>...] (repeatable)
        #[arg(short, long = "source", required = true)]
        sources: Vec<SourceFiles>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table", env = "LEDGER_FORMAT")]
        format: OutputFormat,

        /// Write the rendered sheet to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Engine configuration file (.yaml or .json)
        #[arg(short, long, env = "LEDGER_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Per-column statistics of a CSV file
    Stats {
        /// CSV file with a header line
        file: PathBuf,

        /// Source name (defaults to the file stem)
        #[arg(short, long)]
        source: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: DocumentFormat,
    },

    /// Find which header a field name refers to
    Resolve {
        /// Field name, optionally as source.field
        field: String,

        /// Candidate headers, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        headers: Vec<String>,

        /// Direct match only, no synonyms
        #[arg(long)]
        strict: bool,
    },

    /// Show the stem of each word
    Stem {
        #[arg(required = true)]
        words: Vec<String>,
    },

    /// Check schema documents
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    #[command(long_about = "Score one entity against a source's statistics.

The balance, checks, deposits and nsf columns are located among the CSV's
numeric columns by name, then each observed value is placed in a tier
against that column's mean and 2σ/3σ upper bounds. The score is the
weighted sum of the tiers (weights from --config, default 5/5/3/1).")]
    /// Score one entity against a source's statistics
    Risk {
        /// CSV file the statistics are computed from
        file: PathBuf,

        /// Source name (defaults to the file stem)
        #[arg(short, long)]
        source: Option<String>,

        #[arg(long)]
        balance: f64,

        #[arg(long)]
        checks: f64,

        #[arg(long)]
        deposits: f64,

        #[arg(long)]
        nsf: f64,

        /// Engine configuration file (.yaml or .json)
        #[arg(short, long, env = "LEDGER_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Re-export a schema document as JSON or YAML (by output extension)
    SchemaExport {
        input: PathBuf,
        output: PathBuf,
    },

    /// List the registered row functions
    Functions,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("LEDGER_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            schema,
            sources,
            format,
            output,
            config,
        } => cli::run(schema, sources, format, output, config)?,

        Commands::Stats {
            file,
            source,
            format,
        } => cli::stats(file, source, format)?,

        Commands::Resolve {
            field,
            headers,
            strict,
        } => cli::resolve(field, headers, strict)?,

        Commands::Stem { words } => cli::stem(words)?,

        Commands::Validate { files } => cli::validate(files)?,

        Commands::Risk {
            file,
            source,
            balance,
            checks,
            deposits,
            nsf,
            config,
        } => {
            let inputs = RiskInputs {
                balance,
                checks,
                deposits,
                nsf,
            };
            cli::risk(file, source, inputs, config)?
        }

        Commands::SchemaExport { input, output } => cli::schema_export(input, output)?,

        Commands::Functions => cli::functions()?,
    }

    Ok(())
}
