mod registry;
mod settings;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use cheesetrace_core::{Error as CoreError, Subsystem};
use cheesetrace_eval::{EvalError, Verifier, VerifyOptions, collect_schema_metrics};
use cheesetrace_generate::{GenerationError, GenerationReport, MissingParentPolicy, Orchestrator};
use cheesetrace_store::{
    SchemaSource, StoreError, TableCounts, export_tables, introspect_store, lot_traceability,
    open_store, table_counts,
};
use registry::{RunContext, init_logging, start_run, write_report};
use settings::{
    DEFAULT_CONFIG_PATH, Settings, SettingsError, load_settings, save_settings, write_json_atomic,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("verification error: {0}")]
    Eval(#[from] EvalError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("store failed verification with {0} violation(s)")]
    Verification(usize),
}

#[derive(Parser, Debug)]
#[command(name = "cheesetrace", version, about = "Synthetic cheese traceability dataset generator")]
struct Cli {
    /// Settings file; cheesetrace.toml is read when present.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the store and generate every date in the range.
    Generate(GenerateArgs),
    /// Generate January 2024, then print counts and a traceability sample.
    QuickStart(QuickStartArgs),
    /// Print row counts for every table.
    Counts(StoreArgs),
    /// Check a generated store for integrity violations.
    Verify(VerifyArgs),
    /// Write the introspected store schema as JSON.
    Inspect(InspectArgs),
    /// Write every table to CSV.
    Export(ExportArgs),
    /// Write a settings file with default values.
    InitConfig(InitConfigArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// SQLite file to (re)create.
    #[arg(long)]
    database: Option<PathBuf>,
    /// First date to generate.
    #[arg(long, value_name = "YYYY-MM-DD")]
    start: Option<NaiveDate>,
    /// Last date to generate, inclusive.
    #[arg(long, value_name = "YYYY-MM-DD")]
    end: Option<NaiveDate>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    lot_prefix: Option<String>,
    /// What dependent stages do without a lot: synthesize or skip.
    #[arg(long)]
    policy: Option<MissingParentPolicy>,
    #[arg(long)]
    genealogy_probability: Option<f64>,
    /// Directory of NN_name.sql files replacing the embedded schema.
    #[arg(long)]
    schema_dir: Option<PathBuf>,
    /// Output directory for runs.
    #[arg(long)]
    run_dir: Option<PathBuf>,
}

impl GenerateArgs {
    fn apply(self, settings: &mut Settings) {
        if let Some(database) = self.database {
            settings.database = database;
        }
        if let Some(start) = self.start {
            settings.start_date = start;
        }
        if let Some(end) = self.end {
            settings.end_date = end;
        }
        if let Some(seed) = self.seed {
            settings.generation.seed = seed;
        }
        if let Some(prefix) = self.lot_prefix {
            settings.generation.lot_prefix = prefix;
        }
        if let Some(policy) = self.policy {
            settings.generation.missing_parent_policy = policy;
        }
        if let Some(probability) = self.genealogy_probability {
            settings.generation.genealogy_probability = probability;
        }
        if self.schema_dir.is_some() {
            settings.schema_dir = self.schema_dir;
        }
        if let Some(run_dir) = self.run_dir {
            settings.run_dir = run_dir;
        }
    }
}

#[derive(Args, Debug)]
struct QuickStartArgs {
    /// Replace an existing store without asking.
    #[arg(long, short = 'y', default_value_t = false)]
    yes: bool,
    #[arg(long)]
    database: Option<PathBuf>,
    /// Traceability rows to print.
    #[arg(long, default_value_t = 5)]
    rows: usize,
}

#[derive(Args, Debug)]
struct StoreArgs {
    #[arg(long)]
    database: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    #[arg(long)]
    database: Option<PathBuf>,
    /// Directory for metrics.json and report.md.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, default_value_t = 20)]
    max_examples: usize,
    /// Also write violations.json (requires --out).
    #[arg(long, default_value_t = false)]
    write_violations: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[arg(long)]
    database: Option<PathBuf>,
    /// Output path for schema.json.
    #[arg(long, default_value = "schema.json")]
    out: PathBuf,
    /// Optional output path for schema metrics.
    #[arg(long)]
    metrics: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[arg(long)]
    database: Option<PathBuf>,
    /// Directory receiving one CSV per table.
    #[arg(long, default_value = "export")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct InitConfigArgs {
    /// Overwrite an existing file.
    #[arg(long, default_value_t = false)]
    force: bool,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Command::Generate(args) => run_generate(config, args),
        Command::QuickStart(args) => run_quick_start(config, args),
        Command::Counts(args) => run_counts(config, args),
        Command::Verify(args) => run_verify(config, args),
        Command::Inspect(args) => run_inspect(config, args),
        Command::Export(args) => run_export(config, args),
        Command::InitConfig(args) => run_init_config(config, args),
    }
}

fn run_generate(config: Option<&Path>, args: GenerateArgs) -> Result<(), CliError> {
    let mut settings = load_settings(config)?;
    args.apply(&mut settings);
    let report = execute_generation(&settings, "generate")?;
    print_summary(&report);
    Ok(())
}

fn run_quick_start(config: Option<&Path>, args: QuickStartArgs) -> Result<(), CliError> {
    let mut settings = load_settings(config)?;
    let defaults = Settings::default();
    settings.start_date = defaults.start_date;
    settings.end_date = defaults.end_date;
    if let Some(database) = args.database {
        settings.database = database;
    }

    if settings.database.exists() && !args.yes {
        let question = format!(
            "{} exists and will be replaced. Continue? [y/N] ",
            settings.database.display()
        );
        if !confirm(&question)? {
            println!("aborted; nothing was changed");
            return Ok(());
        }
    }

    let report = execute_generation(&settings, "quick-start")?;
    print_summary(&report);

    let conn = open_store(&settings.database)?;
    println!();
    print_counts(&table_counts(&conn)?);
    println!();
    println!("lot traceability (first {} lots):", args.rows);
    println!(
        "{:<16} {:<10} {:>7} {:>6} {:>9} {:>8} {:>9} {:<12} {:<12}",
        "lot", "date", "batches", "aging", "qc pass", "packages", "shipments", "packaged", "first pickup"
    );
    for row in lot_traceability(&conn, args.rows)? {
        println!(
            "{:<16} {:<10} {:>7} {:>6} {:>9} {:>8} {:>9} {:<12} {:<12}",
            row.lot_number,
            row.lot_date,
            row.batch_count,
            row.aging_lot_count,
            format!("{}/{}", row.quality_tests_passed, row.quality_test_count),
            row.package_count,
            row.shipment_count,
            row.first_packaging_date.as_deref().unwrap_or("-"),
            row.first_pickup_date.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn run_counts(config: Option<&Path>, args: StoreArgs) -> Result<(), CliError> {
    init_logging(None)?;
    let database = resolve_database(config, args.database)?;
    let conn = open_store(&database)?;
    print_counts(&table_counts(&conn)?);
    Ok(())
}

fn run_verify(config: Option<&Path>, args: VerifyArgs) -> Result<(), CliError> {
    init_logging(None)?;
    let settings = load_settings(config)?;
    let database = args.database.unwrap_or(settings.database);
    if args.write_violations && args.out.is_none() {
        return Err(CliError::InvalidConfig(
            "--write-violations requires --out".to_string(),
        ));
    }

    let conn = open_store(&database)?;
    let verifier = Verifier::new(VerifyOptions {
        lot_prefix: settings.generation.lot_prefix,
        strict: false,
        max_examples: args.max_examples,
        write_violations: args.write_violations,
        out_dir: args.out,
    });
    let result = verifier.run(&conn, Some(database.display().to_string()))?;
    println!("{}", result.report);
    if let Some(path) = &result.report_path {
        info!(event = "report_written", path = %path.display());
    }

    if result.passed() {
        Ok(())
    } else {
        Err(CliError::Verification(result.violations.len()))
    }
}

fn run_inspect(config: Option<&Path>, args: InspectArgs) -> Result<(), CliError> {
    init_logging(None)?;
    let database = resolve_database(config, args.database)?;
    let conn = open_store(&database)?;

    let schema = introspect_store(&conn, Some(database.display().to_string()))?;
    schema.validate()?;
    write_json_atomic(&args.out, &schema)?;
    info!(event = "schema_written", path = %args.out.display());

    let metrics = collect_schema_metrics(&schema);
    if let Some(path) = &args.metrics {
        write_json_atomic(path, &metrics)?;
        info!(event = "metrics_written", path = %path.display());
    }
    for warning in &metrics.warnings {
        warn!(event = "schema_warning", message = %warning);
    }
    println!(
        "{} tables, {} views, {} columns, {} foreign keys, {} indexes",
        metrics.counts.tables,
        metrics.counts.views,
        metrics.counts.columns,
        metrics.counts.foreign_keys,
        metrics.counts.indexes
    );
    println!(
        "{} lot-owned tables reference lot_master, {} do not",
        metrics.lot_links.linked.len(),
        metrics.lot_links.unlinked.len()
    );
    Ok(())
}

fn run_export(config: Option<&Path>, args: ExportArgs) -> Result<(), CliError> {
    init_logging(None)?;
    let database = resolve_database(config, args.database)?;
    let conn = open_store(&database)?;
    let exported = export_tables(&conn, &args.out)?;
    for table in &exported {
        println!("{:<32} {:>8}  {}", table.table, table.rows, table.path.display());
    }
    info!(event = "export_finished", tables = exported.len(), dir = %args.out.display());
    Ok(())
}

fn run_init_config(config: Option<&Path>, args: InitConfigArgs) -> Result<(), CliError> {
    let path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    if path.exists() && !args.force {
        return Err(CliError::InvalidConfig(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }
    save_settings(&path, &Settings::default())?;
    println!("wrote {}", path.display());
    Ok(())
}

/// Creates the run directory, installs logging into it, then generates.
fn execute_generation(settings: &Settings, command: &str) -> Result<GenerationReport, CliError> {
    let range = settings.range()?;
    let source = settings.schema_source();
    let run_id = Uuid::new_v4().to_string();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        command: command.to_string(),
        run_dir: settings.run_dir.clone(),
        database: settings.database.clone(),
        schema_source: describe_source(&source),
        start_date: range.start(),
        end_date: range.end(),
        options: settings.generation.clone(),
    };

    let run_paths = start_run(&run_ctx)?;
    init_logging(Some(&run_paths.logs_path))?;
    info!(
        event = "run_started",
        run_id = %run_id,
        command,
        config = %run_paths.config_path.display()
    );

    let report = Orchestrator::new(settings.generation.clone())
        .with_run_id(run_id.clone())
        .run(&settings.database, range, &source)?;

    write_report(&run_paths, &report)?;
    info!(event = "report_written", path = %run_paths.report_path.display());
    if report.has_failures() {
        warn!(
            event = "stage_failures",
            failures = report.failures.len(),
            report = %run_paths.report_path.display(),
            "some stage invocations failed"
        );
    }
    info!(
        event = "run_finished",
        run_id = %run_id,
        duration_ms = report.duration_ms,
        run_dir = %run_paths.root.display()
    );
    Ok(report)
}

fn resolve_database(config: Option<&Path>, database: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match database {
        Some(database) => Ok(database),
        None => Ok(load_settings(config)?.database),
    }
}

fn describe_source(source: &SchemaSource) -> String {
    match source {
        SchemaSource::Embedded => "embedded".to_string(),
        SchemaSource::Directory(dir) => dir.display().to_string(),
    }
}

fn confirm(question: &str) -> Result<bool, CliError> {
    let mut stdout = io::stdout();
    write!(stdout, "{question}")?;
    stdout.flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_summary(report: &GenerationReport) {
    println!(
        "generated {} lot(s) from {} to {} in {} ms (seed {})",
        report.lots_processed, report.start_date, report.end_date, report.duration_ms, report.seed
    );
    for subsystem in Subsystem::ALL {
        let table = subsystem.primary_table();
        let rows = report.table_counts.get(table).copied().unwrap_or(0);
        println!("  {:<14} {:<30} {:>8}", subsystem.id(), table, rows);
    }
    if report.has_failures() {
        println!("{} stage invocation(s) failed:", report.failures.len());
        for failure in &report.failures {
            println!("  {} {}: {}", failure.date, failure.stage, failure.message);
        }
    }
}

fn print_counts(counts: &TableCounts) {
    for (table, rows) in counts.iter() {
        println!("{table:<32} {rows:>8}");
    }
    println!("{:<32} {:>8}", "total", counts.total_rows());
    let empty = counts.empty_tables();
    if !empty.is_empty() {
        println!("empty tables: {}", empty.join(", "));
    }
}
