use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use zonal_harvest::app::{App, LogSink, PlanResult, ProgressSink, VariablesResult};
use zonal_harvest::config::{ConfigLoader, Credentials, ResolvedConfig};
use zonal_harvest::convert::ConvertOutcome;
use zonal_harvest::engine::{DryRunEngine, EarthEngineHttpClient, EngineClient};
use zonal_harvest::error::HarvestError;
use zonal_harvest::job::ExportJob;
use zonal_harvest::output::{JsonOutput, OutputMode};
use zonal_harvest::storage::{GcsHttpClient, RemoteObject, StorageClient};
use zonal_harvest::submit::{SubmissionReport, SubmissionStatus};
use zonal_harvest::throttle::{BatchCooldown, Unthrottled};

#[derive(Parser)]
#[command(name = "zonal-harvest")]
#[command(about = "Monthly zonal-statistics exports and Parquet conversion of the results")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Run configuration file (defaults to ./zonal-harvest.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Submit one export task per variable, year and month")]
    Export(ExportArgs),
    #[command(about = "List the export jobs without submitting them")]
    Plan(PlanArgs),
    #[command(about = "Download exported feature collections and convert them to Parquet")]
    Convert(ConvertArgs),
    #[command(about = "Show the dataset registry")]
    Variables,
}

#[derive(Args, Clone)]
struct ExportArgs {
    /// Record the jobs locally instead of contacting Earth Engine
    #[arg(long)]
    dry_run: bool,

    #[arg(long = "variable")]
    variables: Vec<String>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    cooldown_secs: Option<u64>,
}

#[derive(Args, Clone)]
struct PlanArgs {
    #[arg(long = "variable")]
    variables: Vec<String>,
}

#[derive(Args, Clone)]
struct ConvertArgs {
    /// Directory the local record and table tree is written under
    #[arg(long, default_value = ".")]
    output_root: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::MissingEnv(_)
        | HarvestError::CredentialsRead(_)
        | HarvestError::CredentialsParse(_)
        | HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::InvalidConfig(_)
        | HarvestError::UnknownVariable(_) => 2,
        HarvestError::EngineHttp(_)
        | HarvestError::EngineStatus { .. }
        | HarvestError::StorageHttp(_)
        | HarvestError::StorageStatus { .. } => 3,
        HarvestError::RejectedSubmissions(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = OutputMode::from_flag(cli.non_interactive);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Export(args) => run_export(args, config_path, output_mode),
        Commands::Plan(args) => {
            let config = resolve_config(config_path, args.variables, None, None)?;
            let app = App::new(config, NopEngine, NopStorage);
            let result = app.plan()?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_plan(&result).into_diagnostic(),
                OutputMode::Interactive => {
                    print_plan(&result);
                    Ok(())
                }
            }
        }
        Commands::Convert(args) => {
            let config = resolve_config(config_path, Vec::new(), None, None)?;
            let credentials = Credentials::from_env()?;
            let storage = GcsHttpClient::new(&credentials)?;
            let app = App::new(config, NopEngine, storage);
            let result = app.convert(args.output_root, sink_for(output_mode))?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_convert(&result).into_diagnostic(),
                OutputMode::Interactive => {
                    print_convert_summary(&result);
                    Ok(())
                }
            }
        }
        Commands::Variables => {
            let config = resolve_config(config_path, Vec::new(), None, None)?;
            let app = App::new(config, NopEngine, NopStorage);
            let result = app.variables();
            match output_mode {
                OutputMode::NonInteractive => {
                    JsonOutput::print_variables(&result).into_diagnostic()
                }
                OutputMode::Interactive => {
                    print_variables(&result);
                    Ok(())
                }
            }
        }
    }
}

fn resolve_config(
    path: Option<&str>,
    variables: Vec<String>,
    batch_size: Option<usize>,
    cooldown_secs: Option<u64>,
) -> Result<ResolvedConfig, HarvestError> {
    let mut config = ConfigLoader::load(path)?;
    if !variables.is_empty() {
        config.variables = variables;
    }
    if batch_size.is_some() {
        config.batch_size = batch_size;
    }
    if cooldown_secs.is_some() {
        config.cooldown_secs = cooldown_secs;
    }
    ConfigLoader::resolve_config(config)
}

fn sink_for(output_mode: OutputMode) -> &'static dyn ProgressSink {
    match output_mode {
        OutputMode::NonInteractive => &JsonOutput,
        OutputMode::Interactive => &LogSink,
    }
}

fn run_export(
    args: ExportArgs,
    config_path: Option<&str>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let config = resolve_config(
        config_path,
        args.variables,
        args.batch_size,
        args.cooldown_secs,
    )?;
    let sink = sink_for(output_mode);

    let report = if args.dry_run {
        let app = App::new(config, DryRunEngine::new(), NopStorage);
        app.export(&mut Unthrottled, sink)?
    } else {
        let credentials = Credentials::from_env()?;
        let engine = EarthEngineHttpClient::new(&credentials)?;
        let mut throttle = BatchCooldown::new(config.batch_size, config.cooldown);
        let app = App::new(config, engine, NopStorage);
        app.export(&mut throttle, sink)?
    };

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_export(&report).into_diagnostic()?,
        OutputMode::Interactive => print_export_summary(&report, args.dry_run),
    }

    if report.rejected() > 0 {
        return Err(HarvestError::RejectedSubmissions(report.rejected()).into());
    }
    Ok(())
}

fn print_plan(result: &PlanResult) {
    for entry in &result.jobs {
        println!(
            "{:<28} {:<10} {:<5} {}",
            entry.description,
            entry.composite.to_string(),
            entry.scale,
            entry.object_name
        );
    }
    println!("{} jobs", result.jobs.len());
}

fn print_variables(result: &VariablesResult) {
    for spec in &result.variables {
        println!(
            "{:<13} {:<40} {:>6} m  {:<16} {}",
            spec.name,
            spec.collection_id,
            spec.scale,
            spec.band,
            spec.aggregation
        );
    }
}

fn print_export_summary(report: &SubmissionReport, dry_run: bool) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    if dry_run {
        println!("{cyan}zonal-harvest dry run (nothing was sent){reset}");
    } else {
        println!("{cyan}zonal-harvest export summary{reset}");
    }
    println!("{green}All {} tasks submitted{reset}", report.started());
    if !report.pauses.is_empty() {
        println!("Paused {} times", report.pauses.len());
    }
    if report.rejected() > 0 {
        println!("{yellow}Rejected: {}{reset}", report.rejected());
        for handle in &report.handles {
            if let SubmissionStatus::Rejected { reason } = &handle.status {
                println!("{yellow}  {} {reason}{reset}", handle.description);
            }
        }
    }
}

fn print_convert_summary(outcome: &ConvertOutcome) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let reset = "\x1b[0m";

    match outcome {
        ConvertOutcome::NoObjects { prefix } => {
            println!(
                "{yellow}No files found under {prefix}/. The export may still be running.{reset}"
            );
        }
        ConvertOutcome::Converted { files } => {
            for file in files {
                println!("{green}{} ({} rows){reset}", file.table_path, file.rows);
            }
            println!("{green}Conversion complete: {} files{reset}", files.len());
        }
    }
}

struct NopEngine;
struct NopStorage;

impl EngineClient for NopEngine {
    fn start_export(&self, _job: &ExportJob) -> Result<String, HarvestError> {
        Err(HarvestError::EngineHttp(
            "Earth Engine client not configured".to_string(),
        ))
    }
}

impl StorageClient for NopStorage {
    fn list(&self, _prefix: &str) -> Result<Vec<RemoteObject>, HarvestError> {
        Err(HarvestError::StorageHttp(
            "Cloud Storage client not configured".to_string(),
        ))
    }

    fn fetch_text(&self, _name: &str) -> Result<String, HarvestError> {
        Err(HarvestError::StorageHttp(
            "Cloud Storage client not configured".to_string(),
        ))
    }
}
