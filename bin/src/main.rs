//! CLI for the loadprep feature pipeline.
//!
//! This binary runs the pipeline described by a JSON configuration file and
//! lists the sources a configuration would join.

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use loadprep::{Pipeline, RunConfig, config::config_date};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::{Level, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loadprep")]
#[command(about = "Feature assembly for hourly electricity consumption forecasting", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the feature matrix and write the historical/forecast pair
    Run {
        /// Run configuration (JSON)
        #[arg(long)]
        config: PathBuf,
        /// Run time stamp for artifact names, `YYYY-MM-DD[ HH:MM[:SS]]` (default: now)
        #[arg(long, value_parser = parse_run_time)]
        run_time: Option<NaiveDateTime>,
    },
    /// List the sources a configuration joins, in join order
    Sources {
        /// Run configuration (JSON)
        #[arg(long)]
        config: PathBuf,
    },
}

fn parse_run_time(value: &str) -> Result<NaiveDateTime, String> {
    config_date::parse(value).ok_or_else(|| format!("invalid run time `{value}`"))
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Commands::Run { config, run_time } => run(&config, run_time),
        Commands::Sources { config } => list_sources(&config),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Run the pipeline and print where the artifacts went.
fn run(config_path: &Path, run_time: Option<NaiveDateTime>) -> loadprep::Result<()> {
    let config = RunConfig::from_path(config_path)?;
    let run_time = run_time.unwrap_or_else(|| chrono::Local::now().naive_local());
    let report = Pipeline::new(&config).run(run_time)?;

    println!("Sources: {}", report.sources.join(", "));
    println!("Aligned: {} rows x {} columns", report.aligned_rows, report.columns);
    println!(
        "Historical: {} rows -> {}",
        report.historical_rows,
        report.layout.historical.display()
    );
    println!(
        "Forecast: {} rows -> {}",
        report.forecast_rows,
        report.layout.forecast.display()
    );
    Ok(())
}

/// List the configured sources with their inputs.
fn list_sources(config_path: &Path) -> loadprep::Result<()> {
    let config = RunConfig::from_path(config_path)?;
    let registry = Pipeline::new(&config).build_registry()?;

    println!("Sources ({} total, in join order)\n", registry.len());
    for info in registry.all_info() {
        println!("{} [{}] - {}", info.name, info.kind, info.description);
        for col in &info.required_columns {
            println!("  - {}", col);
        }
    }
    Ok(())
}
