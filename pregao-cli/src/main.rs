//! pregao CLI — fetch, load and validate commands.
//!
//! Commands:
//! - `fetch` — download today's index portfolio into the raw directory
//! - `load` — clean raw CSVs into the `dt`-partitioned Parquet dataset
//! - `validate` — print schema and sample rows of a dataset object or prefix
//!
//! Exit status is 1 when a fetch fails, when any file fails to load, or when
//! the validation target cannot be read. Weekends, empty days and an empty raw
//! directory exit 0.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pregao_core::data::{
    fetch_portfolio_day, inspect, load_raw_files, B3PortfolioClient, DatasetStore, FetchOutcome,
    FileOutcome, LoadSummary, DEFAULT_SAMPLE_ROWS,
};
use pregao_core::PipelineConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pregao", about = "pregao — daily B3 index portfolio pipeline")]
struct Cli {
    /// TOML config file. Without it, PREGAO_* environment variables (and .env) are used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the day's index portfolio and write it as a raw CSV.
    Fetch {
        /// Date naming the snapshot (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,
    },
    /// Load raw CSV snapshots into the partitioned dataset and archive them.
    Load,
    /// Print schema and sample rows of a Parquet object or partition prefix.
    Validate {
        /// Local path, file:// URL or s3:// URI.
        target: String,

        /// Number of sample rows to show.
        #[arg(long, default_value_t = DEFAULT_SAMPLE_ROWS)]
        rows: usize,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pregao=info,pregao_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PipelineConfig::from_env().context("loading config from environment")?,
    };

    let ok = match cli.command {
        Commands::Fetch { date } => run_fetch(&config, date.as_deref())?,
        Commands::Load => run_load(&config)?,
        Commands::Validate { target, rows } => run_validate(&target, rows),
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn run_fetch(config: &PipelineConfig, date: Option<&str>) -> Result<bool> {
    let date = date
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("--date must be YYYY-MM-DD")?
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    println!("--- Fetching index portfolio for {date} ---");
    let client = B3PortfolioClient::new(&config.http)?;
    let outcome = fetch_portfolio_day(&client, config, date);

    match &outcome {
        FetchOutcome::Written { path, rows } => {
            println!("Saved {rows} rows to {}", path.display());
        }
        FetchOutcome::Weekend { date } => {
            println!("{date} is a weekend, no trading session to fetch.");
        }
        FetchOutcome::NoData { date } => {
            println!("No portfolio data returned for {date}.");
        }
        FetchOutcome::Failed { date, error } => {
            eprintln!("Fetch for {date} failed: {error}");
        }
    }

    Ok(!outcome.is_failure())
}

fn run_load(config: &PipelineConfig) -> Result<bool> {
    let store = DatasetStore::open(&config.dataset_uri)
        .with_context(|| format!("opening dataset {}", config.dataset_uri))?;

    println!(
        "--- Loading {} into {} ---",
        config.raw_dir.display(),
        store.location()
    );
    let summary = load_raw_files(config, &store);

    match &summary {
        LoadSummary::RawDirMissing { dir } => {
            println!("Raw directory {} not found. Run `pregao fetch` first.", dir.display());
        }
        LoadSummary::ScanFailed { dir, error } => {
            eprintln!("Cannot list {}: {error}", dir.display());
        }
        LoadSummary::Empty { dir } => {
            println!("No CSV files to load in {}.", dir.display());
        }
        LoadSummary::Processed { reports } => {
            for report in reports {
                match &report.outcome {
                    FileOutcome::Loaded {
                        partitions,
                        archived_to,
                    } => {
                        let dates: Vec<String> =
                            partitions.iter().map(|p| p.dt.to_string()).collect();
                        println!(
                            "  OK:   {} -> dt={} (archived to {})",
                            report.file_name(),
                            dates.join(","),
                            archived_to.display()
                        );
                    }
                    FileOutcome::Skipped { reason } => {
                        println!("  SKIP: {} ({reason:?})", report.file_name());
                    }
                    FileOutcome::Failed { error } => {
                        println!("  FAIL: {}: {error}", report.file_name());
                    }
                }
            }
            println!(
                "\nLoad complete: {} loaded, {} skipped, {} failed",
                summary.loaded(),
                summary.skipped(),
                summary.failed()
            );
        }
    }

    Ok(summary.all_succeeded())
}

fn run_validate(target: &str, rows: usize) -> bool {
    println!("--- Validating {target} ---");
    match inspect(target, rows) {
        Ok(inspection) => {
            println!("{inspection}");
            true
        }
        Err(e) => {
            eprintln!("Validation failed: {e}");
            false
        }
    }
}
