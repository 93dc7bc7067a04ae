use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use point_enricher::batch::run_daily;
use point_enricher::config::{self, Config};
use point_enricher::domain::window::start_of_day;
use point_enricher::exit::ExitStatus;
use point_enricher::toolkit::MemoryWorkspace;

#[derive(Parser, Debug)]
#[command(name = "enrich")]
#[command(about = "Enrich yesterday's collar points with polygon attributes", long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Process the day before this date (YYYY-MM-DD) instead of yesterday
    #[arg(long)]
    today: Option<NaiveDate>,
}

fn run(args: &Args, config: &Config) -> Result<ExitStatus> {
    let daily = config.daily()?;

    tracing::info!("Starting daily enrichment");
    tracing::info!("Source: {} / {}", daily.source_path, daily.table_name);
    tracing::info!("Auxiliary datasets: {}", daily.auxiliary_datasets.join(", "));

    let mut workspace = MemoryWorkspace::new();
    let outcome = run_daily(&mut workspace, daily, args.today.map(start_of_day))
        .context("Daily enrichment failed")?;

    tracing::info!(
        "Daily enrichment completed: {} points selected, {} written to {}",
        outcome.window_rows,
        outcome.output_rows,
        outcome.destination
    );

    Ok(ExitStatus::from_report(&outcome.report))
}

fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config_path = config::resolve_path(args.config.clone());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{:#}", anyhow::Error::new(err));
            return ExitStatus::InvalidConfiguration.into();
        }
    };

    if let Err(err) = point_enricher::logging::init(&config.logging) {
        eprintln!("{:#}", err);
        return ExitStatus::InvalidConfiguration.into();
    }
    tracing::info!("Configuration: {:?}", config_path);

    let status = match run(&args, &config) {
        Ok(status) => status,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitStatus::from_error(&err)
        }
    };

    tracing::info!("Exit status: {:?}", status);
    status.into()
}
