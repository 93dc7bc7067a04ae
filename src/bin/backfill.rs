use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use point_enricher::batch::{run_backfill, Checkpoint};
use point_enricher::config::{self, Config};
use point_enricher::exit::ExitStatus;
use point_enricher::toolkit::MemoryWorkspace;

#[derive(Parser, Debug)]
#[command(name = "backfill")]
#[command(about = "Append historical collar points, enriched window by window, to a master table")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ignore any saved checkpoint and start from the first window
    #[arg(long)]
    restart: bool,
}

fn run(args: &Args, config: &Config) -> Result<ExitStatus> {
    let backfill = config.backfill()?;

    tracing::info!("Starting backfill into {}", backfill.master_table);
    tracing::info!("Auxiliary dataset: {}", backfill.auxiliary_dataset);

    let checkpoint = backfill.checkpoint_path.as_ref().map(Checkpoint::new);
    if let Some(checkpoint) = &checkpoint {
        tracing::info!("Checkpoint: {:?}", checkpoint.path());
        if args.restart {
            checkpoint.clear()?;
        }
    }

    let mut workspace = MemoryWorkspace::new();
    let outcome = run_backfill(&mut workspace, backfill, checkpoint.as_ref())
        .context("Backfill aborted")?;

    tracing::info!(
        "Backfill process completed: {} windows, {} points appended",
        outcome.windows,
        outcome.appended_rows
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
