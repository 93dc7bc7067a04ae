use anyhow::{Context, Result};
use glob::glob;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::config::LoggingConfig;

fn backup_path(log_file: &Path, n: usize) -> PathBuf {
    PathBuf::from(format!("{}.{}", log_file.display(), n))
}

/// Start a fresh log file, keeping up to `backup_count` previous ones as
/// `<log>.1` (newest) to `<log>.N`
pub fn roll_over(log_file: &Path, backup_count: usize) -> Result<()> {
    // Backups numbered past the limit would never be shifted out
    let pattern = format!("{}.*", log_file.display());
    for path in glob(&pattern)
        .context(format!("Invalid log file pattern: {}", pattern))?
        .filter_map(|p| p.ok())
    {
        let index = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse::<usize>().ok());
        if index.is_some_and(|n| n >= backup_count) {
            std::fs::remove_file(&path)
                .context(format!("Failed to remove old log {:?}", path))?;
        }
    }

    if !log_file.exists() {
        return Ok(());
    }
    if backup_count == 0 {
        return std::fs::remove_file(log_file)
            .context(format!("Failed to remove log {:?}", log_file));
    }

    for n in (1..backup_count).rev() {
        let from = backup_path(log_file, n);
        if from.exists() {
            std::fs::rename(&from, backup_path(log_file, n + 1))
                .context(format!("Failed to rotate {:?}", from))?;
        }
    }
    std::fs::rename(log_file, backup_path(log_file, 1))
        .context(format!("Failed to rotate {:?}", log_file))
}

/// Install the global subscriber: INFO and above on the console, DEBUG and
/// above in the log file.
///
/// `RUST_LOG` overrides the configured filter.
pub fn init(config: &LoggingConfig) -> Result<()> {
    roll_over(&config.log_file, config.backup_count)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .context(format!("Failed to open log file {:?}", config.log_file))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_filter(LevelFilter::INFO),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::DEBUG),
        )
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(())
}
