use crate::config::BackfillConfig;
use crate::domain::window::TIMESTAMP_FORMAT;
use crate::domain::TimeWindow;
use crate::enricher::{enrich_points, select_window, EnrichmentReport, Session};
use crate::toolkit::{SchemaCheck, Toolkit, ToolkitError};

use super::checkpoint::{Checkpoint, CheckpointError};

#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    #[error("backfill window starting {window} failed")]
    Toolkit {
        window: String,
        #[source]
        source: ToolkitError,
    },

    /// The checkpoint could not be read before the first window
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The window was appended but its completion could not be recorded
    #[error("failed to record backfill progress up to {window}")]
    CheckpointSave {
        window: String,
        #[source]
        source: CheckpointError,
    },
}

#[derive(Debug, Clone, Default)]
pub struct BackfillOutcome {
    /// Windows processed by this run
    pub windows: usize,
    pub appended_rows: usize,
    pub report: EnrichmentReport,
}

/// Join one window of points against the auxiliary dataset and append the
/// result to the master table
fn process_window<T: Toolkit>(
    toolkit: &mut T,
    config: &BackfillConfig,
    window: TimeWindow,
) -> Result<(usize, EnrichmentReport), ToolkitError> {
    let mut session = Session::new(toolkit);

    let view = select_window(
        &mut session,
        &config.source_path,
        &config.table_name,
        &config.date_field,
        window,
    )?;
    let joined = enrich_points(
        &mut session,
        &view,
        &config.auxiliary_dataset,
        &config.keep_fields,
    )?;
    session.release(&view)?;

    let rows = session.toolkit().get_count(&joined)?;
    session
        .toolkit()
        .append(&joined, &config.master_table, SchemaCheck::NoTest)?;
    session.release(&joined)?;

    Ok((rows, session.take_report()))
}

/// Walk the configured range window by window, appending each to the master
/// table.
///
/// With a checkpoint, every completed window is recorded and a later run
/// resumes after the last one. A failed window stops the backfill; the
/// windows before it stay appended.
pub fn run_backfill<T: Toolkit>(
    toolkit: &mut T,
    config: &BackfillConfig,
    checkpoint: Option<&Checkpoint>,
) -> Result<BackfillOutcome, BackfillError> {
    let plan = config.plan();
    let resume_from = match checkpoint {
        Some(checkpoint) => checkpoint.load()?,
        None => None,
    };

    let windows: Box<dyn Iterator<Item = TimeWindow>> = match resume_from {
        Some(last_stop) => {
            tracing::info!(
                "Resuming backfill after {}",
                last_stop.format(TIMESTAMP_FORMAT)
            );
            Box::new(plan.resume_after(last_stop))
        }
        None => Box::new(plan.windows()),
    };

    let mut outcome = BackfillOutcome::default();

    for window in windows {
        tracing::info!(
            "Backfill window {} to {}",
            window.start.format(TIMESTAMP_FORMAT),
            window.end.format(TIMESTAMP_FORMAT)
        );

        let (rows, report) =
            process_window(toolkit, config, window).map_err(|source| BackfillError::Toolkit {
                window: window.start.format(TIMESTAMP_FORMAT).to_string(),
                source,
            })?;

        tracing::info!("Appended {} points to {}", rows, config.master_table);
        outcome.windows += 1;
        outcome.appended_rows += rows;
        outcome.report.merge(report);

        if let Some(checkpoint) = checkpoint {
            checkpoint
                .save(window.end)
                .map_err(|source| BackfillError::CheckpointSave {
                    window: window.end.format(TIMESTAMP_FORMAT).to_string(),
                    source,
                })?;
        }
    }

    tracing::info!(
        "Backfill finished: {} windows, {} points appended",
        outcome.windows,
        outcome.appended_rows
    );

    Ok(outcome)
}
