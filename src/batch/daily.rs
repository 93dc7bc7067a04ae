use chrono::NaiveDateTime;

use crate::config::DailyConfig;
use crate::enricher::{enrich_multiple, select_yesterday, EnrichmentReport, Session};
use crate::toolkit::{Toolkit, ToolkitError};

#[derive(Debug, Clone)]
pub struct DailyOutcome {
    /// Rows selected for yesterday
    pub window_rows: usize,
    /// Rows written to the destination
    pub output_rows: usize,
    pub destination: String,
    pub report: EnrichmentReport,
}

/// Enrich yesterday's points and replace the destination table with them.
///
/// Every temporary object is deleted before returning, on success and on
/// failure.
pub fn run_daily<T: Toolkit>(
    toolkit: &mut T,
    config: &DailyConfig,
    today: Option<NaiveDateTime>,
) -> Result<DailyOutcome, ToolkitError> {
    let mut session = Session::new(toolkit);

    let view = select_yesterday(
        &mut session,
        &config.source_path,
        &config.table_name,
        &config.date_field,
        today,
    )?;

    let window_rows = session.toolkit().get_count(&view)?;
    tracing::info!("Query layer point count: {}", window_rows);

    let enriched = enrich_multiple(
        &mut session,
        &view,
        &config.auxiliary_datasets,
        &config.keep_fields,
    )?;

    session
        .toolkit()
        .copy_features(&enriched, &config.destination_path)?;
    let output_rows = session.toolkit().get_count(&config.destination_path)?;
    tracing::info!(
        "Wrote {} enriched points to {}",
        output_rows,
        config.destination_path
    );

    session.release(&enriched)?;

    Ok(DailyOutcome {
        window_rows,
        output_rows,
        destination: config.destination_path.clone(),
        report: session.take_report(),
    })
}
