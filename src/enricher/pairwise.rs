use std::time::Instant;

use super::reconciler::reconcile_step;
use super::session::Session;
use crate::domain::Field;
use crate::toolkit::{
    JoinOperation, MatchPolicy, SpatialJoinRequest, Toolkit, ToolkitError, JOIN_COUNT_FIELD,
    TARGET_FID_FIELD,
};

/// Base name of join outputs; suffixed when already taken
pub const JOIN_OUTPUT_NAME: &str = "spatial_join";

/// Spatially join `join` onto every row of `target`, keeping only the
/// keep-list fields.
///
/// Target rows without a matching polygon are kept with null join fields.
/// The output is a new temporary object owned by `session`.
pub fn enrich_points<T: Toolkit>(
    session: &mut Session<'_, T>,
    target: &str,
    join: &str,
    keep_fields: &[String],
) -> Result<String, ToolkitError> {
    enrich_step(session, target, join, keep_fields, &[])
}

/// [`enrich_points`] as one join of a chain; `later_fields` are the fields
/// of the datasets joined after this one
pub(crate) fn enrich_step<T: Toolkit>(
    session: &mut Session<'_, T>,
    target: &str,
    join: &str,
    keep_fields: &[String],
    later_fields: &[Field],
) -> Result<String, ToolkitError> {
    let output = session.unique_name(JOIN_OUTPUT_NAME);

    tracing::info!("Enriching {} with {}", target, join);
    tracing::debug!("Keep fields: {}", keep_fields.join(","));

    let reconciliation = reconcile_step(session, target, join, keep_fields, later_fields)?;

    let request = SpatialJoinRequest {
        target: target.to_string(),
        join: join.to_string(),
        output,
        operation: JoinOperation::OneToOne,
        match_policy: MatchPolicy::KeepAll,
        field_mappings: reconciliation.mappings,
    };

    let started = Instant::now();
    let output = session.toolkit().spatial_join(&request)?;
    session.track(output.as_str());
    tracing::info!(
        "Join processing time: {:.4} seconds",
        started.elapsed().as_secs_f64()
    );

    session
        .toolkit()
        .delete_field(&output, &[JOIN_COUNT_FIELD, TARGET_FID_FIELD])?;

    tracing::info!("Enriched points written to {}", output);

    Ok(output)
}
