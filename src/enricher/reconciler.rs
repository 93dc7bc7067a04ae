use std::collections::HashSet;

use super::report::ConfigWarning;
use super::session::Session;
use crate::domain::Field;
use crate::toolkit::{FieldMappings, Toolkit, ToolkitError};

/// Field mapping for one join, with what could not be satisfied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub mappings: FieldMappings,
    /// Keep-list names present in neither dataset
    pub missing: Vec<String>,
    /// `(join, target)` spatial reference names when they differ
    pub spatial_reference_mismatch: Option<(String, String)>,
}

/// Build a mapping whose outputs are exactly the keep-list fields found in
/// either schema.
///
/// The target table is added first, so a field present in both datasets is
/// read from the target.
pub fn build_field_mappings(
    target: (&str, &[Field]),
    join: (&str, &[Field]),
    keep_fields: &[String],
) -> (FieldMappings, Vec<String>) {
    let mut mappings = FieldMappings::new();
    mappings.add_table(target.0, target.1);
    mappings.add_table(join.0, join.1);

    let keep: HashSet<String> = keep_fields.iter().map(|f| f.to_lowercase()).collect();
    let mapped: HashSet<String> = mappings
        .output_names()
        .iter()
        .map(|name| name.to_lowercase())
        .collect();

    let mut seen = HashSet::new();
    let missing: Vec<String> = keep_fields
        .iter()
        .filter(|field| !mapped.contains(&field.to_lowercase()))
        .filter(|field| seen.insert(field.to_lowercase()))
        .cloned()
        .collect();

    mappings.retain(|map| keep.contains(&map.output_name().to_lowercase()));

    (mappings, missing)
}

/// Reconcile the schemas of `target` and `join` against the keep-list.
///
/// Missing keep fields and spatial reference mismatches are warnings; the
/// join goes ahead with whatever is available.
pub fn reconcile<T: Toolkit>(
    session: &mut Session<'_, T>,
    target: &str,
    join: &str,
    keep_fields: &[String],
) -> Result<Reconciliation, ToolkitError> {
    reconcile_step(session, target, join, keep_fields, &[])
}

/// [`reconcile`] for one join of a chain.
///
/// Keep fields found in `later_fields` (the schemas still to be joined)
/// are not reported as missing.
pub fn reconcile_step<T: Toolkit>(
    session: &mut Session<'_, T>,
    target: &str,
    join: &str,
    keep_fields: &[String],
    later_fields: &[Field],
) -> Result<Reconciliation, ToolkitError> {
    let target_describe = session.toolkit().describe(target)?;
    let join_describe = session.toolkit().describe(join)?;

    let spatial_reference_mismatch = (join_describe.spatial_reference
        != target_describe.spatial_reference)
        .then(|| {
            (
                join_describe.spatial_reference.name.clone(),
                target_describe.spatial_reference.name.clone(),
            )
        });
    if let Some((join_sr, target_sr)) = &spatial_reference_mismatch {
        session.report().warn(ConfigWarning::SpatialReferenceMismatch {
            join: join_sr.clone(),
            target: target_sr.clone(),
        });
    }

    let target_fields = session.toolkit().list_fields(target)?;
    let join_fields = session.toolkit().list_fields(join)?;
    let (mappings, mut missing) =
        build_field_mappings((target, &target_fields), (join, &join_fields), keep_fields);
    missing.retain(|name| !later_fields.iter().any(|field| field.matches(name)));

    if !missing.is_empty() {
        session.report().warn(ConfigWarning::MissingKeepFields {
            target: target.to_string(),
            join: join.to_string(),
            fields: missing.clone(),
        });
    }

    Ok(Reconciliation {
        mappings,
        missing,
        spatial_reference_mismatch,
    })
}
