use std::collections::HashSet;

use super::pairwise::enrich_step;
use super::report::ConfigWarning;
use super::session::Session;
use crate::domain::Field;
use crate::toolkit::{Toolkit, ToolkitError};

/// Count how often each keep-list field occurs across `schemas`.
///
/// Returns `(field, count)` for every keep field, in keep-list order and
/// without case-insensitive duplicates.
pub fn count_field_occurrences(schemas: &[Vec<Field>], keep_fields: &[String]) -> Vec<(String, usize)> {
    let names: Vec<String> = schemas
        .iter()
        .flatten()
        .map(|field| field.name.to_lowercase())
        .collect();

    let mut seen = HashSet::new();
    keep_fields
        .iter()
        .filter(|field| seen.insert(field.to_lowercase()))
        .map(|field| {
            let lowered = field.to_lowercase();
            let count = names.iter().filter(|name| **name == lowered).count();
            (field.clone(), count)
        })
        .collect()
}

/// Enrich `points` with each dataset in `datasets`, in order.
///
/// The output of each join is the target of the next one and is deleted
/// once consumed. A keep field is only reported missing by a join when no
/// later dataset has it either. A keep field present in more than one
/// dataset is reported; its value comes from the first dataset that has it,
/// the points first.
///
/// # Returns
/// The final enriched object, owned by `session`; `points` itself when
/// `datasets` is empty
pub fn enrich_multiple<T: Toolkit>(
    session: &mut Session<'_, T>,
    points: &str,
    datasets: &[String],
    keep_fields: &[String],
) -> Result<String, ToolkitError> {
    let mut schemas = vec![session.toolkit().list_fields(points)?];
    for dataset in datasets {
        schemas.push(session.toolkit().list_fields(dataset)?);
    }

    for (field, count) in count_field_occurrences(&schemas, keep_fields) {
        if count > 1 {
            session
                .report()
                .warn(ConfigWarning::AmbiguousField { field, count });
        }
    }

    let mut enriched = points.to_string();
    for (step, dataset) in datasets.iter().enumerate() {
        let later_fields = schemas[step + 2..].concat();
        let previous = enriched;
        enriched = enrich_step(session, &previous, dataset, keep_fields, &later_fields)?;
        session.release(&previous)?;
    }

    Ok(enriched)
}
