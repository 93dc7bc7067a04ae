use chrono::{Local, NaiveDateTime};
use std::time::Instant;

use super::session::Session;
use crate::domain::window::TIMESTAMP_FORMAT;
use crate::domain::TimeWindow;
use crate::toolkit::{Toolkit, ToolkitError, ViewQuery};

/// Base name of the filtered view; suffixed when already taken
pub const VIEW_NAME: &str = "date_query_result";

/// Create a view over the rows of `table` dated the day before `today`.
///
/// # Arguments
/// * `workspace` - Location of the source table
/// * `table` - Source table name
/// * `date_field` - Timestamp field the window applies to
/// * `today` - Reference time, the local current time when `None`
///
/// # Returns
/// The name of the view, owned by `session`
pub fn select_yesterday<T: Toolkit>(
    session: &mut Session<'_, T>,
    workspace: &str,
    table: &str,
    date_field: &str,
    today: Option<NaiveDateTime>,
) -> Result<String, ToolkitError> {
    let today = today.unwrap_or_else(|| Local::now().naive_local());
    select_window(
        session,
        workspace,
        table,
        date_field,
        TimeWindow::yesterday(today),
    )
}

/// Create a view over the rows of `table` whose `date_field` falls in `window`
pub fn select_window<T: Toolkit>(
    session: &mut Session<'_, T>,
    workspace: &str,
    table: &str,
    date_field: &str,
    window: TimeWindow,
) -> Result<String, ToolkitError> {
    tracing::info!(
        "Making query layer for {}. Date range: {} to {}",
        table,
        window.start.format(TIMESTAMP_FORMAT),
        window.end.format(TIMESTAMP_FORMAT)
    );

    let query = ViewQuery::new(table, date_field, window);
    tracing::debug!("Query: {}", query.to_sql());

    let name = session.unique_name(VIEW_NAME);
    let started = Instant::now();
    let view = session
        .toolkit()
        .create_filtered_view(workspace, &name, &query)?;
    session.track(view.as_str());

    tracing::info!(
        "Query layer creation time: {:.4} seconds",
        started.elapsed().as_secs_f64()
    );

    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::window::parse_timestamp;
    use crate::domain::{Feature, FeatureClass, Field, SpatialReference};
    use crate::toolkit::MemoryWorkspace;
    use serde_json::json;

    fn collars() -> FeatureClass {
        let mut class = FeatureClass::new(
            "Collars",
            SpatialReference::default(),
            vec![Field::new("CollarSerialNum"), Field::new("DateYearAndJulian")],
        );
        for (serial, date) in [
            ("A1", "2017-07-16 12:00:00"),
            ("A2", "2017-07-17 00:00:00"),
            ("A3", "2017-07-17 23:59:59"),
            ("A4", "2017-07-18 00:00:00"),
        ] {
            class.push(Feature::new(None, vec![json!(serial), json!(date)]));
        }
        class
    }

    #[test]
    fn test_select_yesterday() {
        let mut workspace = MemoryWorkspace::new();
        workspace.insert(collars()).unwrap();
        let mut session = Session::new(&mut workspace);

        let view = select_yesterday(
            &mut session,
            "",
            "Collars",
            "DateYearAndJulian",
            parse_timestamp("2017-07-18 06:00:00"),
        )
        .unwrap();

        assert_eq!(view, VIEW_NAME);
        assert_eq!(session.toolkit().get_count(&view).unwrap(), 2);
        assert_eq!(session.pending(), &[VIEW_NAME.to_string()]);
    }

    #[test]
    fn test_stale_view_gets_new_name() {
        let mut workspace = MemoryWorkspace::new();
        workspace.insert(collars()).unwrap();
        workspace
            .insert(FeatureClass::new(VIEW_NAME, SpatialReference::default(), vec![]))
            .unwrap();
        let mut session = Session::new(&mut workspace);

        let view = select_yesterday(
            &mut session,
            "",
            "Collars",
            "DateYearAndJulian",
            parse_timestamp("2017-07-18"),
        )
        .unwrap();

        assert_eq!(view, "date_query_result1");
        assert!(session.take_report().has_stale_objects());
    }

    #[test]
    fn test_missing_table_is_fatal() {
        let mut workspace = MemoryWorkspace::new();
        let mut session = Session::new(&mut workspace);

        let result = select_yesterday(
            &mut session,
            "",
            "Collars",
            "DateYearAndJulian",
            parse_timestamp("2017-07-18"),
        );

        assert!(matches!(result, Err(ToolkitError::NotFound(_))));
        assert!(session.pending().is_empty());
    }
}
