use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;

/// Timestamp format used in rendered queries and log lines
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ACCEPTED_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Whether the end of a window is part of it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpperBound {
    Exclusive,
    Inclusive,
}

/// A time interval starting at `start` (always inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub upper: UpperBound,
}

impl TimeWindow {
    /// `[start, end)`
    pub fn half_open(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            upper: UpperBound::Exclusive,
        }
    }

    /// `[start, end]`
    pub fn closed(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            upper: UpperBound::Inclusive,
        }
    }

    /// The whole calendar day before `today`: `[floor_day(today - 1d), floor_day(today))`
    pub fn yesterday(today: NaiveDateTime) -> Self {
        let start = start_of_day((today - Duration::days(1)).date());
        Self::half_open(start, start + Duration::days(1))
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        if timestamp < self.start {
            return false;
        }
        match self.upper {
            UpperBound::Exclusive => timestamp < self.end,
            UpperBound::Inclusive => timestamp <= self.end,
        }
    }

    /// Comparison operator used for the end bound in SQL
    pub fn upper_operator(&self) -> &'static str {
        match self.upper {
            UpperBound::Exclusive => "<",
            UpperBound::Inclusive => "<=",
        }
    }
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Parse a timestamp as written in config files or on the command line.
///
/// Accepts `YYYY-MM-DD HH:MM:SS` (space or `T` separated, optional
/// fractional seconds), RFC 3339 (converted to UTC) and bare dates
/// (midnight).
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for format in ACCEPTED_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(text, format) {
            return Some(timestamp);
        }
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Some(timestamp.naive_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(start_of_day)
}

/// Interpret an attribute value as a timestamp.
///
/// Strings go through [`parse_timestamp`]; integers are epoch milliseconds.
pub fn value_as_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::String(text) => parse_timestamp(text),
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|timestamp| timestamp.naive_utc()),
        _ => None,
    }
}

/// Fixed-size windows walking a historical range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillPlan {
    pub first_start: NaiveDateTime,
    pub first_stop: NaiveDateTime,
    pub end: NaiveDateTime,
    pub step: Duration,
    pub gap: Duration,
}

impl BackfillPlan {
    pub fn windows(&self) -> BackfillWindows {
        BackfillWindows {
            start: self.first_start,
            stop: self.first_stop,
            end: self.end,
            step: self.step,
            gap: self.gap,
        }
    }

    /// Windows still to process when everything up to `last_completed_stop`
    /// has already been appended
    pub fn resume_after(
        &self,
        last_completed_stop: NaiveDateTime,
    ) -> impl Iterator<Item = TimeWindow> {
        self.windows()
            .skip_while(move |window| window.end <= last_completed_stop)
    }
}

/// Iterator over `[start, stop]` windows.
///
/// After each window `start = stop + gap` and `stop = stop + step`; iteration
/// ends once `start >= end`. The reported stop is clamped to `end`.
#[derive(Debug, Clone)]
pub struct BackfillWindows {
    start: NaiveDateTime,
    stop: NaiveDateTime,
    end: NaiveDateTime,
    step: Duration,
    gap: Duration,
}

impl Iterator for BackfillWindows {
    type Item = TimeWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.start >= self.end {
            return None;
        }

        let window = TimeWindow::closed(self.start, self.stop.min(self.end));
        self.start = self.stop + self.gap;
        self.stop += self.step;

        Some(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKFILL_STEP_DAYS: i64 = 30;
    const BACKFILL_GAP_MINUTES: i64 = 1;

    fn ts(text: &str) -> NaiveDateTime {
        parse_timestamp(text).unwrap()
    }

    fn plan(first_start: &str, first_stop: &str, end: &str) -> BackfillPlan {
        BackfillPlan {
            first_start: ts(first_start),
            first_stop: ts(first_stop),
            end: ts(end),
            step: Duration::days(BACKFILL_STEP_DAYS),
            gap: Duration::minutes(BACKFILL_GAP_MINUTES),
        }
    }

    #[test]
    fn test_yesterday_window() {
        let window = TimeWindow::yesterday(ts("2017-07-18 15:42:10"));

        assert_eq!(window.start, ts("2017-07-17 00:00:00"));
        assert_eq!(window.end, ts("2017-07-18 00:00:00"));
        assert_eq!(window.upper, UpperBound::Exclusive);
    }

    #[test]
    fn test_yesterday_window_at_midnight() {
        let window = TimeWindow::yesterday(ts("2017-07-18 00:00:00"));

        assert_eq!(window.start, ts("2017-07-17 00:00:00"));
        assert_eq!(window.end, ts("2017-07-18 00:00:00"));
    }

    #[test]
    fn test_yesterday_crosses_month_boundary() {
        let window = TimeWindow::yesterday(ts("2017-03-01 08:00:00"));

        assert_eq!(window.start, ts("2017-02-28 00:00:00"));
        assert_eq!(window.end, ts("2017-03-01 00:00:00"));
    }

    #[test]
    fn test_midnight_falls_in_exactly_one_day() {
        let midnight = ts("2017-07-18 00:00:00");
        let earlier = TimeWindow::yesterday(ts("2017-07-18 09:00:00"));
        let later = TimeWindow::yesterday(ts("2017-07-19 09:00:00"));

        assert!(!earlier.contains(midnight), "End bound must be exclusive");
        assert!(later.contains(midnight), "Start bound must be inclusive");
    }

    #[test]
    fn test_closed_window_contains_end() {
        let window = TimeWindow::closed(ts("2002-02-01 12:00:00"), ts("2002-03-01 12:00:00"));

        assert!(window.contains(ts("2002-03-01 12:00:00")));
        assert!(!window.contains(ts("2002-03-01 12:00:01")));
        assert_eq!(window.upper_operator(), "<=");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2017, 7, 17)
            .unwrap()
            .and_hms_opt(6, 30, 0)
            .unwrap();

        assert_eq!(parse_timestamp("2017-07-17 06:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2017-07-17T06:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2017-07-17T06:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2017-07-17T08:30:00+02:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2017-07-17"),
            Some(ts("2017-07-17 00:00:00"))
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_value_as_timestamp() {
        assert_eq!(
            value_as_timestamp(&Value::from("2017-07-17 06:30:00")),
            Some(ts("2017-07-17 06:30:00"))
        );
        // 2017-07-17T00:00:00Z in epoch milliseconds
        assert_eq!(
            value_as_timestamp(&Value::from(1_500_249_600_000_i64)),
            Some(ts("2017-07-17 00:00:00"))
        );
        assert_eq!(value_as_timestamp(&Value::Null), None);
    }

    #[test]
    fn test_backfill_single_window() {
        let windows: Vec<TimeWindow> =
            plan("2002-02-01 12:00:00", "2002-03-01 12:00:00", "2002-03-01 00:00:00")
                .windows()
                .collect();

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start, ts("2002-02-01 12:00:00"));
        assert_eq!(windows[0].end, ts("2002-03-01 00:00:00"));
    }

    #[test]
    fn test_backfill_month_range_is_one_window() {
        let first_start = ts("2002-02-01 00:00:00");
        let first_stop = first_start + Duration::days(BACKFILL_STEP_DAYS);
        let end = ts("2002-03-01 00:00:00");
        let plan = BackfillPlan {
            first_start,
            first_stop,
            end,
            step: Duration::days(BACKFILL_STEP_DAYS),
            gap: Duration::minutes(BACKFILL_GAP_MINUTES),
        };

        let windows: Vec<TimeWindow> = plan.windows().collect();

        assert_eq!(windows, vec![TimeWindow::closed(first_start, end)]);
    }

    #[test]
    fn test_backfill_window_progression() {
        let windows: Vec<TimeWindow> =
            plan("2002-02-01 12:00:00", "2002-03-01 12:00:00", "2002-06-01 12:00:00")
                .windows()
                .collect();

        assert_eq!(windows.len(), 5);
        assert_eq!(windows[1].start, ts("2002-03-01 12:01:00"));
        assert_eq!(windows[1].end, ts("2002-03-31 12:00:00"));
        assert_eq!(windows[2].start, ts("2002-03-31 12:01:00"));
        assert_eq!(windows[3].end, ts("2002-05-30 12:00:00"));
        assert_eq!(windows[4].end, ts("2002-06-01 12:00:00"));

        for pair in windows.windows(2) {
            assert!(
                pair[0].end < pair[1].start,
                "Windows must not overlap: {:?} / {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_backfill_clamps_last_window() {
        let windows: Vec<TimeWindow> =
            plan("2002-02-01 12:00:00", "2002-03-01 12:00:00", "2002-03-15 00:00:00")
                .windows()
                .collect();

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].end, ts("2002-03-15 00:00:00"));
    }

    #[test]
    fn test_backfill_empty_range() {
        let count = plan("2002-02-01 12:00:00", "2002-03-01 12:00:00", "2002-02-01 12:00:00")
            .windows()
            .count();

        assert_eq!(count, 0);
    }

    #[test]
    fn test_backfill_resume_after_checkpoint() {
        let plan = plan("2002-02-01 12:00:00", "2002-03-01 12:00:00", "2002-06-01 12:00:00");
        let remaining: Vec<TimeWindow> = plan.resume_after(ts("2002-03-31 12:00:00")).collect();

        assert_eq!(remaining.len(), 3);
        assert_eq!(remaining[0].start, ts("2002-03-31 12:01:00"));
    }
}
