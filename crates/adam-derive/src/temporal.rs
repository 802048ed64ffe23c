//! Date and datetime parsing for source values.
//!
//! SDTM dates arrive as ISO 8601 text (`--DTC`), as Polars `Date` values
//! after a Parquet round trip, or occasionally in a local format from a CSV
//! export. Partial dates (`2024-01`) do not parse.

use adam_common::any_to_string_non_empty;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::{AnyValue, TimeUnit};

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d-%b-%Y", "%d%b%Y", "%Y%m%d"];

/// Parses a full date, or the date part of a datetime.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| parse_datetime(trimmed).map(|dt| dt.date()))
}

/// Parses a datetime; a bare date is taken at midnight.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// Temporal view of a cell value.
pub fn any_to_datetime(value: AnyValue<'_>) -> Option<NaiveDateTime> {
    match value {
        AnyValue::Date(days) => date_from_epoch_days(days).map(|date| date.and_time(NaiveTime::MIN)),
        AnyValue::Datetime(value, unit, _) => datetime_from_epoch(value, unit),
        AnyValue::String(text) => parse_datetime(text),
        AnyValue::StringOwned(text) => parse_datetime(&text),
        other => any_to_string_non_empty(other).and_then(|text| parse_datetime(&text)),
    }
}

pub fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

pub fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn epoch_millis(datetime: NaiveDateTime) -> i64 {
    datetime.and_utc().timestamp_millis()
}

fn datetime_from_epoch(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let datetime = match unit {
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value)?,
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value)?,
        TimeUnit::Nanoseconds => DateTime::from_timestamp_nanos(value),
    };
    Some(datetime.naive_utc())
}

/// Study day of `date` relative to `reference`.
///
/// Per SDTMIG 4.4.4 there is no day 0: the reference date is day 1 and the
/// day before it is day -1.
pub fn study_day(date: NaiveDate, reference: NaiveDate) -> i64 {
    let diff = (date - reference).num_days();
    if diff >= 0 { diff + 1 } else { diff }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn parses_iso_and_local_dates() {
        assert_eq!(parse_date("2024-01-15"), Some(date(2024, 1, 15)));
        assert_eq!(parse_date("2024-01-15T08:30"), Some(date(2024, 1, 15)));
        assert_eq!(parse_date("15-Jan-2024"), Some(date(2024, 1, 15)));
        assert_eq!(parse_date("2024-01"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn bare_date_is_midnight() {
        let dt = parse_datetime("2024-01-15").expect("datetime");
        assert_eq!(dt.time(), NaiveTime::MIN);
    }

    #[test]
    fn epoch_days_round_trip() {
        let d = date(2024, 2, 29);
        assert_eq!(date_from_epoch_days(epoch_days(d)), Some(d));
        assert_eq!(epoch_days(date(1970, 1, 1)), 0);
    }

    #[test]
    fn polars_temporal_values() {
        let d = date(2024, 1, 15);
        assert_eq!(
            any_to_datetime(AnyValue::Date(epoch_days(d))).map(|dt| dt.date()),
            Some(d)
        );
        assert_eq!(
            any_to_datetime(AnyValue::String("2024-01-15T10:00:00")).map(|dt| dt.date()),
            Some(d)
        );
        assert_eq!(any_to_datetime(AnyValue::Null), None);
    }

    #[test]
    fn study_day_skips_zero() {
        let reference = date(2024, 1, 10);
        assert_eq!(study_day(date(2024, 1, 10), reference), 1);
        assert_eq!(study_day(date(2024, 1, 11), reference), 2);
        assert_eq!(study_day(date(2024, 1, 9), reference), -1);
    }
}
