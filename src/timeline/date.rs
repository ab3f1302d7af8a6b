use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use time::format_description::{self, well_known::Rfc3339, FormatItem};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Timestamp reported by [`normalize`] for values that do not parse.
pub const INVALID_TIMESTAMP: i64 = 0;

const UNKNOWN_DATE_LABEL: &str = "Unknown date";

static DATE_TIME_FORMATS: Lazy<Vec<Vec<FormatItem<'static>>>> = Lazy::new(|| {
    [
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]",
        "[year]-[month]-[day]T[hour]:[minute]:[second]",
        "[year]-[month]-[day]T[hour]:[minute]",
        "[year]-[month]-[day] [hour]:[minute]:[second]",
    ]
    .iter()
    .map(|description| format_description::parse(description).expect("valid date-time format description"))
    .collect()
});

/// A date as delivered by a goal source: free text, epoch milliseconds or
/// calendar parts. Anything else (null, floats, out-of-range parts) is kept
/// as `Other` and never parses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateLike {
    Millis(i64),
    Parts(DateParts),
    Text(String),
    Other(serde_json::Value),
}

impl Default for DateLike {
    fn default() -> Self {
        DateLike::Other(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateParts {
    pub year: i32,
    #[serde(default = "first_unit")]
    pub month: u8,
    #[serde(default = "first_unit")]
    pub day: u8,
}

fn first_unit() -> u8 {
    1
}

impl DateParts {
    fn to_date(self) -> Option<Date> {
        calendar_date(self.year, self.month, self.day)
    }
}

impl From<&str> for DateLike {
    fn from(value: &str) -> Self {
        DateLike::Text(value.to_string())
    }
}

impl From<String> for DateLike {
    fn from(value: String) -> Self {
        DateLike::Text(value)
    }
}

impl From<Date> for DateLike {
    fn from(value: Date) -> Self {
        DateLike::Parts(DateParts {
            year: value.year(),
            month: value.month() as u8,
            day: value.day(),
        })
    }
}

impl fmt::Display for DateLike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateLike::Millis(ms) => write!(f, "{ms}"),
            DateLike::Parts(parts) => {
                write!(f, "{:04}-{:02}-{:02}", parts.year, parts.month, parts.day)
            }
            DateLike::Text(text) => f.write_str(text),
            DateLike::Other(value) => write!(f, "{value}"),
        }
    }
}

/// Where entries whose date does not parse land in the sorted timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownDatePlacement {
    /// Sort at the sentinel timestamp, i.e. 1970-01-01.
    #[default]
    Epoch,
    First,
    Last,
}

impl UnknownDatePlacement {
    pub fn compare(self, a: Option<i64>, b: Option<i64>) -> Ordering {
        self.sort_key(a).cmp(&self.sort_key(b))
    }

    fn sort_key(self, timestamp: Option<i64>) -> (u8, i64) {
        match (self, timestamp) {
            (_, Some(ts)) => (1, ts),
            (UnknownDatePlacement::Epoch, None) => (1, INVALID_TIMESTAMP),
            (UnknownDatePlacement::First, None) => (0, 0),
            (UnknownDatePlacement::Last, None) => (2, 0),
        }
    }
}

/// Total conversion to epoch milliseconds. Unparseable input maps to
/// [`INVALID_TIMESTAMP`].
pub fn normalize(date: &DateLike) -> i64 {
    timestamp_millis(date).unwrap_or(INVALID_TIMESTAMP)
}

pub fn timestamp_millis(date: &DateLike) -> Option<i64> {
    let instant = parse_date_time(date)?;
    i64::try_from(instant.unix_timestamp_nanos() / 1_000_000).ok()
}

pub fn calendar_day(date: &DateLike) -> Option<Date> {
    parse_date_time(date).map(|instant| instant.date())
}

pub fn parse_date_time(date: &DateLike) -> Option<OffsetDateTime> {
    match date {
        DateLike::Millis(ms) => from_millis(*ms),
        DateLike::Parts(parts) => parts.to_date().map(midnight_utc),
        DateLike::Text(text) => parse_text(text.trim()),
        DateLike::Other(_) => None,
    }
}

/// Strict `YYYY-MM-DD` parser used for filter bounds entered by the user.
pub fn parse_day(input: &str) -> Option<Date> {
    static FORMAT: Lazy<Vec<FormatItem<'static>>> = Lazy::new(|| {
        format_description::parse("[year]-[month]-[day]").expect("valid date format description")
    });
    Date::parse(input.trim(), &*FORMAT).ok()
}

pub fn format_day(day: Date) -> String {
    format!("{:04}-{:02}-{:02}", day.year(), day.month() as u8, day.day())
}

/// Display form with an ordinal day, e.g. `March 1st, 2021`.
pub fn format_ordinal(date: &DateLike) -> String {
    calendar_day(date)
        .map(ordinal_label)
        .unwrap_or_else(|| UNKNOWN_DATE_LABEL.to_string())
}

pub fn ordinal_label(day: Date) -> String {
    format!(
        "{} {}{}, {}",
        day.month(),
        day.day(),
        ordinal_suffix(day.day()),
        day.year()
    )
}

pub fn ordinal_suffix(day: u8) -> &'static str {
    if (11..=13).contains(&(day % 100)) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

fn parse_text(text: &str) -> Option<OffsetDateTime> {
    if text.is_empty() {
        return None;
    }
    if text.bytes().all(|b| b.is_ascii_digit()) {
        return match text.len() {
            4 => calendar_date(text.parse().ok()?, 1, 1).map(midnight_utc),
            n if n >= 9 => from_millis(text.parse().ok()?),
            _ => None,
        };
    }
    if let Ok(instant) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(instant);
    }
    for format in DATE_TIME_FORMATS.iter() {
        if let Ok(local) = PrimitiveDateTime::parse(text, format) {
            return Some(local.assume_utc());
        }
    }
    parse_calendar_text(text).map(midnight_utc)
}

// Accepts YYYY-MM, YYYY-M-D and the slash-separated equivalents.
fn parse_calendar_text(text: &str) -> Option<Date> {
    let parts: Vec<&str> = text.split(['-', '/']).collect();
    let numeric = |part: &&str, max_len: usize| {
        !part.is_empty() && part.len() <= max_len && part.bytes().all(|b| b.is_ascii_digit())
    };
    match parts.as_slice() {
        [year, month] if year.len() == 4 && numeric(year, 4) && numeric(month, 2) => {
            calendar_date(year.parse().ok()?, month.parse().ok()?, 1)
        }
        [year, month, day]
            if year.len() == 4 && numeric(year, 4) && numeric(month, 2) && numeric(day, 2) =>
        {
            calendar_date(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
        }
        _ => None,
    }
}

fn calendar_date(year: i32, month: u8, day: u8) -> Option<Date> {
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

fn from_millis(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}

fn midnight_utc(day: Date) -> OffsetDateTime {
    day.with_time(Time::MIDNIGHT).assume_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use time::macros::date;

    #[test]
    fn iso_day_normalizes_to_midnight_utc() {
        assert_eq!(normalize(&"2021-03-01".into()), 1_614_556_800_000);
    }

    #[test]
    fn rfc3339_and_naive_date_times_agree() {
        let with_offset = normalize(&"2021-03-01T12:30:00Z".into());
        let naive = normalize(&"2021-03-01T12:30:00".into());
        let spaced = normalize(&"2021-03-01 12:30:00".into());
        assert_eq!(with_offset, naive);
        assert_eq!(naive, spaced);
        assert_eq!(with_offset - normalize(&"2021-03-01".into()), 45_000_000);
    }

    #[test]
    fn lenient_calendar_forms_are_accepted() {
        assert_eq!(calendar_day(&"2021/3/9".into()), Some(date!(2021 - 03 - 09)));
        assert_eq!(calendar_day(&"2021-07".into()), Some(date!(2021 - 07 - 01)));
        assert_eq!(calendar_day(&"2019".into()), Some(date!(2019 - 01 - 01)));
        assert_eq!(
            calendar_day(&"1614556800000".into()),
            Some(date!(2021 - 03 - 01))
        );
    }

    #[test]
    fn invalid_input_maps_to_sentinel() {
        for raw in ["", "   ", "not a date", "2021-13-01", "2021-02-30", "12345"] {
            assert_eq!(normalize(&raw.into()), INVALID_TIMESTAMP, "input {raw:?}");
            assert!(calendar_day(&raw.into()).is_none());
        }
    }

    #[test]
    fn normalization_follows_calendar_order() {
        let ordered = [
            "1999-12-31",
            "2000-01-01T00:00:01Z",
            "2020-02-29",
            "2021-03-01",
            "2021-03-01T08:00:00",
            "2022-01-01",
        ];
        let stamps: Vec<i64> = ordered.iter().map(|raw| normalize(&(*raw).into())).collect();
        assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]), "{stamps:?}");
    }

    #[test]
    fn structured_and_numeric_dates_deserialize() {
        let parts: DateLike = serde_json::from_str(r#"{"year":2022,"month":5,"day":17}"#).unwrap();
        assert_eq!(calendar_day(&parts), Some(date!(2022 - 05 - 17)));

        let millis: DateLike = serde_json::from_str("1614556800000").unwrap();
        assert_eq!(millis, DateLike::Millis(1_614_556_800_000));

        let text: DateLike = serde_json::from_str(r#""2021-03-01""#).unwrap();
        assert_eq!(text, DateLike::Text("2021-03-01".into()));
    }

    #[test]
    fn unusable_values_still_deserialize_as_invalid() {
        for raw in ["null", "1.5", "true", r#"{"year":2021,"month":300}"#] {
            let value: DateLike = serde_json::from_str(raw).unwrap();
            assert_matches!(value, DateLike::Other(_), "input {raw}");
            assert_eq!(normalize(&value), INVALID_TIMESTAMP, "input {raw}");
            assert!(calendar_day(&value).is_none());
        }
        assert_eq!(DateLike::default().to_string(), "null");
    }

    #[test]
    fn ordinal_suffixes_follow_english_rules() {
        let cases = [
            (1, "st"),
            (2, "nd"),
            (3, "rd"),
            (4, "th"),
            (11, "th"),
            (12, "th"),
            (13, "th"),
            (21, "st"),
            (22, "nd"),
            (23, "rd"),
            (30, "th"),
            (31, "st"),
        ];
        for (day, suffix) in cases {
            assert_eq!(ordinal_suffix(day), suffix, "day {day}");
        }
    }

    #[test]
    fn ordinal_label_spells_out_month() {
        assert_eq!(format_ordinal(&"2021-03-01".into()), "March 1st, 2021");
        assert_eq!(format_ordinal(&"2021-06-22".into()), "June 22nd, 2021");
        assert_eq!(format_ordinal(&"garbage".into()), "Unknown date");
    }

    #[test]
    fn unknown_placement_orders_missing_timestamps() {
        let early = Some(-86_400_000);
        assert_eq!(
            UnknownDatePlacement::Epoch.compare(None, early),
            Ordering::Greater
        );
        assert_eq!(UnknownDatePlacement::First.compare(None, early), Ordering::Less);
        assert_eq!(
            UnknownDatePlacement::Last.compare(None, Some(i64::MAX)),
            Ordering::Greater
        );
    }

    #[test]
    fn strict_day_parser_rejects_loose_forms() {
        assert_eq!(parse_day("2021-03-01"), Some(date!(2021 - 03 - 01)));
        assert_eq!(parse_day("2021-3-1"), None);
        assert_eq!(format_day(date!(2021 - 03 - 01)), "2021-03-01");
    }
}
