use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use time::Date;

use super::date::{format_day, parse_day};
use super::TimelineEntry;

const ALL_YEARS: &str = "All";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YearFilter {
    #[default]
    All,
    Year(i32),
}

impl YearFilter {
    pub fn is_all(&self) -> bool {
        matches!(self, YearFilter::All)
    }

    pub fn year(&self) -> Option<i32> {
        match self {
            YearFilter::All => None,
            YearFilter::Year(year) => Some(*year),
        }
    }

    /// Steps through `All` followed by `years`, wrapping at either end.
    pub fn cycle(self, years: &[i32], delta: isize) -> YearFilter {
        let choices = years.len() as isize + 1;
        let current = match self {
            YearFilter::All => 0,
            YearFilter::Year(year) => years
                .iter()
                .position(|candidate| *candidate == year)
                .map(|idx| idx as isize + 1)
                .unwrap_or(0),
        };
        let next = (current + delta).rem_euclid(choices);
        if next == 0 {
            YearFilter::All
        } else {
            YearFilter::Year(years[(next - 1) as usize])
        }
    }
}

impl fmt::Display for YearFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearFilter::All => f.write_str(ALL_YEARS),
            YearFilter::Year(year) => write!(f, "{year}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterParseError {
    #[error("invalid year filter '{0}' (expected \"All\" or a year such as 2021)")]
    Year(String),
    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    Day(String),
}

impl FromStr for YearFilter {
    type Err = FilterParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case(ALL_YEARS) {
            return Ok(YearFilter::All);
        }
        trimmed
            .parse::<i32>()
            .map(YearFilter::Year)
            .map_err(|_| FilterParseError::Year(raw.to_string()))
    }
}

pub fn parse_bound(raw: &str) -> Result<Date, FilterParseError> {
    parse_day(raw).ok_or_else(|| FilterParseError::Day(raw.to_string()))
}

/// Year and inclusive day-range predicates applied to the sorted timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterState {
    pub year: YearFilter,
    pub start: Option<Date>,
    pub end: Option<Date>,
}

impl FilterState {
    pub fn is_default(&self) -> bool {
        *self == FilterState::default()
    }

    pub fn matches(&self, entry: &TimelineEntry) -> bool {
        self.matches_year(entry) && self.matches_range(entry)
    }

    fn matches_year(&self, entry: &TimelineEntry) -> bool {
        match self.year {
            YearFilter::All => true,
            YearFilter::Year(year) => entry.year() == Some(year),
        }
    }

    fn matches_range(&self, entry: &TimelineEntry) -> bool {
        if self.start.is_none() && self.end.is_none() {
            return true;
        }
        let Some(day) = entry.day() else {
            return false;
        };
        self.start.map_or(true, |start| day >= start) && self.end.map_or(true, |end| day <= end)
    }

    /// Short labels describing the active predicates, for filter chips.
    pub fn chips(&self) -> Vec<String> {
        let mut chips = Vec::new();
        if let YearFilter::Year(year) = self.year {
            chips.push(format!("year:{year}"));
        }
        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                chips.push(format!("{}..{}", format_day(start), format_day(end)))
            }
            (Some(start), None) => chips.push(format!("from:{}", format_day(start))),
            (None, Some(end)) => chips.push(format!("to:{}", format_day(end))),
            (None, None) => {}
        }
        chips
    }
}

/// Keeps the entries passing `state`, in their original order.
pub fn apply<'a, I>(entries: I, state: &FilterState) -> Vec<&'a TimelineEntry>
where
    I: IntoIterator<Item = &'a TimelineEntry>,
{
    entries
        .into_iter()
        .filter(|entry| state.matches(entry))
        .collect()
}

/// Distinct years present in `entries`, ascending.
pub fn extract_years<'a, I>(entries: I) -> Vec<i32>
where
    I: IntoIterator<Item = &'a TimelineEntry>,
{
    entries
        .into_iter()
        .filter_map(TimelineEntry::year)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{goal, sort_entries, UnknownDatePlacement};
    use time::macros::date;

    fn scenario() -> Vec<TimelineEntry> {
        sort_entries(
            vec![
                goal("3", "2022-01-01"),
                goal("1", "2021-03-01"),
                goal("2", "2021-06-01"),
            ],
            UnknownDatePlacement::Epoch,
        )
    }

    fn ids(entries: &[&TimelineEntry]) -> Vec<String> {
        entries.iter().map(|entry| entry.id().to_string()).collect()
    }

    #[test]
    fn years_are_distinct_and_numerically_sorted() {
        let entries = sort_entries(
            vec![
                goal("a", "2021-03-01"),
                goal("b", "999-01-01"),
                goal("c", "2021-12-31"),
                goal("d", "10000-01-01"),
                goal("e", "2009-05-05"),
                goal("f", "bogus"),
            ],
            UnknownDatePlacement::Epoch,
        );
        assert_eq!(extract_years(&entries), vec![2009, 2021]);
        assert_eq!(extract_years(&scenario()), vec![2021, 2022]);
        assert!(extract_years(&[]).is_empty());
    }

    #[test]
    fn year_filter_keeps_chronological_subsequence() {
        let entries = scenario();
        let state = FilterState {
            year: YearFilter::Year(2021),
            ..FilterState::default()
        };
        assert_eq!(ids(&apply(&entries, &state)), vec!["1", "2"]);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let entries = scenario();
        let state = FilterState {
            start: Some(date!(2021 - 03 - 01)),
            end: Some(date!(2021 - 06 - 01)),
            ..FilterState::default()
        };
        assert_eq!(ids(&apply(&entries, &state)), vec!["1", "2"]);

        let open_start = FilterState {
            end: Some(date!(2021 - 03 - 01)),
            ..FilterState::default()
        };
        assert_eq!(ids(&apply(&entries, &open_start)), vec!["1"]);
    }

    #[test]
    fn inverted_range_is_empty_not_an_error() {
        let entries = scenario();
        let state = FilterState {
            start: Some(date!(2022 - 01 - 01)),
            end: Some(date!(2021 - 01 - 01)),
            ..FilterState::default()
        };
        assert!(apply(&entries, &state).is_empty());
    }

    #[test]
    fn filtering_is_idempotent() {
        let entries = scenario();
        let states = [
            FilterState::default(),
            FilterState {
                year: YearFilter::Year(2021),
                start: Some(date!(2021 - 04 - 01)),
                end: None,
            },
            FilterState {
                year: YearFilter::Year(2030),
                ..FilterState::default()
            },
        ];
        for state in states {
            let once = apply(&entries, &state);
            let twice = apply(once.iter().copied(), &state);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn undated_entries_only_survive_inactive_predicates() {
        let entries = sort_entries(
            vec![goal("x", "whenever"), goal("y", "2021-01-01")],
            UnknownDatePlacement::Epoch,
        );
        assert_eq!(apply(&entries, &FilterState::default()).len(), 2);
        let bounded = FilterState {
            start: Some(date!(1900 - 01 - 01)),
            ..FilterState::default()
        };
        assert_eq!(ids(&apply(&entries, &bounded)), vec!["y"]);
    }

    #[test]
    fn year_filter_round_trips_through_text() {
        assert_eq!("All".parse::<YearFilter>(), Ok(YearFilter::All));
        assert_eq!("all".parse::<YearFilter>(), Ok(YearFilter::All));
        assert_eq!(" 2021 ".parse::<YearFilter>(), Ok(YearFilter::Year(2021)));
        assert_eq!(YearFilter::Year(2021).to_string(), "2021");
        assert!(matches!(
            "twenty".parse::<YearFilter>(),
            Err(FilterParseError::Year(_))
        ));
        assert_eq!(
            parse_bound("03/01/2021"),
            Err(FilterParseError::Day("03/01/2021".into()))
        );
    }

    #[test]
    fn year_cycle_wraps_through_all() {
        let years = [2021, 2022];
        let next = YearFilter::All.cycle(&years, 1);
        assert_eq!(next, YearFilter::Year(2021));
        assert_eq!(next.cycle(&years, 1), YearFilter::Year(2022));
        assert_eq!(YearFilter::Year(2022).cycle(&years, 1), YearFilter::All);
        assert_eq!(YearFilter::All.cycle(&years, -1), YearFilter::Year(2022));
        assert_eq!(YearFilter::All.cycle(&[], 1), YearFilter::All);
    }

    #[test]
    fn chips_describe_active_predicates() {
        let state = FilterState {
            year: YearFilter::Year(2021),
            start: Some(date!(2021 - 02 - 01)),
            end: None,
        };
        assert_eq!(state.chips(), vec!["year:2021", "from:2021-02-01"]);
        assert!(FilterState::default().chips().is_empty());
    }
}
