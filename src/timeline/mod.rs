use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use time::Date;

pub mod date;
pub mod filter;
pub mod spacing;

pub use date::{DateLike, UnknownDatePlacement};
pub use filter::{FilterParseError, FilterState, YearFilter};
pub use spacing::SpacingRules;

use crate::viewport::VisibilitySignal;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct GoalId(String);

impl GoalId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for GoalId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => GoalId(text),
            RawId::Number(number) => GoalId(number.to_string()),
        })
    }
}

/// One goal as delivered by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalRecord {
    pub id: GoalId,
    pub name: String,
    #[serde(default)]
    pub date: DateLike,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
}

/// A goal together with the values derived from its date. The derived
/// fields are only ever written from `date`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    goal: GoalRecord,
    timestamp: Option<i64>,
    day: Option<Date>,
}

impl TimelineEntry {
    pub fn new(goal: GoalRecord) -> Self {
        let timestamp = date::timestamp_millis(&goal.date);
        let day = date::calendar_day(&goal.date);
        Self {
            goal,
            timestamp,
            day,
        }
    }

    pub fn goal(&self) -> &GoalRecord {
        &self.goal
    }

    pub fn id(&self) -> &GoalId {
        &self.goal.id
    }

    pub fn name(&self) -> &str {
        &self.goal.name
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Timestamp with the sentinel substituted for unparseable dates.
    pub fn normalized_timestamp(&self) -> i64 {
        self.timestamp.unwrap_or(date::INVALID_TIMESTAMP)
    }

    pub fn day(&self) -> Option<Date> {
        self.day
    }

    pub fn year(&self) -> Option<i32> {
        self.day.map(|day| day.year())
    }

    pub fn display_date(&self) -> String {
        self.day
            .map(date::ordinal_label)
            .unwrap_or_else(|| date::format_ordinal(&self.goal.date))
    }

    pub fn set_date(&mut self, value: DateLike) {
        self.goal.date = value;
        self.timestamp = date::timestamp_millis(&self.goal.date);
        self.day = date::calendar_day(&self.goal.date);
    }
}

/// Normalizes and sorts raw goals into timeline order.
///
/// Ordering is ascending by timestamp, then by id and name, so any
/// permutation of the same input produces the same sequence.
pub fn sort_entries(goals: Vec<GoalRecord>, unknown: UnknownDatePlacement) -> Vec<TimelineEntry> {
    let mut entries: Vec<TimelineEntry> = goals.into_iter().map(TimelineEntry::new).collect();
    entries.sort_by(|a, b| {
        unknown
            .compare(a.timestamp, b.timestamp)
            .then_with(|| a.goal.id.cmp(&b.goal.id))
            .then_with(|| a.goal.name.cmp(&b.goal.name))
    });
    entries
}

/// What the presentation layer needs for one visible entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEntry<'a> {
    pub entry: &'a TimelineEntry,
    pub display_date: String,
    pub spacing: f64,
    pub signaled: bool,
}

pub fn project<'a>(
    visible: &[&'a TimelineEntry],
    spacing_enabled: bool,
    rules: &SpacingRules,
    signal: &VisibilitySignal,
) -> Vec<RenderedEntry<'a>> {
    visible
        .iter()
        .enumerate()
        .map(|(index, &entry)| RenderedEntry {
            entry,
            display_date: entry.display_date(),
            spacing: spacing::spacing(visible, index, spacing_enabled, rules),
            signaled: signal.is_signaled(entry.id()),
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn goal(id: &str, date: &str) -> GoalRecord {
    GoalRecord {
        id: GoalId::new(id),
        name: format!("Goal {id}"),
        date: date.into(),
        description: String::new(),
        color: String::new(),
    }
}
