use serde::{Deserialize, Serialize};

use super::date::MILLIS_PER_DAY;
use super::TimelineEntry;

/// How elapsed time between neighbouring entries turns into layout units,
/// and how layout units turn into terminal rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpacingRules {
    /// Minimum gap between two dated neighbours.
    pub floor: f64,
    pub scale_per_day: f64,
    pub units_per_row: f64,
    pub max_gap_rows: u16,
}

impl Default for SpacingRules {
    fn default() -> Self {
        Self {
            floor: 10.0,
            scale_per_day: 0.2,
            units_per_row: 10.0,
            max_gap_rows: 24,
        }
    }
}

/// Gap in layout units in front of `entries[index]`.
///
/// Zero for the first entry, when spacing is disabled, or when either
/// neighbour has no usable timestamp.
pub fn spacing(
    entries: &[&TimelineEntry],
    index: usize,
    enabled: bool,
    rules: &SpacingRules,
) -> f64 {
    if index == 0 || !enabled {
        return 0.0;
    }
    let (Some(current), Some(previous)) = (entries.get(index), entries.get(index - 1)) else {
        return 0.0;
    };
    let (Some(current), Some(previous)) = (current.timestamp(), previous.timestamp()) else {
        return 0.0;
    };
    let gap_days = (current - previous) as f64 / MILLIS_PER_DAY as f64;
    (gap_days * rules.scale_per_day).max(rules.floor)
}

/// Blank rows rendered for a gap of `units`.
pub fn gap_rows(units: f64, rules: &SpacingRules) -> u16 {
    if units <= 0.0 || rules.units_per_row <= 0.0 {
        return 0;
    }
    let rows = (units / rules.units_per_row).round();
    if rows >= f64::from(rules.max_gap_rows) {
        rules.max_gap_rows
    } else {
        rows as u16
    }
}
