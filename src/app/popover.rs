use strum::{Display, EnumIter, IntoEnumIterator};
use time::{Date, Duration, Month};

use crate::timeline::{FilterState, YearFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, Display)]
pub enum PopoverField {
    #[default]
    #[strum(serialize = "Year")]
    Year,
    #[strum(serialize = "Start date")]
    Start,
    #[strum(serialize = "End date")]
    End,
}

impl PopoverField {
    pub fn cycle(self, delta: isize) -> Self {
        let fields: Vec<PopoverField> = PopoverField::iter().collect();
        let current = fields.iter().position(|field| *field == self).unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(fields.len() as isize);
        fields[next as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStep {
    Day,
    Month,
}

/// Applied filter plus the draft edited while the popover is open. The
/// draft never reaches the timeline until `apply`.
#[derive(Debug, Clone, Default)]
pub struct FilterPopover {
    applied: FilterState,
    draft: FilterState,
    open: bool,
    focus: PopoverField,
}

impl FilterPopover {
    pub fn new(applied: FilterState) -> Self {
        Self {
            applied,
            draft: applied,
            open: false,
            focus: PopoverField::Year,
        }
    }

    pub fn applied(&self) -> &FilterState {
        &self.applied
    }

    pub fn draft(&self) -> &FilterState {
        &self.draft
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn focus(&self) -> PopoverField {
        self.focus
    }

    pub fn open(&mut self) {
        self.draft = self.applied;
        self.focus = PopoverField::Year;
        self.open = true;
    }

    /// Commits the draft and closes. Returns whether the applied filter
    /// changed.
    pub fn apply(&mut self) -> bool {
        let changed = self.draft != self.applied;
        self.applied = self.draft;
        self.open = false;
        changed
    }

    /// Resets the draft only; the popover stays open.
    pub fn clear(&mut self) {
        self.draft = FilterState::default();
    }

    pub fn cancel(&mut self) {
        self.draft = self.applied;
        self.open = false;
    }

    pub fn move_focus(&mut self, delta: isize) {
        self.focus = self.focus.cycle(delta);
    }

    pub fn cycle_year(&mut self, years: &[i32], delta: isize) {
        self.draft.year = self.draft.year.cycle(years, delta);
    }

    /// Days outside the draft year cannot be picked.
    pub fn is_selectable(&self, day: Date) -> bool {
        match self.draft.year {
            YearFilter::All => true,
            YearFilter::Year(year) => day.year() == year,
        }
    }

    /// Moves the focused date picker. An unset picker is seeded from
    /// `anchor`; the result is kept inside the draft year.
    pub fn step_date(&mut self, step: DateStep, delta: i32, anchor: Date) {
        let Some(bound) = self.bound_mut() else {
            return;
        };
        let next = match *bound {
            None => Some(anchor),
            Some(current) => match step {
                DateStep::Day => current.checked_add(Duration::days(i64::from(delta))),
                DateStep::Month => add_months(current, delta),
            },
        };
        let Some(next) = next else {
            return;
        };
        let next = clamp_to_year(next, self.draft.year);
        if let Some(bound) = self.bound_mut() {
            *bound = Some(next);
        }
    }

    pub fn unset_date(&mut self) {
        if let Some(bound) = self.bound_mut() {
            *bound = None;
        }
    }

    fn bound_mut(&mut self) -> Option<&mut Option<Date>> {
        match self.focus {
            PopoverField::Year => None,
            PopoverField::Start => Some(&mut self.draft.start),
            PopoverField::End => Some(&mut self.draft.end),
        }
    }
}

fn clamp_to_year(day: Date, year: YearFilter) -> Date {
    let bounds = year.year().and_then(|year| {
        let first = Date::from_calendar_date(year, Month::January, 1).ok()?;
        let last = Date::from_calendar_date(year, Month::December, 31).ok()?;
        Some((first, last))
    });
    match bounds {
        Some((first, last)) => day.clamp(first, last),
        None => day,
    }
}

fn add_months(day: Date, delta: i32) -> Option<Date> {
    let index = day.year() * 12 + i32::from(u8::from(day.month())) - 1 + delta;
    let year = index.div_euclid(12);
    let month = Month::try_from(index.rem_euclid(12) as u8 + 1).ok()?;
    let day_of_month = day.day().min(month.length(year));
    Date::from_calendar_date(year, month, day_of_month).ok()
}
