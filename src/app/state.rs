use crate::source::FetchError;
use crate::timeline::filter;
use crate::timeline::{GoalRecord, SpacingRules, TimelineEntry, UnknownDatePlacement};

use super::popover::FilterPopover;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    Loading,
    Error(String),
    Ready,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub view: ViewState,
    pub user_id: Option<String>,
    pub source_label: String,
    pub popover: FilterPopover,
    pub spacing_enabled: bool,
    pub spacing_rules: SpacingRules,
    pub scroll: u32,
    pub status_message: Option<String>,
    unknown_dates: UnknownDatePlacement,
    entries: Vec<TimelineEntry>,
    years: Vec<i32>,
    /// Bumped whenever the visible set changes.
    generation: u64,
}

impl AppState {
    pub fn new(
        user_id: Option<String>,
        source_label: String,
        unknown_dates: UnknownDatePlacement,
        spacing_enabled: bool,
        spacing_rules: SpacingRules,
    ) -> Self {
        Self {
            view: ViewState::Loading,
            user_id,
            source_label,
            popover: FilterPopover::default(),
            spacing_enabled,
            spacing_rules,
            scroll: 0,
            status_message: None,
            unknown_dates,
            entries: Vec::new(),
            years: Vec::new(),
            generation: 0,
        }
    }

    pub fn on_loaded(&mut self, goals: Vec<GoalRecord>) {
        self.entries = crate::timeline::sort_entries(goals, self.unknown_dates);
        self.years = filter::extract_years(&self.entries);
        self.view = ViewState::Ready;
        self.scroll = 0;
        self.generation += 1;
        tracing::debug!(
            entries = self.entries.len(),
            years = self.years.len(),
            "timeline ready"
        );
    }

    pub fn on_failed(&mut self, err: &FetchError) {
        self.view = ViewState::Error(err.to_string());
    }

    pub fn is_ready(&self) -> bool {
        self.view == ViewState::Ready
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn visible_entries(&self) -> Vec<&TimelineEntry> {
        filter::apply(&self.entries, self.popover.applied())
    }

    /// Commits the popover draft. Returns whether the visible set changed.
    pub fn apply_filter(&mut self) -> bool {
        if !self.popover.apply() {
            return false;
        }
        self.scroll = 0;
        self.generation += 1;
        let visible = self.visible_entries().len();
        tracing::info!(visible, filter = ?self.popover.applied(), "filter applied");
        self.set_status_message(Some(format!("{visible} of {} goals", self.entries.len())));
        true
    }

    pub fn toggle_spacing(&mut self) -> bool {
        self.spacing_enabled = !self.spacing_enabled;
        self.spacing_enabled
    }

    pub fn scroll_by(&mut self, delta: i64, max_scroll: u32) {
        let next = (i64::from(self.scroll) + delta).clamp(0, i64::from(max_scroll));
        self.scroll = next as u32;
    }

    pub fn scroll_to(&mut self, row: u32, max_scroll: u32) {
        self.scroll = row.min(max_scroll);
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }
}
