use std::io::Stdout;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, TryRecvError};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use time::{Date, OffsetDateTime};

use crate::config::AppConfig;
use crate::source::{self, FetchError, GoalSource};
use crate::timeline::GoalRecord;
use crate::ui::{self, FrameReport};
use crate::viewport::{self, ViewportTracker};

pub mod popover;
pub mod state;

pub use popover::{DateStep, FilterPopover, PopoverField};
pub use state::{AppState, ViewState};

type FetchResult = Result<Vec<GoalRecord>, FetchError>;

const MOUSE_SCROLL_ROWS: i64 = 3;

enum Action {
    Quit,
    ScrollDown,
    ScrollUp,
    PageDown,
    PageUp,
    Top,
    Bottom,
    ToggleSpacing,
    OpenFilter,
}

/// Inputs that decide whether the last frame needs a fresh intersection
/// measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MeasureKey {
    generation: u64,
    scroll: u32,
    viewport_height: u32,
    total_rows: u32,
    spacing_enabled: bool,
}

pub struct App {
    pub config: Arc<AppConfig>,
    state: AppState,
    tracker: ViewportTracker,
    report: FrameReport,
    fetch_rx: Option<Receiver<FetchResult>>,
    observed_generation: Option<u64>,
    measured: Option<MeasureKey>,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(
        config: Arc<AppConfig>,
        source: Box<dyn GoalSource>,
        user_id: Option<String>,
    ) -> Result<Self> {
        let state = AppState::new(
            user_id.clone(),
            source.describe(),
            config.timeline.unknown_dates,
            config.timeline.spacing_enabled,
            config.spacing.clone(),
        );
        let fetch_rx = spawn_fetch(source, user_id).context("starting goal fetch")?;
        Ok(Self {
            tracker: ViewportTracker::new(config.viewport.clone()),
            tick_rate: config.ui.tick_rate(),
            config,
            state,
            report: FrameReport::default(),
            fetch_rx: Some(fetch_rx),
            observed_generation: None,
            measured: None,
            should_quit: false,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        self.tracker.teardown();
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            self.poll_fetch();
            self.sync_observation();

            let state = &self.state;
            let signal = self.tracker.signal();
            let mut report = FrameReport::default();
            terminal
                .draw(|frame| report = ui::draw_app(frame, state, signal))
                .context("rendering frame")?;
            self.report = report;
            self.state.scroll = self.state.scroll.min(self.report.max_scroll());
            let signaled = self.measure_intersections(Instant::now());

            if self.should_quit {
                break;
            }
            // show a newly raised indicator without waiting for input or a tick
            if signaled {
                continue;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                match event::read().context("reading terminal event")? {
                    Event::Key(key) => self.handle_key(key),
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    Event::Resize(_, _) => {
                        // next draw reports the new geometry and triggers a measurement
                    }
                    _ => {}
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick(Instant::now());
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    fn poll_fetch(&mut self) {
        let Some(rx) = &self.fetch_rx else {
            return;
        };
        match rx.try_recv() {
            Ok(Ok(goals)) => {
                self.state.on_loaded(goals);
                self.fetch_rx = None;
            }
            Ok(Err(err)) => {
                self.state.on_failed(&err);
                self.fetch_rx = None;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                tracing::error!("fetch worker exited without a result");
                self.state.view = ViewState::Error("goal fetch stopped unexpectedly".into());
                self.fetch_rx = None;
            }
        }
    }

    /// Rebuilds the observation session whenever the visible set changed.
    fn sync_observation(&mut self) {
        if !self.state.is_ready() {
            return;
        }
        let generation = self.state.generation();
        if self.observed_generation == Some(generation) {
            return;
        }
        let visible = self.state.visible_entries();
        self.tracker.observe(&visible);
        tracing::debug!(visible = visible.len(), generation, "visible set changed");
        self.observed_generation = Some(generation);
        self.measured = None;
    }

    /// Measures once per layout change. Returns whether the indicator was
    /// raised, in which case the frame on screen is stale.
    fn measure_intersections(&mut self, now: Instant) -> bool {
        if !self.tracker.is_observing() {
            return false;
        }
        let key = MeasureKey {
            generation: self.state.generation(),
            scroll: self.state.scroll,
            viewport_height: self.report.viewport_height,
            total_rows: self.report.total_rows,
            spacing_enabled: self.state.spacing_enabled,
        };
        if self.measured == Some(key) {
            return false;
        }
        self.measured = Some(key);
        let records = viewport::measure(
            self.report.spans.iter().map(|(id, span)| (id, *span)),
            key.scroll,
            key.viewport_height,
        );
        match self.tracker.on_intersections(&records, now) {
            Some(signal) => {
                tracing::trace!(label = %signal.label, "date indicator shown");
                true
            }
            None => false,
        }
    }

    fn on_tick(&mut self, now: Instant) {
        if self.tracker.poll(now).is_some() {
            tracing::trace!("date indicator hidden");
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.handle_action(Action::Quit);
            return;
        }
        if self.state.popover.is_open() {
            self.handle_popover_key(key);
            return;
        }

        let action = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
            KeyCode::Char('j') | KeyCode::Down => Some(Action::ScrollDown),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::ScrollUp),
            KeyCode::PageDown | KeyCode::Char(' ') => Some(Action::PageDown),
            KeyCode::PageUp => Some(Action::PageUp),
            KeyCode::Char('g') | KeyCode::Home => Some(Action::Top),
            KeyCode::Char('G') | KeyCode::End => Some(Action::Bottom),
            KeyCode::Char('s') => Some(Action::ToggleSpacing),
            KeyCode::Char('f') => Some(Action::OpenFilter),
            _ => None,
        };
        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        let max_scroll = self.report.max_scroll();
        let page = i64::from(self.report.viewport_height.saturating_sub(1).max(1));
        match action {
            Action::Quit => {
                self.should_quit = true;
            }
            Action::ScrollDown => self.state.scroll_by(1, max_scroll),
            Action::ScrollUp => self.state.scroll_by(-1, max_scroll),
            Action::PageDown => self.state.scroll_by(page, max_scroll),
            Action::PageUp => self.state.scroll_by(-page, max_scroll),
            Action::Top => self.state.scroll_to(0, max_scroll),
            Action::Bottom => self.state.scroll_to(max_scroll, max_scroll),
            Action::ToggleSpacing => {
                let enabled = self.state.toggle_spacing();
                tracing::debug!(enabled, "spacing toggled");
                self.state.set_status_message(Some(if enabled {
                    "Showing time between events"
                } else {
                    "Hiding time between events"
                }));
            }
            Action::OpenFilter => {
                if self.state.is_ready() {
                    self.state.popover.open();
                } else {
                    self.state
                        .set_status_message(Some("Filters are available once goals load"));
                }
            }
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.state.popover.is_open() {
            return;
        }
        let max_scroll = self.report.max_scroll();
        match mouse.kind {
            MouseEventKind::ScrollDown => self.state.scroll_by(MOUSE_SCROLL_ROWS, max_scroll),
            MouseEventKind::ScrollUp => self.state.scroll_by(-MOUSE_SCROLL_ROWS, max_scroll),
            _ => {}
        }
    }

    fn handle_popover_key(&mut self, key: KeyEvent) {
        let step = if key.modifiers.contains(KeyModifiers::SHIFT) {
            DateStep::Month
        } else {
            DateStep::Day
        };
        match key.code {
            KeyCode::Esc => {
                self.state.popover.cancel();
                self.state.set_status_message(Some("Filter unchanged"));
            }
            KeyCode::Enter => {
                if !self.state.apply_filter() {
                    self.state.set_status_message(Some("Filter unchanged"));
                }
            }
            KeyCode::Tab | KeyCode::Down => self.state.popover.move_focus(1),
            KeyCode::BackTab | KeyCode::Up => self.state.popover.move_focus(-1),
            KeyCode::Left | KeyCode::Char('h') => self.adjust_popover_field(step, -1),
            KeyCode::Right | KeyCode::Char('l') => self.adjust_popover_field(step, 1),
            KeyCode::Char('H') => self.adjust_popover_field(DateStep::Month, -1),
            KeyCode::Char('L') => self.adjust_popover_field(DateStep::Month, 1),
            KeyCode::Delete | KeyCode::Backspace => self.state.popover.unset_date(),
            KeyCode::Char('c') => self.state.popover.clear(),
            _ => {}
        }
    }

    fn adjust_popover_field(&mut self, step: DateStep, delta: i32) {
        if self.state.popover.focus() == PopoverField::Year {
            let years = self.state.years().to_vec();
            self.state.popover.cycle_year(&years, delta as isize);
        } else {
            let anchor = self.anchor_day();
            self.state.popover.step_date(step, delta, anchor);
        }
    }

    /// Day an unset date picker starts from: the signaled entry, else the
    /// first visible dated entry, else today.
    fn anchor_day(&self) -> Date {
        let signal = self.tracker.signal();
        let visible = self.state.visible_entries();
        let signaled = visible
            .iter()
            .find(|entry| signal.is_signaled(entry.id()))
            .and_then(|entry| entry.day());
        signaled
            .or_else(|| visible.iter().find_map(|entry| entry.day()))
            .unwrap_or_else(|| OffsetDateTime::now_utc().date())
    }
}

fn spawn_fetch(
    goal_source: Box<dyn GoalSource>,
    user_id: Option<String>,
) -> Result<Receiver<FetchResult>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name("goaltl-fetch".into())
        .spawn(move || {
            let result = source::load_goals(goal_source.as_ref(), user_id.as_deref());
            if tx.send(result).is_err() {
                tracing::debug!("fetch finished after the interface closed");
            }
        })
        .context("spawning fetch worker")?;
    Ok(rx)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("restoring screen state")?;
    Ok(())
}
