use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::timeline::{GoalId, TimelineEntry};

mod layout;

pub use layout::{measure, RowSpan};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Visible fraction at which an entry counts as in view.
    pub threshold: f32,
    pub quiet_period_ms: u64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            quiet_period_ms: 1000,
        }
    }
}

impl ViewportConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }
}

/// The "currently visible date" indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilitySignal {
    pub label: String,
    pub active: bool,
    pub entry: Option<GoalId>,
}

impl VisibilitySignal {
    pub fn is_signaled(&self, id: &GoalId) -> bool {
        self.active && self.entry.as_ref() == Some(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationState {
    Unobserved,
    Observed,
    Intersecting,
    NotIntersecting,
}

/// Visible fraction of one observed element, as reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionRecord {
    pub entry: GoalId,
    pub ratio: f32,
}

#[derive(Debug, Clone)]
struct Observation {
    position: usize,
    label: String,
    state: ObservationState,
}

/// Observations for one rendered entry set plus the single expiry countdown.
#[derive(Debug)]
struct ObservationSession {
    observations: IndexMap<GoalId, Observation>,
    countdown: Option<Instant>,
}

impl ObservationSession {
    fn new(entries: &[&TimelineEntry]) -> Self {
        let mut observations = IndexMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if observations.contains_key(entry.id()) {
                tracing::warn!(id = %entry.id(), "duplicate goal id; observing first occurrence only");
                continue;
            }
            observations.insert(
                entry.id().clone(),
                Observation {
                    position,
                    label: entry.display_date(),
                    state: ObservationState::Observed,
                },
            );
        }
        Self {
            observations,
            countdown: None,
        }
    }
}

#[derive(Debug)]
pub struct ViewportTracker {
    config: ViewportConfig,
    session: Option<ObservationSession>,
    signal: VisibilitySignal,
}

impl ViewportTracker {
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            session: None,
            signal: VisibilitySignal::default(),
        }
    }

    pub fn signal(&self) -> &VisibilitySignal {
        &self.signal
    }

    pub fn is_observing(&self) -> bool {
        self.session.is_some()
    }

    /// When the active signal will expire, if a countdown is running.
    pub fn deadline(&self) -> Option<Instant> {
        self.session.as_ref().and_then(|session| session.countdown)
    }

    pub fn state_of(&self, id: &GoalId) -> ObservationState {
        self.session
            .as_ref()
            .and_then(|session| session.observations.get(id))
            .map(|observation| observation.state)
            .unwrap_or(ObservationState::Unobserved)
    }

    /// Replaces the current session with one observing `entries`, in
    /// document order. The previous session is fully torn down first.
    pub fn observe(&mut self, entries: &[&TimelineEntry]) {
        self.teardown();
        let session = ObservationSession::new(entries);
        tracing::debug!(observed = session.observations.len(), "observation session started");
        self.session = Some(session);
    }

    /// Releases every observation, cancels the countdown and clears the
    /// signal.
    pub fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(
                released = session.observations.len(),
                countdown = session.countdown.is_some(),
                "observation session torn down"
            );
        }
        self.signal = VisibilitySignal::default();
    }

    /// Applies one batch of intersection changes. Returns the new signal
    /// when an entry entered the viewport.
    ///
    /// When several entries cross the threshold in the same batch the one
    /// earliest in document order wins, regardless of batch order.
    pub fn on_intersections(
        &mut self,
        records: &[IntersectionRecord],
        now: Instant,
    ) -> Option<&VisibilitySignal> {
        let session = self.session.as_mut()?;
        // (document position, session index) of the earliest entry to enter
        let mut winner: Option<(usize, usize)> = None;
        for record in records {
            let Some((index, _, observation)) = session.observations.get_full_mut(&record.entry)
            else {
                tracing::trace!(id = %record.entry, "ignoring record for unobserved entry");
                continue;
            };
            let intersecting = record.ratio >= self.config.threshold;
            let entered = intersecting && observation.state != ObservationState::Intersecting;
            observation.state = if intersecting {
                ObservationState::Intersecting
            } else {
                ObservationState::NotIntersecting
            };
            if entered && winner.map_or(true, |(position, _)| observation.position < position) {
                winner = Some((observation.position, index));
            }
        }

        let (_, index) = winner?;
        let (id, observation) = session.observations.get_index(index)?;
        let id = id.clone();
        let label = observation.label.clone();
        session.countdown = Some(now + self.config.quiet_period());
        tracing::trace!(%id, %label, "entry entered viewport");
        self.signal = VisibilitySignal {
            label,
            active: true,
            entry: Some(id),
        };
        Some(&self.signal)
    }

    /// Expires the signal once the quiet period has elapsed. Returns the
    /// signal when it changed.
    pub fn poll(&mut self, now: Instant) -> Option<&VisibilitySignal> {
        let session = self.session.as_mut()?;
        let deadline = session.countdown?;
        if now < deadline {
            return None;
        }
        session.countdown = None;
        self.signal.active = false;
        Some(&self.signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{goal, sort_entries, UnknownDatePlacement};
    use assert_matches::assert_matches;

    fn entries() -> Vec<TimelineEntry> {
        sort_entries(
            vec![
                goal("a", "2021-03-01"),
                goal("b", "2021-06-01"),
                goal("c", "2022-01-01"),
            ],
            UnknownDatePlacement::Epoch,
        )
    }

    fn record(id: &str, ratio: f32) -> IntersectionRecord {
        IntersectionRecord {
            entry: GoalId::new(id),
            ratio,
        }
    }

    fn tracker_for(entries: &[TimelineEntry]) -> ViewportTracker {
        let mut tracker = ViewportTracker::new(ViewportConfig::default());
        let visible: Vec<&TimelineEntry> = entries.iter().collect();
        tracker.observe(&visible);
        tracker
    }

    #[test]
    fn entering_entry_activates_signal_with_its_date() {
        let entries = entries();
        let mut tracker = tracker_for(&entries);
        assert_matches!(tracker.state_of(&GoalId::new("a")), ObservationState::Observed);

        let now = Instant::now();
        let signal = tracker
            .on_intersections(&[record("a", 0.75), record("b", 0.1)], now)
            .cloned()
            .expect("signal emitted");
        assert!(signal.active);
        assert_eq!(signal.label, "March 1st, 2021");
        assert_eq!(signal.entry, Some(GoalId::new("a")));
        assert_matches!(tracker.state_of(&GoalId::new("a")), ObservationState::Intersecting);
        assert_matches!(
            tracker.state_of(&GoalId::new("b")),
            ObservationState::NotIntersecting
        );
        assert_matches!(tracker.state_of(&GoalId::new("zzz")), ObservationState::Unobserved);
    }

    #[test]
    fn threshold_is_inclusive() {
        let entries = entries();
        let mut tracker = tracker_for(&entries);
        assert!(tracker
            .on_intersections(&[record("b", 0.49)], Instant::now())
            .is_none());
        assert!(tracker
            .on_intersections(&[record("b", 0.5)], Instant::now())
            .is_some());
    }

    #[test]
    fn signal_expires_exactly_after_quiet_period() {
        let entries = entries();
        let mut tracker = tracker_for(&entries);
        let start = Instant::now();
        tracker.on_intersections(&[record("a", 1.0)], start);

        assert!(tracker.poll(start + Duration::from_millis(999)).is_none());
        assert!(tracker.signal().active);

        let expired = tracker
            .poll(start + Duration::from_millis(1000))
            .cloned()
            .expect("expiry reported");
        assert!(!expired.active);
        assert!(tracker.deadline().is_none());
        assert!(tracker.poll(start + Duration::from_millis(5000)).is_none());
    }

    #[test]
    fn new_entry_restarts_rather_than_stacks_the_countdown() {
        let entries = entries();
        let mut tracker = tracker_for(&entries);
        let start = Instant::now();
        tracker.on_intersections(&[record("a", 1.0)], start);
        tracker.on_intersections(&[record("b", 0.6)], start + Duration::from_millis(600));

        assert!(tracker.poll(start + Duration::from_millis(1200)).is_none());
        assert_eq!(tracker.signal().entry, Some(GoalId::new("b")));
        assert_eq!(
            tracker.deadline(),
            Some(start + Duration::from_millis(1600))
        );
        assert!(tracker.poll(start + Duration::from_millis(1600)).is_some());
        assert!(!tracker.signal().active);
    }

    #[test]
    fn staying_in_view_does_not_retrigger() {
        let entries = entries();
        let mut tracker = tracker_for(&entries);
        let start = Instant::now();
        tracker.on_intersections(&[record("a", 0.9)], start);
        assert!(tracker
            .on_intersections(&[record("a", 1.0)], start + Duration::from_millis(500))
            .is_none());
        assert_eq!(
            tracker.deadline(),
            Some(start + Duration::from_millis(1000))
        );

        tracker.on_intersections(&[record("a", 0.0)], start + Duration::from_millis(700));
        assert!(tracker
            .on_intersections(&[record("a", 0.8)], start + Duration::from_millis(800))
            .is_some());
    }

    #[test]
    fn simultaneous_crossings_pick_document_order() {
        let entries = entries();
        let mut tracker = tracker_for(&entries);
        let signal = tracker
            .on_intersections(
                &[record("c", 1.0), record("b", 1.0), record("a", 0.2)],
                Instant::now(),
            )
            .cloned()
            .expect("signal emitted");
        assert_eq!(signal.entry, Some(GoalId::new("b")));
        assert_eq!(signal.label, "June 1st, 2021");
    }

    #[test]
    fn teardown_cancels_countdown_and_ignores_stale_records() {
        let entries = entries();
        let mut tracker = tracker_for(&entries);
        let start = Instant::now();
        tracker.on_intersections(&[record("a", 1.0)], start);

        let narrowed: Vec<&TimelineEntry> = entries.iter().skip(2).collect();
        tracker.observe(&narrowed);
        assert!(!tracker.signal().active);
        assert!(tracker.deadline().is_none());
        assert_matches!(tracker.state_of(&GoalId::new("a")), ObservationState::Unobserved);

        assert!(tracker
            .on_intersections(&[record("a", 1.0)], start)
            .is_none());
        assert!(tracker
            .on_intersections(&[record("c", 1.0)], start)
            .is_some());

        tracker.teardown();
        assert!(!tracker.is_observing());
        assert!(tracker.on_intersections(&[record("c", 1.0)], start).is_none());
        assert!(tracker.poll(start + Duration::from_secs(10)).is_none());
    }

    #[test]
    fn is_signaled_requires_active_signal() {
        let mut signal = VisibilitySignal {
            label: "x".into(),
            active: true,
            entry: Some(GoalId::new("a")),
        };
        assert!(signal.is_signaled(&GoalId::new("a")));
        assert!(!signal.is_signaled(&GoalId::new("b")));
        signal.active = false;
        assert!(!signal.is_signaled(&GoalId::new("a")));
    }
}
