use super::IntersectionRecord;
use crate::timeline::GoalId;

/// Rows occupied by one rendered entry, measured from the top of the
/// scrollable content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSpan {
    pub top: u32,
    pub height: u32,
}

impl RowSpan {
    pub fn bottom(&self) -> u32 {
        self.top.saturating_add(self.height)
    }

    /// Fraction of this span inside the window `[scroll, scroll + height)`.
    pub fn visible_fraction(&self, scroll: u32, height: u32) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        let window_end = scroll.saturating_add(height);
        let overlap_start = self.top.max(scroll);
        let overlap_end = self.bottom().min(window_end);
        if overlap_end <= overlap_start {
            return 0.0;
        }
        (overlap_end - overlap_start) as f32 / self.height as f32
    }
}

/// Reports the visible fraction of every span for the given scroll window.
pub fn measure<'a, I>(spans: I, scroll: u32, height: u32) -> Vec<IntersectionRecord>
where
    I: IntoIterator<Item = (&'a GoalId, RowSpan)>,
{
    spans
        .into_iter()
        .map(|(id, span)| IntersectionRecord {
            entry: id.clone(),
            ratio: span.visible_fraction(scroll, height),
        })
        .collect()
}
