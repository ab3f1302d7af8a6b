use std::str::FromStr;

use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::popover::{FilterPopover, PopoverField};
use crate::app::state::{AppState, ViewState};
use crate::timeline::date::format_day;
use crate::timeline::spacing::gap_rows;
use crate::timeline::{project, GoalId, RenderedEntry, SpacingRules};
use crate::viewport::{RowSpan, VisibilitySignal};

const RAIL: &str = "  │ ";
const MARKER: &str = "  ● ";

/// Geometry of the last drawn timeline, used to measure intersections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub viewport_height: u32,
    pub total_rows: u32,
    pub spans: Vec<(GoalId, RowSpan)>,
}

impl FrameReport {
    pub fn max_scroll(&self) -> u32 {
        self.total_rows.saturating_sub(self.viewport_height)
    }
}

pub struct TimelineLayout {
    pub lines: Vec<Line<'static>>,
    pub spans: Vec<(GoalId, RowSpan)>,
}

pub fn draw_app(frame: &mut Frame, state: &AppState, signal: &VisibilitySignal) -> FrameReport {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(2),
        ])
        .split(frame.size());

    frame.render_widget(build_filter_bar(state), vertical[0]);

    let report = match &state.view {
        ViewState::Loading => {
            render_message(frame, vertical[1], "Loading...", Style::default().fg(Color::Gray));
            FrameReport::default()
        }
        ViewState::Error(message) => {
            render_message(
                frame,
                vertical[1],
                &format!("Error: {message}"),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            );
            FrameReport::default()
        }
        ViewState::Ready => draw_timeline(frame, vertical[1], state, signal),
    };

    let status = Paragraph::new(build_status_line(state)).wrap(Wrap { trim: true });
    frame.render_widget(status, vertical[2]);

    if state.popover.is_open() {
        render_popover(frame, &state.popover, state.years());
    }
    report
}

fn draw_timeline(
    frame: &mut Frame,
    area: Rect,
    state: &AppState,
    signal: &VisibilitySignal,
) -> FrameReport {
    let visible = state.visible_entries();
    if visible.is_empty() {
        let message = if state.entries().is_empty() {
            "No goals for this user."
        } else {
            "No goals match the current filter."
        };
        render_message(frame, area, message, Style::default().fg(Color::Gray));
        return FrameReport::default();
    }

    let rows = project(
        &visible,
        state.spacing_enabled,
        &state.spacing_rules,
        signal,
    );
    let layout = layout_timeline(&rows, area.width, &state.spacing_rules);
    let report = FrameReport {
        viewport_height: u32::from(area.height),
        total_rows: layout.lines.len() as u32,
        spans: layout.spans,
    };
    let scroll = state.scroll.min(report.max_scroll());
    let scroll = u16::try_from(scroll).unwrap_or(u16::MAX);
    frame.render_widget(Paragraph::new(layout.lines).scroll((scroll, 0)), area);

    if signal.active && !signal.label.is_empty() {
        render_indicator(frame, area, &signal.label);
    }
    report
}

/// Lays the rendered entries out as rail lines and records the rows each
/// card occupies. Gap rows in front of a card are not part of its span.
pub fn layout_timeline(rows: &[RenderedEntry], width: u16, rules: &SpacingRules) -> TimelineLayout {
    let text_width = usize::from(width).saturating_sub(RAIL.width());
    let rail_style = Style::default().fg(Color::DarkGray);
    let mut lines = Vec::new();
    let mut spans = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        if index > 0 {
            let gap = gap_rows(row.spacing, rules).max(1);
            for _ in 0..gap {
                lines.push(Line::from(Span::styled(RAIL.trim_end().to_string(), rail_style)));
            }
        }

        let top = lines.len() as u32;
        let goal = row.entry.goal();
        let marker_style = parse_color(&goal.color)
            .map(|color| Style::default().fg(color))
            .unwrap_or(rail_style);
        let date_style = if row.signaled {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::REVERSED)
        } else {
            Style::default().fg(Color::Gray)
        };

        lines.push(Line::from(vec![
            Span::styled(MARKER.to_string(), marker_style),
            Span::styled(truncate_to_width(&row.display_date, text_width), date_style),
        ]));
        lines.push(Line::from(vec![
            Span::styled(RAIL.to_string(), marker_style),
            Span::styled(
                truncate_to_width(&goal.name, text_width),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]));
        if !goal.description.trim().is_empty() {
            lines.push(Line::from(vec![
                Span::styled(RAIL.to_string(), marker_style),
                Span::styled(
                    truncate_to_width(goal.description.trim(), text_width),
                    Style::default().add_modifier(Modifier::ITALIC),
                ),
            ]));
        }

        spans.push((
            row.entry.id().clone(),
            RowSpan {
                top,
                height: lines.len() as u32 - top,
            },
        ));
    }

    TimelineLayout { lines, spans }
}

/// Goal colors arrive as CSS-like tokens: `#rrggbb`, `#rgb` or a name.
pub fn parse_color(token: &str) -> Option<Color> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if let Some(hex) = token.strip_prefix('#') {
        if hex.len() == 3 && hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            let expanded: String = hex.chars().flat_map(|ch| [ch, ch]).collect();
            return Color::from_str(&format!("#{expanded}")).ok();
        }
    }
    Color::from_str(&token.to_ascii_lowercase()).ok()
}

fn truncate_to_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for grapheme in text.graphemes(true) {
        let grapheme_width = grapheme.width();
        if used + grapheme_width + 1 > width {
            break;
        }
        out.push_str(grapheme);
        used += grapheme_width;
    }
    out.push('…');
    out
}

fn build_filter_bar(state: &AppState) -> Paragraph<'static> {
    let chips = state.popover.applied().chips();
    let mut spans = vec![Span::raw("Filter [f]: ")];
    if chips.is_empty() {
        spans.push(Span::styled("none", Style::default().fg(Color::Gray)));
    } else {
        for (idx, chip) in chips.into_iter().enumerate() {
            if idx > 0 {
                spans.push(Span::raw(" "));
            }
            spans.push(Span::styled(
                format!("[{chip}]"),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ));
        }
    }
    let toggle = if state.spacing_enabled { "[x]" } else { "[ ]" };
    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("{toggle} Show time between events [s]"),
        Style::default().fg(Color::Cyan),
    ));

    let title = match &state.user_id {
        Some(user) => format!("Goals · {user}"),
        None => "Goals".to_string(),
    };
    Paragraph::new(Line::from(spans)).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    )
}

fn build_status_line(state: &AppState) -> Text<'static> {
    let shown = state.visible_entries().len();
    let total = state.entries().len();
    let mut spans = vec![
        Span::raw(format!("{shown}/{total} goals")),
        Span::raw(" | Source: "),
        Span::styled(
            state.source_label.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ];
    if let Some(message) = &state.status_message {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            message.clone(),
            Style::default().fg(Color::Yellow),
        ));
    }
    let hints = Line::from(Span::styled(
        "j/k scroll • PgUp/PgDn page • g/G top/bottom • f filter • s spacing • q quit",
        Style::default().fg(Color::Gray),
    ));
    Text::from(vec![Line::from(spans), hints])
}

fn render_message(frame: &mut Frame, area: Rect, message: &str, style: Style) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(area);
    let paragraph = Paragraph::new(Line::from(Span::styled(message.to_string(), style)))
        .alignment(Alignment::Center);
    frame.render_widget(paragraph, vertical[1]);
}

fn render_indicator(frame: &mut Frame, area: Rect, label: &str) {
    let width = (label.width() as u16 + 4).min(area.width);
    if width < 5 || area.height < 3 {
        return;
    }
    let indicator = Rect {
        x: area.x + area.width - width,
        y: area.y + area.height / 2 - 1,
        width,
        height: 3,
    };
    frame.render_widget(Clear, indicator);
    frame.render_widget(
        Paragraph::new(label.to_string()).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Gray)),
        ),
        indicator,
    );
}

fn render_popover(frame: &mut Frame, popover: &FilterPopover, years: &[i32]) {
    let area = centered_rect(60, 50, frame.size());
    frame.render_widget(Clear, area);

    let draft = popover.draft();
    let field_line = |field: PopoverField, value: String, value_style: Style| {
        let focused = popover.focus() == field;
        let label_style = if focused {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let prefix = if focused { "▸ " } else { "  " };
        Line::from(vec![
            Span::styled(format!("{prefix}{:<12}", field.to_string()), label_style),
            Span::styled(value, value_style),
        ])
    };
    let value_style = Style::default().add_modifier(Modifier::BOLD);
    let day_line = |field: PopoverField, day: Option<time::Date>| match day {
        None => field_line(field, "(unset)".into(), value_style),
        Some(day) if popover.is_selectable(day) => field_line(field, format_day(day), value_style),
        Some(day) => field_line(
            field,
            format!("{} (outside {})", format_day(day), draft.year),
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::CROSSED_OUT),
        ),
    };
    let year_choices = if years.is_empty() {
        "All".to_string()
    } else {
        format!(
            "All, {}",
            years
                .iter()
                .map(i32::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    let mut lines = vec![
        Line::from(Span::styled(
            "Filter Timeline",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        field_line(PopoverField::Year, draft.year.to_string(), value_style),
        Line::from(Span::styled(
            format!("    {year_choices}"),
            Style::default().fg(Color::Gray),
        )),
        day_line(PopoverField::Start, draft.start),
        day_line(PopoverField::End, draft.end),
        Line::from(""),
    ];
    if let (Some(start), Some(end)) = (draft.start, draft.end) {
        if start > end {
            lines.push(Line::from(Span::styled(
                "Start is after end: nothing will match.",
                Style::default().fg(Color::Yellow),
            )));
        }
    }
    lines.push(Line::from(Span::styled(
        "Tab field • ←/→ change • Shift+←/→ month • Del unset • c clear • Enter apply • Esc cancel",
        Style::default().fg(Color::Gray),
    )));

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title("Filter")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
