//! Ratatui widgets for the conversation screen.

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget, Wrap},
};

use super::animation::Tweenable;
use super::card::{CardPhase, StageCard};
use crate::error::ClientError;

// ============================================================================
// Color Constants
// ============================================================================

pub mod colors {
    use ratatui::style::Color;

    pub const CYAN: Color = Color::Rgb(34, 211, 238);
    pub const GREEN: Color = Color::Rgb(34, 197, 94);
    pub const YELLOW: Color = Color::Rgb(234, 179, 8);
    pub const RED: Color = Color::Rgb(239, 68, 68);
    pub const BLUE: Color = Color::Rgb(59, 130, 246);
    pub const GRAY: Color = Color::Rgb(107, 114, 128);
    pub const WHITE: Color = Color::Rgb(255, 255, 255);
}

const CURSOR: &str = "█";
pub const INPUT_PLACEHOLDER: &str = "Type your message...";

/// Number of rows `text` takes when wrapped to `width` columns.
pub fn wrapped_rows(text: &str, width: u16) -> u16 {
    let width = width.max(1) as usize;
    let rows: usize = text
        .split('\n')
        .map(|line| line.chars().count().div_ceil(width).max(1))
        .sum();
    rows.min(u16::MAX as usize) as u16
}

// ============================================================================
// Title
// ============================================================================

/// The typewriter title, large until the first prompt is sent.
#[derive(Debug, Clone)]
pub struct TitleWidget<'a> {
    text: &'a str,
    minimized: bool,
    cursor_visible: bool,
}

impl<'a> TitleWidget<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            minimized: false,
            cursor_visible: true,
        }
    }

    pub fn minimized(mut self, minimized: bool) -> Self {
        self.minimized = minimized;
        self
    }

    pub fn cursor(mut self, visible: bool) -> Self {
        self.cursor_visible = visible;
        self
    }

    /// Rows the title needs.
    pub fn height(minimized: bool) -> u16 {
        if minimized {
            1
        } else {
            3
        }
    }
}

impl Widget for TitleWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 {
            return;
        }

        let cursor = if self.cursor_visible { CURSOR } else { " " };
        let mut style = Style::default().fg(colors::WHITE).add_modifier(Modifier::BOLD);
        if self.minimized {
            style = style.fg(colors::GRAY);
        }
        let line = Line::from(vec![
            Span::styled(self.text.to_string(), style),
            Span::styled(cursor, Style::default().fg(colors::CYAN)),
        ]);

        let (alignment, row) = if self.minimized {
            (Alignment::Left, area)
        } else {
            let middle = area.height / 2;
            (
                Alignment::Center,
                Rect::new(area.x, area.y + middle, area.width, 1),
            )
        };
        Paragraph::new(line).alignment(alignment).render(row, buf);
    }
}

// ============================================================================
// Transcript
// ============================================================================

/// Messages the user sent, right-aligned like chat bubbles.
#[derive(Debug, Clone)]
pub struct TranscriptWidget<'a> {
    messages: &'a [String],
}

impl<'a> TranscriptWidget<'a> {
    pub fn new(messages: &'a [String]) -> Self {
        Self { messages }
    }

    pub fn height(messages: &[String], width: u16) -> u16 {
        messages
            .iter()
            .map(|m| wrapped_rows(m.trim_end_matches('\n'), width))
            .sum()
    }
}

impl Widget for TranscriptWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let lines: Vec<Line> = self
            .messages
            .iter()
            .flat_map(|m| m.trim_end_matches('\n').split('\n'))
            .map(|line| Line::styled(line.to_string(), Style::default().fg(colors::BLUE)))
            .collect();
        Paragraph::new(lines)
            .alignment(Alignment::Right)
            .wrap(Wrap { trim: false })
            .render(area, buf);
    }
}

// ============================================================================
// Stage Card
// ============================================================================

/// One stage card: header, revealed text, collapsing to a preview line.
#[derive(Debug, Clone)]
pub struct StageCardWidget<'a> {
    card: &'a StageCard,
    note: Option<&'a str>,
    spinner: &'a str,
}

impl<'a> StageCardWidget<'a> {
    pub fn new(card: &'a StageCard) -> Self {
        Self {
            card,
            note: None,
            spinner: "",
        }
    }

    /// Extra line shown under the text while expanded.
    pub fn note(mut self, note: Option<&'a str>) -> Self {
        self.note = note;
        self
    }

    /// Spinner shown in the header while the card animates.
    pub fn spinner(mut self, spinner: &'a str) -> Self {
        self.spinner = spinner;
        self
    }

    /// Rows the card occupies at `width`, interpolated while collapsing.
    pub fn height(card: &StageCard, note: Option<&str>, width: u16) -> u16 {
        let inner = width.saturating_sub(2);
        let collapsed: u16 = 3;
        let expanded = wrapped_rows(card.text(), inner)
            + note.map_or(0, |n| wrapped_rows(n, inner))
            + 2;
        match card.phase() {
            CardPhase::Hidden => 0,
            CardPhase::Collapsed => collapsed,
            CardPhase::Collapsing => expanded.lerp(&collapsed, card.collapse_progress()),
            CardPhase::Revealing | CardPhase::Holding => {
                wrapped_rows(card.displayed(), inner)
                    + note.map_or(0, |n| wrapped_rows(n, inner))
                    + 2
            }
        }
    }
}

impl Widget for StageCardWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if self.card.phase() == CardPhase::Hidden || area.height < 3 || area.width < 4 {
            return;
        }

        let collapsed = self.card.phase() == CardPhase::Collapsed;
        let border = if collapsed { colors::GRAY } else { colors::CYAN };
        let mut title = vec![Span::styled(
            format!(" {} ", self.card.header()),
            Style::default().fg(colors::WHITE).add_modifier(Modifier::BOLD),
        )];
        if !collapsed && !self.spinner.is_empty() {
            title.push(Span::styled(
                format!("{} ", self.spinner),
                Style::default().fg(colors::YELLOW),
            ));
        }
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(border))
            .title(Line::from(title));

        let mut lines: Vec<Line> = Vec::new();
        match self.card.phase() {
            CardPhase::Collapsed => {
                lines.push(Line::styled(
                    self.card.preview().replace('\n', " "),
                    Style::default().fg(colors::GRAY),
                ));
            }
            CardPhase::Collapsing => {
                lines.extend(self.card.text().split('\n').map(|l| Line::raw(l.to_string())));
            }
            _ => {
                lines.extend(
                    self.card
                        .displayed()
                        .split('\n')
                        .map(|l| Line::raw(l.to_string())),
                );
            }
        }
        if !collapsed {
            if let Some(note) = self.note {
                lines.push(Line::styled(
                    note.to_string(),
                    Style::default().fg(colors::GRAY).add_modifier(Modifier::ITALIC),
                ));
            }
        }

        let paragraph = Paragraph::new(lines).block(block);
        if collapsed {
            paragraph.render(area, buf);
        } else {
            paragraph.wrap(Wrap { trim: false }).render(area, buf);
        }
    }
}

// ============================================================================
// Input
// ============================================================================

/// The prompt editor.
#[derive(Debug, Clone)]
pub struct InputWidget<'a> {
    text: &'a str,
    focused: bool,
    cursor_visible: bool,
}

impl<'a> InputWidget<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            focused: true,
            cursor_visible: true,
        }
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    pub fn cursor(mut self, visible: bool) -> Self {
        self.cursor_visible = visible;
        self
    }

    pub fn height(text: &str, width: u16) -> u16 {
        wrapped_rows(text, width.saturating_sub(2)) + 2
    }
}

impl Widget for InputWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let border = if self.focused {
            colors::CYAN
        } else {
            colors::GRAY
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(border))
            .title_bottom(Line::styled(
                " Enter send · Shift+Enter newline · Esc reset · Ctrl+C quit ",
                Style::default().fg(colors::GRAY),
            ));

        let mut lines: Vec<Line> = if self.text.is_empty() {
            vec![Line::styled(
                INPUT_PLACEHOLDER,
                Style::default().fg(colors::GRAY),
            )]
        } else {
            self.text
                .split('\n')
                .map(|l| Line::raw(l.to_string()))
                .collect()
        };
        if self.focused && self.cursor_visible {
            let cursor = Span::styled(CURSOR, Style::default().fg(colors::CYAN));
            if self.text.is_empty() {
                lines[0].spans.insert(0, cursor);
            } else if let Some(last) = lines.last_mut() {
                last.spans.push(cursor);
            }
        }

        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .render(area, buf);
    }
}

// ============================================================================
// Status
// ============================================================================

/// A one-line status, or a red banner when the session failed.
#[derive(Debug, Clone)]
pub struct StatusWidget<'a> {
    status: Option<&'a str>,
    error: Option<&'a ClientError>,
    done: bool,
}

impl<'a> StatusWidget<'a> {
    pub fn new(status: Option<&'a str>, error: Option<&'a ClientError>) -> Self {
        Self {
            status,
            error,
            done: false,
        }
    }

    pub fn done(mut self, done: bool) -> Self {
        self.done = done;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.error.is_none() && !self.done
    }
}

impl Widget for StatusWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let line = if let Some(error) = self.error {
            Line::from(vec![
                Span::styled(
                    " ✗ ",
                    Style::default()
                        .fg(Color::Black)
                        .bg(colors::RED)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!(
                        " {}: {} · Esc to start over",
                        error.category().label(),
                        error
                    ),
                    Style::default().fg(colors::RED),
                ),
            ])
        } else if let Some(status) = self.status {
            Line::styled(format!("⚠ {}", status), Style::default().fg(colors::YELLOW))
        } else if self.done {
            Line::styled(
                "✓ Your model is deployed · Esc to start over",
                Style::default().fg(colors::GREEN),
            )
        } else {
            return;
        };
        Paragraph::new(line).render(area, buf);
    }
}
