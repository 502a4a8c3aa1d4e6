use std::collections::VecDeque;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use arcade::ConnectionStatus;

use crate::runner::{ParticipantView, SimStats};

const MAX_LOG_LINES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

pub struct TuiState {
    logs: VecDeque<(LogLevel, String)>,
    scroll: usize,
    paused: bool,
}

impl TuiState {
    pub fn new() -> Self {
        Self {
            logs: VecDeque::new(),
            scroll: 0,
            paused: false,
        }
    }

    fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.logs.len() == MAX_LOG_LINES {
            self.logs.pop_front();
        }
        self.logs.push_back((level, message.into()));
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn log_warn(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message);
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn scroll_up(&mut self) {
        self.scroll = (self.scroll + 5).min(self.logs.len());
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(5);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = 0;
    }
}

pub fn render(frame: &mut Frame, state: &TuiState, title: &str, stats: &SimStats, views: &[ParticipantView]) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Min(18),
            Constraint::Length(8),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], title, stats, state.paused);
    render_store(frame, chunks[1], stats);
    render_tables(frame, chunks[2], views);
    render_log(frame, chunks[3], state);
    render_help(frame, chunks[4]);
}

fn render_header(frame: &mut Frame, area: Rect, title: &str, stats: &SimStats, paused: bool) {
    let title = format!(" {} - Sim time: {} ", title, format_duration(stats.elapsed_ms / 1000));

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let mut text = format!("Frame: {}  |  Documents: {}", stats.frame, stats.documents);
    if let Some(game) = stats.stored {
        text.push_str(&format!("  |  Stored: {}", game));
    }
    if stats.finished {
        text.push_str("  |  FINISHED");
    }
    if paused {
        text.push_str("  |  PAUSED");
    }

    let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(paragraph, area);
}

fn render_store(frame: &mut Frame, area: Rect, stats: &SimStats) {
    let block = Block::default()
        .title(" Store ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let store = &stats.store;
    let lines = vec![
        Line::from(vec![
            Span::styled("Writes: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{} accepted / {} rejected", store.writes, store.rejected),
                Style::default().fg(if store.rejected > 0 {
                    Color::Red
                } else {
                    Color::White
                }),
            ),
        ]),
        Line::from(vec![
            Span::styled("Reads: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}  Notifications: {}", store.reads, store.notifications),
                Style::default().fg(Color::White),
            ),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_tables(frame: &mut Frame, area: Rect, views: &[ParticipantView]) {
    if views.is_empty() {
        return;
    }
    let constraints = vec![Constraint::Ratio(1, views.len() as u32); views.len()];
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    for (view, area) in views.iter().zip(columns.iter()) {
        let role = if view.is_host { "host" } else { "guest" };
        let color = match view.connection {
            ConnectionStatus::Online => Color::Green,
            ConnectionStatus::Offline => Color::Yellow,
            ConnectionStatus::Terminated => Color::Red,
        };
        let id = view.id.as_ref().map(|id| id.as_str()).unwrap_or("-");
        let block = Block::default()
            .title(format!(
                " {} [{}] ({}, {:?}, {:?}) ",
                view.name, id, role, view.connection, view.phase
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color));

        let lines: Vec<Line> = view.lines.iter().map(|line| Line::from(line.as_str())).collect();
        frame.render_widget(Paragraph::new(lines).block(block), *area);
    }
}

fn render_log(frame: &mut Frame, area: Rect, state: &TuiState) {
    let block = Block::default()
        .title(" Events ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    let visible = area.height.saturating_sub(2) as usize;
    let end = state.logs.len().saturating_sub(state.scroll);
    let start = end.saturating_sub(visible);
    let lines: Vec<Line> = state
        .logs
        .range(start..end)
        .map(|(level, message)| {
            let color = match level {
                LogLevel::Info => Color::White,
                LogLevel::Warn => Color::Yellow,
                LogLevel::Error => Color::Red,
            };
            Line::from(Span::styled(message.as_str(), Style::default().fg(color)))
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Controls ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = Paragraph::new("q/ESC quit  |  space pause  |  f toggle store outage  |  PgUp/PgDn/End scroll")
        .block(block)
        .style(
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        );

    frame.render_widget(text, area);
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_bounded() {
        let mut state = TuiState::new();
        for i in 0..(MAX_LOG_LINES + 10) {
            state.log_info(format!("line {i}"));
        }
        assert_eq!(state.logs.len(), MAX_LOG_LINES);
        assert_eq!(state.logs.front().map(|(_, m)| m.as_str()), Some("line 10"));
    }

    #[test]
    fn duration_formats_as_clock() {
        assert_eq!(format_duration(3_725), "01:02:05");
    }
}
