use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use super::{COMMANDS, CliInterface, CommandInfo};
use crate::core::task::TaskState;
use crate::core::transcript::{EntryKind, Role};

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn state_color(state: TaskState) -> Color {
    match state {
        TaskState::Idle => Color::DarkGray,
        TaskState::Starting | TaskState::Running => Color::Yellow,
        TaskState::Paused => Color::Magenta,
        TaskState::Stopped => Color::Gray,
        TaskState::Completed => Color::Green,
        TaskState::Failed => Color::Red,
    }
}

impl CliInterface {
    pub(super) fn render_messages(&self, area: Rect) -> Paragraph<'_> {
        let mut lines: Vec<Line> = Vec::new();

        for entry in &self.entries {
            let (prefix, style, content_style) = match (entry.role, entry.kind) {
                (Role::User, _) => (
                    "  > ",
                    Style::default().fg(Color::Cyan),
                    Style::default().fg(Color::White),
                ),
                (Role::Assistant, EntryKind::Progress) => (
                    "  ",
                    Style::default().fg(Color::Yellow),
                    Style::default().fg(Color::Yellow),
                ),
                (Role::Assistant, EntryKind::Terminal | EntryKind::Message) => (
                    "  ",
                    Style::default().fg(Color::Green),
                    Style::default().fg(Color::Green),
                ),
            };

            let time = entry.timestamp.with_timezone(&chrono::Local).format("%H:%M");
            lines.push(Line::from(Span::styled(
                format!("  {}", time),
                Style::default().fg(Color::DarkGray),
            )));
            for text_line in entry.content.lines() {
                let mut spans = vec![Span::styled(prefix, style)];
                spans.extend(parse_inline_markdown(text_line, content_style));
                lines.push(Line::from(spans));
            }
            for shot in &entry.screenshots {
                lines.push(Line::from(vec![
                    Span::styled("  📷 ", style),
                    Span::styled(shot.as_str(), Style::default().fg(Color::Blue)),
                ]));
            }
            lines.push(Line::from(""));
        }

        if self.task_state.is_active() {
            let frame = SPINNER[self.tick % SPINNER.len()];
            let label = match self.task_state {
                TaskState::Starting => "Submitting task...",
                TaskState::Paused => "Paused (/pause to resume)",
                _ => "Agent is working...",
            };
            lines.push(Line::from(vec![
                Span::styled("  ", Style::default()),
                Span::styled(
                    format!("{} {}", frame, label),
                    Style::default().fg(state_color(self.task_state)),
                ),
            ]));
        }

        let total_lines = lines.len() as u16;
        let visible_height = area.height.saturating_sub(2);
        let max_scroll = total_lines.saturating_sub(visible_height);
        let scroll = if self.scroll_offset == u16::MAX {
            max_scroll
        } else {
            self.scroll_offset.min(max_scroll)
        };

        let title = Line::from(vec![
            Span::raw(" voxa "),
            Span::styled(
                format!("[{}]", self.task_state.as_str()),
                Style::default()
                    .fg(state_color(self.task_state))
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!(" {} ", self.api_url),
                Style::default().fg(Color::DarkGray),
            ),
        ]);

        Paragraph::new(lines)
            .block(
                Block::default()
                    .title(title)
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::DarkGray)),
            )
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0))
    }

    pub(super) fn render_cmd_output(&self) -> Paragraph<'_> {
        let lines: Vec<Line> = self
            .cmd_output_lines
            .iter()
            .map(|l| {
                Line::from(vec![
                    Span::styled("  ", Style::default()),
                    Span::styled(l.as_str(), Style::default().fg(Color::Cyan)),
                ])
            })
            .collect();

        Paragraph::new(lines)
            .block(
                Block::default()
                    .title(" Command Output (Esc to dismiss) ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Magenta)),
            )
            .wrap(Wrap { trim: false })
    }

    pub(super) fn render_logs(&self, area: Rect) -> Paragraph<'_> {
        let visible = area.height.saturating_sub(2) as usize;
        let start = self.log_lines.len().saturating_sub(visible);
        let lines: Vec<Line> = self.log_lines[start..]
            .iter()
            .map(|l| Line::from(Span::styled(l.as_str(), Style::default().fg(Color::DarkGray))))
            .collect();

        Paragraph::new(lines).block(
            Block::default()
                .title(" Logs (/logs to hide) ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
    }

    pub(super) fn render_autocomplete(&self, input_area: Rect) -> (Paragraph<'_>, Rect) {
        let num_items = self.autocomplete_candidates.len() as u16;
        let popup_height = num_items + 2;
        let popup_width = 52;

        let popup_area = Rect {
            x: input_area.x + 1,
            y: input_area.y.saturating_sub(popup_height),
            width: popup_width.min(input_area.width.saturating_sub(2)),
            height: popup_height,
        };

        let lines: Vec<Line> = self
            .autocomplete_candidates
            .iter()
            .enumerate()
            .map(|(i, &cmd_idx)| {
                let cmd: &CommandInfo = &COMMANDS[cmd_idx];
                let is_selected = i == self.autocomplete_selected;
                let style = if is_selected {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                };
                let desc_style = if is_selected {
                    Style::default().fg(Color::DarkGray).bg(Color::Cyan)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                Line::from(vec![
                    Span::styled(format!(" {:<10}", cmd.name), style),
                    Span::styled(format!(" {}", cmd.description), desc_style),
                ])
            })
            .collect();

        let widget = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        );

        (widget, popup_area)
    }
}

/// Parse basic inline markdown: **bold**, `code`
pub(super) fn parse_inline_markdown<'a>(text: &'a str, base_style: Style) -> Vec<Span<'a>> {
    let mut spans = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if let Some(pos) = remaining.find("**") {
            if pos > 0 {
                spans.push(Span::styled(&remaining[..pos], base_style));
            }
            let after = &remaining[pos + 2..];
            if let Some(end) = after.find("**") {
                spans.push(Span::styled(
                    &after[..end],
                    base_style.add_modifier(Modifier::BOLD),
                ));
                remaining = &after[end + 2..];
            } else {
                spans.push(Span::styled(&remaining[pos..], base_style));
                break;
            }
        } else if let Some(pos) = remaining.find('`') {
            if pos > 0 {
                spans.push(Span::styled(&remaining[..pos], base_style));
            }
            let after = &remaining[pos + 1..];
            if let Some(end) = after.find('`') {
                spans.push(Span::styled(
                    &after[..end],
                    Style::default().fg(Color::Yellow),
                ));
                remaining = &after[end + 1..];
            } else {
                spans.push(Span::styled(&remaining[pos..], base_style));
                break;
            }
        } else {
            spans.push(Span::styled(remaining, base_style));
            break;
        }
    }

    if spans.is_empty() {
        spans.push(Span::styled("", base_style));
    }

    spans
}
