use anyhow::Result;
use crossterm::{
    event::{
        self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
        Event, KeyCode, KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};

/// When input exceeds this length (e.g. from paste), show a placeholder instead of raw text
/// to avoid terminal display overflow and overlapping with subsequent UI.
const PASTE_DISPLAY_THRESHOLD: usize = 100;
use ratatui::{
    Terminal,
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::{Block, Borders, Clear, Paragraph},
};
use std::{io, time::Duration};

use super::CliInterface;

impl CliInterface {
    pub async fn run_tui(&mut self) -> Result<()> {
        self.entries = self.session.transcript().await;
        self.task_state = self.session.state().await;
        self.scroll_to_bottom();

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            EnableMouseCapture,
            EnableBracketedPaste
        )?;
        let backend = ratatui::backend::CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let res = self.run_app(&mut terminal).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture,
            DisableBracketedPaste
        )?;
        terminal.show_cursor()?;

        // Leaving the panel ends the session.
        if self.task_state.is_active() {
            self.session.stop().await;
        }
        res
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()>
    where
        <B as Backend>::Error: std::error::Error + Send + Sync + 'static,
    {
        loop {
            if self.should_quit {
                return Ok(());
            }

            self.drain_session_events().await;
            self.drain_logs();
            if self.task_state.is_active() {
                self.tick = self.tick.wrapping_add(1);
            }

            let busy = self.task_state.is_active();
            let input_buf = self.input_buffer.clone();
            let cursor_pos = self.cursor_pos;
            let cmd_output_visible = self.cmd_output_visible;
            let logs_visible = self.logs_visible;
            let autocomplete_visible = self.autocomplete_visible;

            terminal.draw(|f| {
                let mut constraints = vec![Constraint::Min(1)];
                if logs_visible {
                    constraints.push(Constraint::Length(8));
                }
                if cmd_output_visible {
                    // Auto-size to content, capped at 12 lines
                    let output_height = (self.cmd_output_lines.len() as u16 + 2).min(12);
                    constraints.push(Constraint::Length(output_height));
                }
                constraints.push(Constraint::Length(3));

                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints(constraints)
                    .split(f.area());

                let mut idx = 0;
                f.render_widget(self.render_messages(chunks[idx]), chunks[idx]);
                idx += 1;
                if logs_visible {
                    f.render_widget(self.render_logs(chunks[idx]), chunks[idx]);
                    idx += 1;
                }
                if cmd_output_visible {
                    f.render_widget(self.render_cmd_output(), chunks[idx]);
                    idx += 1;
                }
                let input_area = chunks[idx];

                let prompt_label = if busy { "task > " } else { "voxa > " };
                let displayed_input = if input_buf.len() > PASTE_DISPLAY_THRESHOLD {
                    format!("[Pasted content - {} chars]", input_buf.len())
                } else {
                    input_buf.clone()
                };
                let input_text = format!("{}{}", prompt_label, displayed_input);

                let input_style = if busy {
                    Style::default().fg(Color::DarkGray)
                } else {
                    Style::default().fg(Color::White)
                };

                let input_widget = Paragraph::new(input_text)
                    .block(
                        Block::default()
                            .borders(Borders::ALL)
                            .border_style(Style::default().fg(Color::DarkGray)),
                    )
                    .style(input_style);
                f.render_widget(input_widget, input_area);

                if autocomplete_visible && !self.autocomplete_candidates.is_empty() {
                    let (popup_widget, popup_area) = self.render_autocomplete(input_area);
                    f.render_widget(Clear, popup_area);
                    f.render_widget(popup_widget, popup_area);
                }

                let cursor_display_len = if input_buf.len() > PASTE_DISPLAY_THRESHOLD {
                    displayed_input.len()
                } else {
                    cursor_pos
                };
                let cursor_x =
                    input_area.x + 1 + prompt_label.len() as u16 + cursor_display_len as u16;
                let cursor_y = input_area.y + 1;
                f.set_cursor_position((cursor_x, cursor_y));
            })?;

            // Short timeout keeps the spinner moving
            if crossterm::event::poll(Duration::from_millis(80))? {
                match event::read()? {
                    Event::Key(key) => {
                        if key.modifiers.contains(KeyModifiers::CONTROL)
                            && key.code == KeyCode::Char('c')
                        {
                            self.should_quit = true;
                            continue;
                        }

                        match key.code {
                            KeyCode::Enter => {
                                if self.autocomplete_visible {
                                    self.accept_autocomplete();
                                } else if !self.input_buffer.trim().is_empty() {
                                    let input = std::mem::take(&mut self.input_buffer);
                                    self.cursor_pos = 0;

                                    if input.starts_with('/') {
                                        self.handle_command(input.trim()).await;
                                    } else {
                                        // A busy session answers with a notice.
                                        self.submit_instruction(input);
                                    }
                                }
                            }
                            KeyCode::Tab => {
                                if self.autocomplete_visible {
                                    self.accept_autocomplete();
                                }
                            }
                            KeyCode::Backspace => {
                                if let Some(c) =
                                    self.input_buffer[..self.cursor_pos].chars().next_back()
                                {
                                    self.cursor_pos -= c.len_utf8();
                                    self.input_buffer.remove(self.cursor_pos);
                                    self.update_autocomplete();
                                }
                            }
                            KeyCode::Delete => {
                                if self.cursor_pos < self.input_buffer.len() {
                                    self.input_buffer.remove(self.cursor_pos);
                                    self.update_autocomplete();
                                }
                            }
                            KeyCode::Left => {
                                if let Some(c) =
                                    self.input_buffer[..self.cursor_pos].chars().next_back()
                                {
                                    self.cursor_pos -= c.len_utf8();
                                }
                            }
                            KeyCode::Right => {
                                if let Some(c) = self.input_buffer[self.cursor_pos..].chars().next()
                                {
                                    self.cursor_pos += c.len_utf8();
                                }
                            }
                            KeyCode::Up => {
                                if self.autocomplete_visible {
                                    self.autocomplete_selected =
                                        self.autocomplete_selected.saturating_sub(1);
                                } else {
                                    if self.scroll_offset == u16::MAX {
                                        self.scroll_offset =
                                            (self.entries.len() as u16 * 3).saturating_sub(3);
                                    }
                                    self.scroll_offset = self.scroll_offset.saturating_sub(3);
                                }
                            }
                            KeyCode::Down => {
                                if self.autocomplete_visible {
                                    if self.autocomplete_selected + 1
                                        < self.autocomplete_candidates.len()
                                    {
                                        self.autocomplete_selected += 1;
                                    }
                                } else if self.scroll_offset != u16::MAX {
                                    self.scroll_offset = self.scroll_offset.saturating_add(3);
                                }
                            }
                            KeyCode::Home => {
                                self.cursor_pos = 0;
                            }
                            KeyCode::End => {
                                self.cursor_pos = self.input_buffer.len();
                            }
                            KeyCode::Esc => {
                                if self.autocomplete_visible {
                                    self.autocomplete_visible = false;
                                    self.autocomplete_candidates.clear();
                                } else if self.cmd_output_visible {
                                    self.cmd_output_visible = false;
                                    self.cmd_output_lines.clear();
                                } else {
                                    self.input_buffer.clear();
                                    self.cursor_pos = 0;
                                }
                            }
                            KeyCode::PageUp => {
                                if self.scroll_offset == u16::MAX {
                                    self.scroll_offset =
                                        (self.entries.len() as u16 * 3).saturating_sub(10);
                                }
                                self.scroll_offset = self.scroll_offset.saturating_sub(10);
                            }
                            KeyCode::PageDown => {
                                if self.scroll_offset != u16::MAX {
                                    self.scroll_offset = self.scroll_offset.saturating_add(10);
                                }
                            }
                            KeyCode::Char(c) => {
                                self.input_buffer.insert(self.cursor_pos, c);
                                self.cursor_pos += c.len_utf8();
                                self.update_autocomplete();
                            }
                            _ => {}
                        }
                    }
                    Event::Paste(data) => {
                        self.input_buffer.insert_str(self.cursor_pos, &data);
                        self.cursor_pos += data.len();
                        self.update_autocomplete();
                    }
                    _ => {}
                }
            }
        }
    }
}
