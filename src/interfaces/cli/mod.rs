mod commands;
mod events;
mod stream;
mod ui;

use tokio::sync::{broadcast, mpsc};

use crate::core::session::{AgentSession, SessionEvent, StartOutcome};
use crate::core::task::TaskState;
use crate::core::transcript::TranscriptEntry;

struct CommandInfo {
    name: &'static str,
    description: &'static str,
    takes_args: bool,
}

const COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "/help",
        description: "Show all available commands",
        takes_args: false,
    },
    CommandInfo {
        name: "/pause",
        description: "Pause or resume the running task",
        takes_args: false,
    },
    CommandInfo {
        name: "/stop",
        description: "Stop the current task",
        takes_args: false,
    },
    CommandInfo {
        name: "/status",
        description: "Show task state and executor",
        takes_args: false,
    },
    CommandInfo {
        name: "/settings",
        description: "Show agent and browser settings",
        takes_args: false,
    },
    CommandInfo {
        name: "/set",
        description: "Change a setting (/set <key> <value>)",
        takes_args: true,
    },
    CommandInfo {
        name: "/import",
        description: "Load a settings bundle (/import <path>)",
        takes_args: true,
    },
    CommandInfo {
        name: "/export",
        description: "Save settings as a bundle (/export <path>)",
        takes_args: true,
    },
    CommandInfo {
        name: "/open",
        description: "Open the web UI from the last handoff",
        takes_args: false,
    },
    CommandInfo {
        name: "/logs",
        description: "Toggle the log panel",
        takes_args: false,
    },
    CommandInfo {
        name: "/clear",
        description: "Clear the transcript",
        takes_args: false,
    },
    CommandInfo {
        name: "/quit",
        description: "Exit the TUI",
        takes_args: false,
    },
    CommandInfo {
        name: "/exit",
        description: "Exit the TUI",
        takes_args: false,
    },
];

const MAX_LOG_LINES: usize = 200;

pub struct CliInterface {
    session: AgentSession,
    api_url: String,
    events: broadcast::Receiver<SessionEvent>,
    log_rx: broadcast::Receiver<String>,
    outcome_tx: mpsc::UnboundedSender<StartOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<StartOutcome>,

    // Mirrors of session state, refreshed from events
    entries: Vec<TranscriptEntry>,
    task_state: TaskState,

    // TUI state
    input_buffer: String,
    cursor_pos: usize,
    scroll_offset: u16,
    tick: usize,
    should_quit: bool,

    // Autocomplete state
    autocomplete_visible: bool,
    autocomplete_selected: usize,
    autocomplete_candidates: Vec<usize>, // indices into COMMANDS

    // Command output panel
    cmd_output_lines: Vec<String>,
    cmd_output_visible: bool,

    log_lines: Vec<String>,
    logs_visible: bool,
}

impl CliInterface {
    pub fn new(session: AgentSession, api_url: String, log_tx: broadcast::Sender<String>) -> Self {
        let events = session.subscribe();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            session,
            api_url,
            events,
            log_rx: log_tx.subscribe(),
            outcome_tx,
            outcome_rx,
            entries: Vec::new(),
            task_state: TaskState::Idle,
            input_buffer: String::new(),
            cursor_pos: 0,
            scroll_offset: 0,
            tick: 0,
            should_quit: false,
            autocomplete_visible: false,
            autocomplete_selected: 0,
            autocomplete_candidates: vec![],
            cmd_output_lines: vec![],
            cmd_output_visible: false,
            log_lines: Vec::new(),
            logs_visible: false,
        }
    }

    fn update_autocomplete(&mut self) {
        // Only while typing the command name itself
        if self.input_buffer.starts_with('/') && !self.input_buffer.contains(' ') {
            let prefix = &self.input_buffer;
            self.autocomplete_candidates = COMMANDS
                .iter()
                .enumerate()
                .filter(|(_, c)| c.name.starts_with(prefix))
                .map(|(i, _)| i)
                .collect();
            if !self.autocomplete_candidates.is_empty() {
                self.autocomplete_visible = true;
                if self.autocomplete_selected >= self.autocomplete_candidates.len() {
                    self.autocomplete_selected = self.autocomplete_candidates.len() - 1;
                }
            } else {
                self.autocomplete_visible = false;
                self.autocomplete_selected = 0;
            }
        } else {
            self.autocomplete_visible = false;
            self.autocomplete_selected = 0;
            self.autocomplete_candidates.clear();
        }
    }

    fn accept_autocomplete(&mut self) {
        if let Some(&cmd_idx) = self.autocomplete_candidates.get(self.autocomplete_selected) {
            let cmd = &COMMANDS[cmd_idx];
            self.input_buffer = cmd.name.to_string();
            if cmd.takes_args {
                self.input_buffer.push(' ');
            }
            self.cursor_pos = self.input_buffer.len();
        }
        self.autocomplete_visible = false;
        self.autocomplete_candidates.clear();
    }

    fn push_cmd_output(&mut self, msg: String) {
        self.cmd_output_lines.push(msg);
        self.cmd_output_visible = true;
    }

    fn scroll_to_bottom(&mut self) {
        // Clamped during render
        self.scroll_offset = u16::MAX;
    }

    /// Hand an instruction to the session without blocking the draw loop.
    fn submit_instruction(&mut self, instruction: String) {
        self.cmd_output_lines.clear();
        self.cmd_output_visible = false;
        self.scroll_to_bottom();

        let session = self.session.clone();
        let outcome_tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let outcome = session.start(&instruction).await;
            let _ = outcome_tx.send(outcome);
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::gateway::HttpGateway;
    use crate::core::settings::SettingsStore;
    use crate::core::task::PollTiming;

    fn interface() -> CliInterface {
        let gateway = HttpGateway::new("http://127.0.0.1:9", false).unwrap();
        let session = AgentSession::new(
            Arc::new(gateway),
            SettingsStore::default(),
            PollTiming::default(),
            "browser_use",
        );
        let (log_tx, _) = broadcast::channel(16);
        CliInterface::new(session, "http://127.0.0.1:9".to_string(), log_tx)
    }

    #[test]
    fn autocomplete_filters_by_prefix() {
        let mut cli = interface();
        cli.input_buffer = "/s".to_string();
        cli.update_autocomplete();
        let names: Vec<&str> = cli
            .autocomplete_candidates
            .iter()
            .map(|&i| COMMANDS[i].name)
            .collect();
        assert_eq!(names, vec!["/stop", "/status", "/settings", "/set"]);
        assert!(cli.autocomplete_visible);

        cli.input_buffer = "/set maxSteps".to_string();
        cli.update_autocomplete();
        assert!(!cli.autocomplete_visible);
    }

    #[test]
    fn accepting_a_command_with_args_leaves_a_space() {
        let mut cli = interface();
        cli.input_buffer = "/se".to_string();
        cli.update_autocomplete();
        cli.autocomplete_selected = 1;
        cli.accept_autocomplete();
        assert_eq!(cli.input_buffer, "/set ");
        assert_eq!(cli.cursor_pos, 5);
    }

    #[tokio::test]
    async fn set_command_updates_session_settings() {
        let mut cli = interface();
        cli.handle_command("/set maxSteps 42").await;
        let (agent, _) = cli.session.settings_snapshot().await;
        assert_eq!(agent.max_steps, 42);
        assert!(cli.cmd_output_lines[0].contains("maxSteps"));
    }

    #[tokio::test]
    async fn set_command_reports_rejection() {
        let mut cli = interface();
        cli.handle_command("/set maxSteps 0").await;
        let (agent, _) = cli.session.settings_snapshot().await;
        assert_eq!(agent.max_steps, 100);
        assert!(cli.cmd_output_lines[0].starts_with("Error:"));
    }

    #[tokio::test]
    async fn stop_without_task_shows_notice() {
        let mut cli = interface();
        cli.handle_command("/stop").await;
        cli.drain_session_events().await;
        assert!(cli.cmd_output_lines.iter().any(|l| l == "No task is running."));
    }

    #[tokio::test]
    async fn quit_sets_flag() {
        let mut cli = interface();
        cli.handle_command("/exit").await;
        assert!(cli.should_quit);
    }

    #[tokio::test]
    async fn export_then_import_restores_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel bundle.json");
        let mut cli = interface();

        cli.handle_command("/set maxSteps 42").await;
        cli.handle_command(&format!("/export {}", path.display())).await;
        cli.handle_command("/set maxSteps 7").await;
        cli.handle_command(&format!("/import {}", path.display())).await;

        let (agent, _) = cli.session.settings_snapshot().await;
        assert_eq!(agent.max_steps, 42);
        assert!(cli.cmd_output_lines[0].starts_with("Settings loaded"));
    }
}
