use tokio::sync::broadcast::error::TryRecvError;

use super::{CliInterface, MAX_LOG_LINES};
use crate::core::session::{SessionEvent, StartOutcome};

impl CliInterface {
    /// Pull everything the session published since the last frame.
    pub(super) async fn drain_session_events(&mut self) {
        let mut refresh = false;
        loop {
            match self.events.try_recv() {
                Ok(SessionEvent::TranscriptChanged) => refresh = true,
                Ok(SessionEvent::StateChanged(state)) => self.task_state = state,
                Ok(SessionEvent::Notice(text)) => self.push_cmd_output(text),
                Ok(SessionEvent::BrowserTeardown(changed)) => {
                    self.push_cmd_output(format!(
                        "Browser settings changed ({}). The browser session restarts with the next task.",
                        changed.join(", ")
                    ));
                }
                Err(TryRecvError::Lagged(_)) => {
                    refresh = true;
                    self.task_state = self.session.state().await;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if refresh {
            self.entries = self.session.transcript().await;
            self.scroll_to_bottom();
        }

        while let Ok(outcome) = self.outcome_rx.try_recv() {
            match outcome {
                StartOutcome::ManualRequired { .. } => {
                    self.push_cmd_output("Manual execution required. Use /open for the web UI.".to_string());
                }
                StartOutcome::Failed { reason } => {
                    self.push_cmd_output(format!("Submission failed: {}", reason));
                }
                StartOutcome::Processing { .. }
                | StartOutcome::Rejected(_)
                | StartOutcome::Superseded => {}
            }
        }
    }

    pub(super) fn drain_logs(&mut self) {
        loop {
            match self.log_rx.try_recv() {
                Ok(line) => {
                    self.log_lines.push(line.trim_end().to_string());
                    if self.log_lines.len() > MAX_LOG_LINES {
                        let excess = self.log_lines.len() - MAX_LOG_LINES;
                        self.log_lines.drain(..excess);
                    }
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}
