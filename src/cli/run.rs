use anyhow::{Result, bail};
use console::style;
use tokio::sync::broadcast::error::RecvError;

use crate::core::session::{AgentSession, SessionEvent, StartOutcome};
use crate::core::task::TaskState;
use crate::core::terminal::{print_info, print_link, print_warn};
use crate::core::transcript::{Role, TranscriptEntry};

/// Prints only what is new since the previous call, including text appended to
/// a coalesced progress entry.
#[derive(Default)]
struct TranscriptPrinter {
    printed: usize,
    last_len: usize,
}

impl TranscriptPrinter {
    fn render(&mut self, entries: &[TranscriptEntry]) -> Vec<String> {
        let mut out = Vec::new();
        if entries.len() < self.printed {
            self.printed = 0;
            self.last_len = 0;
        }
        if self.printed > 0 {
            let last = &entries[self.printed - 1];
            if let Some(extra) = last.content.get(self.last_len..)
                && !extra.trim().is_empty()
            {
                out.push(extra.trim_start().to_string());
            }
            self.last_len = last.content.len();
        }
        for entry in &entries[self.printed..] {
            out.push(format_entry(entry));
        }
        if let Some(last) = entries.last()
            && entries.len() > self.printed
        {
            self.printed = entries.len();
            self.last_len = last.content.len();
        }
        out
    }

    fn flush(&mut self, entries: &[TranscriptEntry]) {
        for block in self.render(entries) {
            println!("{}\n", block);
        }
    }
}

fn format_entry(entry: &TranscriptEntry) -> String {
    let mut text = match entry.role {
        Role::User => format!("{} {}", style(">").bold().green(), entry.content),
        Role::Assistant => entry.content.clone(),
    };
    for shot in &entry.screenshots {
        text.push_str(&format!("\n  screenshot: {}", style(shot).cyan()));
    }
    text
}

pub async fn run_headless(session: AgentSession, instruction: &str) -> Result<()> {
    let mut events = session.subscribe();
    let mut printer = TranscriptPrinter::default();

    let outcome = tokio::select! {
        outcome = session.start(instruction) => outcome,
        _ = tokio::signal::ctrl_c() => {
            session.stop().await;
            return Ok(());
        }
    };
    printer.flush(&session.transcript().await);

    match outcome {
        StartOutcome::Rejected(rejection) => bail!("{}", rejection),
        StartOutcome::Failed { reason } => bail!("task submission failed: {}", reason),
        StartOutcome::Superseded => return Ok(()),
        StartOutcome::ManualRequired { .. } => {
            if let Some(link) = session.backend_link().await {
                print_link("Web UI", &link);
            }
        }
        StartOutcome::Processing { .. } => {}
    }

    let mut state = session.watch_state();
    loop {
        if !state.borrow_and_update().is_active() {
            break;
        }
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::TranscriptChanged) => printer.flush(&session.transcript().await),
                Ok(SessionEvent::Notice(text)) => print_info(&text),
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => printer.flush(&session.transcript().await),
                Err(RecvError::Closed) => break,
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                print_warn("Interrupted, stopping task.");
                session.stop().await;
            }
        }
    }
    printer.flush(&session.transcript().await);

    match session.state().await {
        TaskState::Failed => bail!("task failed"),
        _ => Ok(()),
    }
}
