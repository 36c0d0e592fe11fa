use std::io::Write;

use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

pub const LOG_LEVEL_ENV: &str = "VOXA_LOG";

/// Fans formatted log lines out to a broadcast channel so interactive views can
/// show them, and to stderr unless suppressed.
#[derive(Clone)]
pub(crate) struct LogMakeWriter {
    pub sender: broadcast::Sender<String>,
    pub suppress_stderr: bool,
}

impl<'a> MakeWriter<'a> for LogMakeWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            sender: self.sender.clone(),
            suppress_stderr: self.suppress_stderr,
        }
    }
}

pub(crate) struct LogWriter {
    sender: broadcast::Sender<String>,
    suppress_stderr: bool,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let msg = String::from_utf8_lossy(buf).to_string();
        let _ = self.sender.send(msg); // Ignored if no receivers
        if !self.suppress_stderr {
            std::io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.suppress_stderr {
            std::io::stderr().flush()?;
        }
        Ok(())
    }
}

fn level_from(value: Option<&str>) -> Level {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("trace") => Level::TRACE,
        Some("debug") => Level::DEBUG,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global subscriber. Returns the sender the log lines are
/// broadcast on.
pub(crate) fn init(suppress_stderr: bool) -> broadcast::Sender<String> {
    let (log_tx, _) = broadcast::channel::<String>(500);
    let make_writer = LogMakeWriter {
        sender: log_tx.clone(),
        suppress_stderr,
    };
    let level = level_from(std::env::var(LOG_LEVEL_ENV).ok().as_deref());

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_ansi(!suppress_stderr)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok(); // Already installed is fine
    log_tx
}
