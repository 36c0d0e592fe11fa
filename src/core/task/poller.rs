//! Bounded status polling for tasks the executor is processing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{Generation, TerminalOutcome};
use crate::core::gateway::{ExecutorGateway, PollingHandle, TaskStatusReport};
use crate::core::transcript::{Transcript, TranscriptEntry};

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MANUAL_HANDOFF_DELAY: Duration = Duration::from_secs(2);

/// Placeholder progress the executor reports before any real work happens.
const QUEUED_PLACEHOLDER: &str = "Task queued for execution";

pub const TIMEOUT_MESSAGE: &str =
    "⏰ Task is taking longer than expected. Please check the web-ui backend for status.";
pub const UNREACHABLE_MESSAGE: &str =
    "❌ Unable to get task status. Please check the web-ui backend manually.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub max_attempts: u32,
    pub request_timeout: Duration,
    pub manual_handoff_delay: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            interval: DEFAULT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            manual_handoff_delay: DEFAULT_MANUAL_HANDOFF_DELAY,
        }
    }
}

impl PollTiming {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            bail!("poll max_attempts must be at least 1");
        }
        if self.request_timeout.is_zero() {
            bail!("poll request_timeout must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    InProgress,
    Completed,
    Error,
}

pub fn classify(status: &str) -> StatusClass {
    match status {
        "completed" => StatusClass::Completed,
        "error" => StatusClass::Error,
        "running" | "initializing" | "configuring" | "starting_browser" => StatusClass::InProgress,
        other => {
            warn!("Unrecognised task status '{}', treating as in progress", other);
            StatusClass::InProgress
        }
    }
}

/// Progress text worth showing, if any.
pub(crate) fn meaningful_progress(progress: Option<&str>) -> Option<&str> {
    let progress = progress?.trim();
    if progress.is_empty() || progress == QUEUED_PLACEHOLDER {
        None
    } else {
        Some(progress)
    }
}

pub fn success_entry(report: &TaskStatusReport) -> TranscriptEntry {
    let result = report.result.clone().unwrap_or_default();
    let message = result
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "Browser automation completed".to_string());
    TranscriptEntry::terminal(format!(
        "✅ Task completed successfully!\n\nResult: {}",
        message
    ))
    .with_screenshots(result.screenshots)
}

pub fn failure_entry(report: &TaskStatusReport) -> TranscriptEntry {
    let detail = report
        .error
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or("Unknown error occurred");
    TranscriptEntry::terminal(format!("❌ Task failed: {}", detail))
}

/// Fold a progress line into the transcript. Extends the trailing progress
/// narration when there is one, otherwise starts a new one.
pub fn coalesce_progress(transcript: &mut Transcript, progress: &str) {
    let line = format!("📊 Status: {}", progress);
    if let Some(last) = transcript.last()
        && last.is_progress_narration()
    {
        if last.content.ends_with(&line) {
            return;
        }
        let merged = TranscriptEntry {
            content: format!("{}\n\n{}", last.content, line),
            ..last.clone()
        };
        if let Err(e) = transcript.replace_last(merged) {
            warn!("Could not coalesce progress: {}", e);
        }
        return;
    }
    transcript.append(TranscriptEntry::progress(line));
}

/// Transient per-task polling record.
#[derive(Debug, Clone)]
pub struct PollAttempt {
    pub attempt: u32,
    pub task_id: String,
    pub handle: PollingHandle,
}

/// Where the poller reports. Every call carries the generation the poller was
/// started for; implementations drop stale calls and return false.
#[async_trait]
pub trait PollSink: Send + Sync {
    async fn is_current(&self, generation: Generation) -> bool;

    async fn progress(&self, generation: Generation, progress: &str) -> bool;

    async fn finish(
        &self,
        generation: Generation,
        entry: TranscriptEntry,
        outcome: TerminalOutcome,
    ) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    Failed,
    Stale,
}

enum LastAttempt {
    Unreachable,
    StillRunning,
}

pub struct StatusPoller {
    gateway: Arc<dyn ExecutorGateway>,
    timing: PollTiming,
}

impl StatusPoller {
    pub fn new(gateway: Arc<dyn ExecutorGateway>, timing: PollTiming) -> Self {
        Self { gateway, timing }
    }

    /// Poll until the task finishes, the attempt budget runs out or the
    /// generation goes stale. Never fails; the outcome lands in the sink.
    pub async fn run(
        &self,
        generation: Generation,
        handle: PollingHandle,
        sink: &dyn PollSink,
    ) -> PollOutcome {
        let mut attempt = PollAttempt {
            attempt: 0,
            task_id: handle.task_id.clone(),
            handle,
        };

        tokio::time::sleep(self.timing.initial_delay).await;
        if !sink.is_current(generation).await {
            return PollOutcome::Stale;
        }

        loop {
            attempt.attempt += 1;
            debug!(
                "Polling task status (attempt {}/{}): {}",
                attempt.attempt, self.timing.max_attempts, attempt.task_id
            );

            let fetched = tokio::time::timeout(
                self.timing.request_timeout,
                self.gateway.task_status(&attempt.handle),
            )
            .await;

            if !sink.is_current(generation).await {
                debug!("Discarding status for stale task {}", attempt.task_id);
                return PollOutcome::Stale;
            }

            let last = match fetched {
                Ok(Ok(report)) => match classify(&report.status) {
                    StatusClass::Completed => {
                        info!("Task {} completed", attempt.task_id);
                        return self
                            .conclude(
                                sink,
                                generation,
                                success_entry(&report),
                                TerminalOutcome::Completed,
                            )
                            .await;
                    }
                    StatusClass::Error => {
                        warn!(
                            "Task {} failed: {}",
                            attempt.task_id,
                            report.error.as_deref().unwrap_or("no detail")
                        );
                        return self
                            .conclude(
                                sink,
                                generation,
                                failure_entry(&report),
                                TerminalOutcome::Failed,
                            )
                            .await;
                    }
                    StatusClass::InProgress => {
                        if let Some(progress) = meaningful_progress(report.progress.as_deref())
                            && !sink.progress(generation, progress).await
                        {
                            return PollOutcome::Stale;
                        }
                        LastAttempt::StillRunning
                    }
                },
                Ok(Err(e)) => {
                    warn!(
                        "Status fetch for {} failed (attempt {}): {}",
                        attempt.task_id, attempt.attempt, e
                    );
                    LastAttempt::Unreachable
                }
                Err(_) => {
                    warn!(
                        "Status fetch for {} timed out after {:?} (attempt {})",
                        attempt.task_id, self.timing.request_timeout, attempt.attempt
                    );
                    LastAttempt::Unreachable
                }
            };

            if attempt.attempt >= self.timing.max_attempts {
                let message = match last {
                    LastAttempt::Unreachable => UNREACHABLE_MESSAGE,
                    LastAttempt::StillRunning => TIMEOUT_MESSAGE,
                };
                warn!(
                    "Giving up on task {} after {} attempts",
                    attempt.task_id, attempt.attempt
                );
                return self
                    .conclude(
                        sink,
                        generation,
                        TranscriptEntry::terminal(message),
                        TerminalOutcome::Failed,
                    )
                    .await;
            }

            tokio::time::sleep(self.timing.interval).await;
            if !sink.is_current(generation).await {
                return PollOutcome::Stale;
            }
        }
    }

    async fn conclude(
        &self,
        sink: &dyn PollSink,
        generation: Generation,
        entry: TranscriptEntry,
        outcome: TerminalOutcome,
    ) -> PollOutcome {
        if !sink.finish(generation, entry, outcome).await {
            return PollOutcome::Stale;
        }
        match outcome {
            TerminalOutcome::Completed => PollOutcome::Completed,
            TerminalOutcome::Failed => PollOutcome::Failed,
        }
    }
}
