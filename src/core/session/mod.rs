//! One operator session: settings, transcript and the task controller behind a
//! single lock, plus the background work that drives a task to completion.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, info, warn};

use crate::core::gateway::{Acknowledgment, ExecutorGateway, PollingHandle, StartRequest};
use crate::core::settings::{
    AgentSettings, BrowserSettings, BrowserUpdate, BundleError, ConfigBundle, SettingsError,
    SettingsStore,
};
use crate::core::task::poller::{coalesce_progress, meaningful_progress};
use crate::core::task::{
    Generation, PollSink, PollTiming, StartRejection, StatusPoller, Task, TaskController,
    TaskState, TerminalOutcome,
};
use crate::core::transcript::{Transcript, TranscriptEntry};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(TaskState),
    TranscriptChanged,
    /// Operator-facing message that is not part of the transcript.
    Notice(String),
    BrowserTeardown(Vec<&'static str>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Rejected(StartRejection),
    Processing { task_id: String },
    ManualRequired { task_id: String },
    Failed { reason: String },
    /// The session was stopped while the submission was in flight.
    Superseded,
}

struct SessionState {
    settings: SettingsStore,
    transcript: Transcript,
    controller: TaskController,
    backend_link: Option<String>,
}

struct Shared {
    state: Mutex<SessionState>,
    gateway: Arc<dyn ExecutorGateway>,
    timing: PollTiming,
    agent_type: String,
    events: broadcast::Sender<SessionEvent>,
    task_state: watch::Sender<TaskState>,
}

#[derive(Clone)]
pub struct AgentSession {
    shared: Arc<Shared>,
}

impl AgentSession {
    pub fn new(
        gateway: Arc<dyn ExecutorGateway>,
        settings: SettingsStore,
        timing: PollTiming,
        agent_type: impl Into<String>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let (task_state, _) = watch::channel(TaskState::Idle);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState {
                    settings,
                    transcript: Transcript::new(),
                    controller: TaskController::new(),
                    backend_link: None,
                }),
                gateway,
                timing,
                agent_type: agent_type.into(),
                events,
                task_state,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<TaskState> {
        self.shared.task_state.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine.
        let _ = self.shared.events.send(event);
    }

    fn notice(&self, message: impl Into<String>) {
        self.emit(SessionEvent::Notice(message.into()));
    }

    fn publish_state(&self, state: TaskState) {
        self.shared.task_state.send_replace(state);
        self.emit(SessionEvent::StateChanged(state));
    }

    pub async fn state(&self) -> TaskState {
        self.shared.state.lock().await.controller.state()
    }

    pub async fn current_task(&self) -> Option<Task> {
        self.shared.state.lock().await.controller.task().cloned()
    }

    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.shared.state.lock().await.transcript.entries().to_vec()
    }

    pub async fn screenshots(&self) -> Vec<String> {
        self.shared.state.lock().await.transcript.screenshots().to_vec()
    }

    /// Web UI link from the most recent manual handoff.
    pub async fn backend_link(&self) -> Option<String> {
        self.shared.state.lock().await.backend_link.clone()
    }

    /// Resolves once no task occupies the session.
    #[cfg(test)]
    pub async fn wait_until_settled(&self) -> TaskState {
        let mut rx = self.watch_state();
        match rx.wait_for(|s| !s.is_active()).await {
            Ok(state) => *state,
            Err(_) => self.state().await,
        }
    }

    pub async fn start(&self, instruction: &str) -> StartOutcome {
        let (generation, request) = {
            let mut st = self.shared.state.lock().await;
            let generation = match st.controller.begin(instruction) {
                Ok(generation) => generation,
                Err(rejection) => {
                    drop(st);
                    info!("Start rejected: {}", rejection);
                    self.notice(rejection.to_string());
                    return StartOutcome::Rejected(rejection);
                }
            };
            let instruction = instruction.trim().to_string();
            st.transcript.append(TranscriptEntry::user(instruction.clone()));
            let (agent_settings, browser_settings) = st.settings.snapshot();
            self.publish_state(st.controller.state());
            (
                generation,
                StartRequest {
                    instruction,
                    agent_settings,
                    browser_settings,
                    agent_type: self.shared.agent_type.clone(),
                },
            )
        };
        self.emit(SessionEvent::TranscriptChanged);

        let submitted = self
            .shared
            .gateway
            .submit(&request)
            .await
            .and_then(|ack| ack.interpret());

        let mut st = self.shared.state.lock().await;
        match submitted {
            Err(e) => {
                if !st.controller.fail_submission(generation) {
                    return StartOutcome::Superseded;
                }
                warn!("Task submission failed: {:#}", e);
                let reason = e.to_string();
                st.transcript.append(TranscriptEntry::assistant(format!(
                    "Sorry, I encountered an error: {}. Please make sure the backend servers are running.",
                    reason
                )));
                self.publish_state(st.controller.state());
                self.emit(SessionEvent::TranscriptChanged);
                StartOutcome::Failed { reason }
            }
            Ok(Acknowledgment::Processing {
                task_id,
                handle,
                progress,
            }) => {
                if !st.controller.accept(generation, &task_id, Some(handle.clone())) {
                    return StartOutcome::Superseded;
                }
                st.transcript.append(TranscriptEntry::progress(format!(
                    "Agent started successfully! Task ID: {}. I'm now processing your request: \"{}\"",
                    task_id, request.instruction
                )));
                if let Some(progress) = meaningful_progress(progress.as_deref()) {
                    coalesce_progress(&mut st.transcript, progress);
                }
                self.publish_state(st.controller.state());
                drop(st);
                self.emit(SessionEvent::TranscriptChanged);
                self.spawn_poller(generation, handle);
                StartOutcome::Processing { task_id }
            }
            Ok(Acknowledgment::ManualRequired {
                task_id,
                note,
                steps,
                webui_url,
            }) => {
                if !st.controller.accept(generation, &task_id, None) {
                    return StartOutcome::Superseded;
                }
                st.transcript.append(TranscriptEntry::assistant(manual_message(
                    &task_id,
                    note.as_deref(),
                    &steps,
                    webui_url.as_deref(),
                )));
                st.backend_link = webui_url;
                self.publish_state(st.controller.state());
                drop(st);
                self.emit(SessionEvent::TranscriptChanged);
                self.spawn_handoff(generation);
                StartOutcome::ManualRequired { task_id }
            }
        }
    }

    fn spawn_poller(&self, generation: Generation, handle: PollingHandle) {
        let session = self.clone();
        tokio::spawn(async move {
            let poller = StatusPoller::new(session.shared.gateway.clone(), session.shared.timing);
            let outcome = poller.run(generation, handle, &session).await;
            debug!(
                "Poller for generation {} finished: {:?}",
                generation.value(),
                outcome
            );
        });
    }

    fn spawn_handoff(&self, generation: Generation) {
        let session = self.clone();
        let delay = self.shared.timing.manual_handoff_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut st = session.shared.state.lock().await;
            if st.controller.release(generation) {
                session.publish_state(st.controller.state());
            }
        });
    }

    /// Returns false when nothing was running.
    pub async fn stop(&self) -> bool {
        let (was, task) = {
            let mut st = self.shared.state.lock().await;
            let was = st.controller.state();
            let Some(task) = st.controller.stop() else {
                drop(st);
                self.notice("No task is running.");
                return false;
            };
            self.publish_state(st.controller.state());
            (was, task)
        };
        info!("Stopped task {} ({})", task.id, was.as_str());
        self.notice("Task stopped.");

        // Before acceptance the executor has no id for this task.
        if was != TaskState::Starting && self.shared.gateway.supports_cancel() {
            let gateway = self.shared.gateway.clone();
            tokio::spawn(async move {
                match gateway.cancel(&task.id).await {
                    Ok(()) => info!("Executor acknowledged stop for {}", task.id),
                    Err(e) => warn!("Executor stop for {} failed: {}", task.id, e),
                }
            });
        }
        true
    }

    pub async fn toggle_pause(&self) -> Option<TaskState> {
        let mut st = self.shared.state.lock().await;
        let next = st.controller.toggle_pause();
        match next {
            Some(state) => self.publish_state(state),
            None => {
                drop(st);
                self.notice("Nothing to pause.");
            }
        }
        next
    }

    pub async fn clear(&self) {
        self.shared.state.lock().await.transcript.clear();
        self.emit(SessionEvent::TranscriptChanged);
    }

    pub async fn settings_snapshot(&self) -> (AgentSettings, BrowserSettings) {
        self.shared.state.lock().await.settings.snapshot()
    }

    pub async fn set_field(&self, key: &str, value: &str) -> Result<BrowserUpdate, SettingsError> {
        let (update, changed) = {
            let mut st = self.shared.state.lock().await;
            let before = st.settings.browser().clone();
            let update = st.settings.set_field(key, value)?;
            (update, before.changed_session_flags(st.settings.browser()))
        };
        self.report_teardown(update, changed);
        Ok(update)
    }

    pub async fn export_bundle(&self) -> ConfigBundle {
        ConfigBundle::capture(&self.shared.state.lock().await.settings)
    }

    /// Parse, validate and apply a bundle. Nothing changes on error.
    pub async fn import_bundle(&self, text: &str) -> Result<BrowserUpdate, BundleError> {
        let bundle = ConfigBundle::parse(text)?;
        let (update, changed) = {
            let mut st = self.shared.state.lock().await;
            let before = st.settings.browser().clone();
            let update = bundle.apply(&mut st.settings)?;
            (update, before.changed_session_flags(st.settings.browser()))
        };
        self.report_teardown(update, changed);
        Ok(update)
    }

    fn report_teardown(&self, update: BrowserUpdate, changed: Vec<&'static str>) {
        if update.teardown_requested {
            self.emit(SessionEvent::BrowserTeardown(changed));
        }
    }
}

#[async_trait]
impl PollSink for AgentSession {
    async fn is_current(&self, generation: Generation) -> bool {
        self.shared
            .state
            .lock()
            .await
            .controller
            .is_current(generation)
    }

    async fn progress(&self, generation: Generation, progress: &str) -> bool {
        {
            let mut st = self.shared.state.lock().await;
            if !st.controller.is_current(generation) {
                return false;
            }
            coalesce_progress(&mut st.transcript, progress);
        }
        self.emit(SessionEvent::TranscriptChanged);
        true
    }

    async fn finish(
        &self,
        generation: Generation,
        entry: TranscriptEntry,
        outcome: TerminalOutcome,
    ) -> bool {
        {
            let mut st = self.shared.state.lock().await;
            if !st.controller.is_current(generation) {
                return false;
            }
            st.transcript.append(entry);
            if !st.controller.finish(generation, outcome) {
                return false;
            }
            self.publish_state(st.controller.state());
        }
        self.emit(SessionEvent::TranscriptChanged);
        true
    }
}

fn manual_message(
    task_id: &str,
    note: Option<&str>,
    steps: &[String],
    webui_url: Option<&str>,
) -> String {
    let mut message = format!(
        "Agent started successfully! Task ID: {}.\n\n⚠️ Manual execution required:\n{}",
        task_id,
        note.unwrap_or("The executor could not run this task automatically.")
    );
    if !steps.is_empty() {
        message.push_str("\n\nSteps to execute:\n");
        message.push_str(&steps.join("\n"));
    }
    if let Some(url) = webui_url {
        message.push_str(&format!("\n\n🔗 Open web-ui: {}", url));
    }
    message
}

#[cfg(test)]
mod tests;
