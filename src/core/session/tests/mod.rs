use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Notify;

use super::AgentSession;
use crate::core::gateway::{ExecutorGateway, PollingHandle, StartAck, StartRequest, TaskResult, TaskStatusReport};
use crate::core::settings::SettingsStore;
use crate::core::task::PollTiming;

mod lifecycle;

pub(super) enum AckScript {
    Processing,
    Manual,
    Error(&'static str),
}

pub(super) enum StatusStep {
    Report(TaskStatusReport),
    /// Raw executor body, decoded the way the HTTP gateway decodes it.
    Body(&'static str),
    TransportError,
    Hang,
    Gated(Arc<Notify>, TaskStatusReport),
}

pub(super) fn running(progress: Option<&str>) -> TaskStatusReport {
    TaskStatusReport {
        status: "running".into(),
        progress: progress.map(str::to_string),
        ..Default::default()
    }
}

pub(super) fn completed(message: &str) -> TaskStatusReport {
    TaskStatusReport {
        status: "completed".into(),
        result: Some(TaskResult {
            message: Some(message.into()),
            screenshots: vec!["final.png".into()],
        }),
        ..Default::default()
    }
}

pub(super) fn errored(detail: &str) -> TaskStatusReport {
    TaskStatusReport {
        status: "error".into(),
        error: Some(detail.into()),
        ..Default::default()
    }
}

/// In-memory executor driven by a fixed script.
pub(super) struct ScriptedGateway {
    ack: AckScript,
    steps: Mutex<VecDeque<StatusStep>>,
    pub submit_gate: Option<Arc<Notify>>,
    pub submit_entered: Notify,
    pub status_entered: Notify,
    pub submits: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub cancels: Mutex<Vec<String>>,
    pub requests: Mutex<Vec<StartRequest>>,
    cancel_enabled: bool,
}

impl ScriptedGateway {
    pub fn new(ack: AckScript, steps: Vec<StatusStep>) -> Self {
        Self {
            ack,
            steps: Mutex::new(steps.into()),
            submit_gate: None,
            submit_entered: Notify::new(),
            status_entered: Notify::new(),
            submits: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            cancels: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            cancel_enabled: false,
        }
    }

    pub fn gated_submit(mut self, gate: Arc<Notify>) -> Self {
        self.submit_gate = Some(gate);
        self
    }

    pub fn with_cancel(mut self) -> Self {
        self.cancel_enabled = true;
        self
    }

    pub fn status_count(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutorGateway for ScriptedGateway {
    async fn submit(&self, request: &StartRequest) -> Result<StartAck> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.submit_entered.notify_one();
        if let Some(gate) = &self.submit_gate {
            gate.notified().await;
        }
        match self.ack {
            AckScript::Processing => Ok(StartAck {
                status: "started".into(),
                task_id: Some("exec-1".into()),
                execution_status: Some("processing".into()),
                progress: Some("Task queued for execution".into()),
                ..Default::default()
            }),
            AckScript::Manual => Ok(StartAck {
                status: "started".into(),
                task_id: Some("exec-m".into()),
                execution_status: Some("manual_required".into()),
                note: Some("Please run it in the web-ui".into()),
                manual_steps: vec!["1. Open the web-ui".into(), "2. Click Start".into()],
                webui_url: Some("http://localhost:7788".into()),
                ..Default::default()
            }),
            AckScript::Error(msg) => Err(anyhow!(msg)),
        }
    }

    async fn task_status(&self, _handle: &PollingHandle) -> Result<TaskStatusReport> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            None => Ok(running(None)),
            Some(StatusStep::Report(report)) => Ok(report),
            Some(StatusStep::Body(body)) => Ok(serde_json::from_str(body)?),
            Some(StatusStep::TransportError) => Err(anyhow!("connection refused")),
            Some(StatusStep::Hang) => std::future::pending().await,
            Some(StatusStep::Gated(gate, report)) => {
                self.status_entered.notify_one();
                gate.notified().await;
                Ok(report)
            }
        }
    }

    async fn cancel(&self, task_id: &str) -> Result<()> {
        self.cancels.lock().unwrap().push(task_id.to_string());
        Ok(())
    }

    fn supports_cancel(&self) -> bool {
        self.cancel_enabled
    }
}

pub(super) fn session(gateway: &Arc<ScriptedGateway>) -> AgentSession {
    session_with_timing(gateway, PollTiming::default())
}

pub(super) fn session_with_timing(gateway: &Arc<ScriptedGateway>, timing: PollTiming) -> AgentSession {
    AgentSession::new(
        gateway.clone(),
        SettingsStore::default(),
        timing,
        "browser_use",
    )
}
