//! Boundary to the remote executor that runs browser-automation tasks.

pub mod http;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::settings::{AgentSettings, BrowserSettings};

pub use http::HttpGateway;

pub const DEFAULT_AGENT_TYPE: &str = "browser_use";

#[derive(Debug, Clone, Serialize)]
pub struct StartRequest {
    pub instruction: String,
    pub agent_settings: AgentSettings,
    pub browser_settings: BrowserSettings,
    pub agent_type: String,
}

/// Raw acknowledgment body returned by the start endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartAck {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub execution_status: Option<String>,
    #[serde(default, deserialize_with = "progress_text")]
    pub progress: Option<String>,
    #[serde(default)]
    pub polling_url: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub manual_steps: Vec<String>,
    #[serde(default)]
    pub webui_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Where and how to ask for a task's status. Fixed once a task is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingHandle {
    pub task_id: String,
    /// Executor-advertised URL, kept for display. Status is always fetched
    /// through the standard status endpoint.
    pub polling_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Acknowledgment {
    Processing {
        task_id: String,
        handle: PollingHandle,
        progress: Option<String>,
    },
    ManualRequired {
        task_id: String,
        note: Option<String>,
        steps: Vec<String>,
        webui_url: Option<String>,
    },
}

impl StartAck {
    pub fn interpret(self) -> Result<Acknowledgment> {
        if self.status != "started" {
            let detail = self
                .error
                .or(self.message)
                .unwrap_or_else(|| format!("unexpected status '{}'", self.status));
            return Err(anyhow!("{}", detail));
        }
        let task_id = self
            .task_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| anyhow!("executor accepted the task without a task id"))?;

        match self.execution_status.as_deref() {
            Some("processing") => Ok(Acknowledgment::Processing {
                handle: PollingHandle {
                    task_id: task_id.clone(),
                    polling_url: self.polling_url,
                },
                task_id,
                progress: self.progress,
            }),
            _ => Ok(Acknowledgment::ManualRequired {
                task_id,
                note: self.note.or(self.error),
                steps: self.manual_steps,
                webui_url: self.webui_url,
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub screenshots: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskStatusReport {
    pub status: String,
    #[serde(default, deserialize_with = "progress_text")]
    pub progress: Option<String>,
    #[serde(default)]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
}

/// Executors report progress as text or as a bare percentage.
fn progress_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => Some(text),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[async_trait]
pub trait ExecutorGateway: Send + Sync {
    async fn submit(&self, request: &StartRequest) -> Result<StartAck>;

    async fn task_status(&self, handle: &PollingHandle) -> Result<TaskStatusReport>;

    /// Best-effort remote cancellation. Gateways without one accept silently.
    async fn cancel(&self, _task_id: &str) -> Result<()> {
        Ok(())
    }

    fn supports_cancel(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(json: &str) -> StartAck {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn processing_ack_carries_handle() {
        let parsed = ack(
            r#"{"status":"started","task_id":"t-1","execution_status":"processing",
                "progress":"Task queued","polling_url":"http://x/api/task/t-1"}"#,
        )
        .interpret()
        .unwrap();
        assert_eq!(
            parsed,
            Acknowledgment::Processing {
                task_id: "t-1".into(),
                handle: PollingHandle {
                    task_id: "t-1".into(),
                    polling_url: Some("http://x/api/task/t-1".into()),
                },
                progress: Some("Task queued".into()),
            }
        );
    }

    #[test]
    fn processing_without_polling_url_still_polls() {
        let parsed = ack(r#"{"status":"started","task_id":"t-2","execution_status":"processing"}"#)
            .interpret()
            .unwrap();
        assert!(matches!(
            parsed,
            Acknowledgment::Processing { handle: PollingHandle { polling_url: None, .. }, .. }
        ));
    }

    #[test]
    fn manual_ack_keeps_steps() {
        let parsed = ack(
            r#"{"status":"started","task_id":"t-3","execution_status":"manual_required",
                "note":"do it yourself","manual_steps":["1. open","2. click"],
                "webui_url":"http://localhost:7788"}"#,
        )
        .interpret()
        .unwrap();
        match parsed {
            Acknowledgment::ManualRequired { steps, note, .. } => {
                assert_eq!(steps.len(), 2);
                assert_eq!(note.as_deref(), Some("do it yourself"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_execution_status_is_a_manual_handoff() {
        let parsed = ack(r#"{"status":"started","task_id":"t-4","error":"web-ui down"}"#)
            .interpret()
            .unwrap();
        assert!(matches!(
            parsed,
            Acknowledgment::ManualRequired { note: Some(n), .. } if n == "web-ui down"
        ));
    }

    #[test]
    fn progress_may_be_a_number() {
        let report: TaskStatusReport =
            serde_json::from_str(r#"{"status":"running","progress":50}"#).unwrap();
        assert_eq!(report.progress.as_deref(), Some("50"));
        let report: TaskStatusReport =
            serde_json::from_str(r#"{"status":"running","progress":{"step":2}}"#).unwrap();
        assert_eq!(report.progress, None);
        let report: TaskStatusReport =
            serde_json::from_str(r#"{"status":"running","progress":null}"#).unwrap();
        assert_eq!(report.progress, None);
    }

    #[test]
    fn non_started_or_idless_ack_is_rejected() {
        assert!(ack(r#"{"status":"error","error":"boom"}"#).interpret().is_err());
        assert!(ack(r#"{"status":"started"}"#).interpret().is_err());
        let err = ack(r#"{"status":"queued"}"#).interpret().unwrap_err();
        assert!(err.to_string().contains("queued"));
    }
}
