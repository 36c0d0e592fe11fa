use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::{AgentInfo, ExecutorGateway, PollingHandle, StartAck, StartRequest, TaskStatusReport};

#[derive(Deserialize)]
struct AgentList {
    #[serde(default)]
    agents: Vec<AgentInfo>,
}

/// Executor gateway speaking the JSON HTTP protocol of the bridge server.
pub struct HttpGateway {
    client: Client,
    base: Url,
    cancel_enabled: bool,
}

impl HttpGateway {
    pub fn new(base_url: &str, cancel_enabled: bool) -> Result<Self> {
        let mut base =
            Url::parse(base_url).with_context(|| format!("invalid executor URL '{}'", base_url))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base,
            cancel_enabled,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("cannot build endpoint '{}'", path))
    }

    pub async fn health(&self) -> Result<serde_json::Value> {
        let res = self.client.get(self.endpoint("health")?).send().await?;
        if !res.status().is_success() {
            return Err(anyhow!("health check returned {}", res.status()));
        }
        Ok(res.json().await?)
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentInfo>> {
        let res = self.client.get(self.endpoint("api/agents")?).send().await?;
        if !res.status().is_success() {
            return Err(anyhow!("agent listing returned {}", res.status()));
        }
        let parsed: AgentList = res.json().await?;
        Ok(parsed.agents)
    }
}

#[async_trait]
impl ExecutorGateway for HttpGateway {
    async fn submit(&self, request: &StartRequest) -> Result<StartAck> {
        info!("Submitting task to {}", self.base);
        let res = self
            .client
            .post(self.endpoint("api/agents/start")?)
            .json(request)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP error! status: {} {}", status.as_u16(), body.trim()));
        }
        Ok(res.json().await?)
    }

    async fn task_status(&self, handle: &PollingHandle) -> Result<TaskStatusReport> {
        let path = format!(
            "api/task/{}/status",
            urlencoding::encode(&handle.task_id)
        );
        let res = self.client.get(self.endpoint(&path)?).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(anyhow!("status endpoint returned {}", status));
        }
        let report: TaskStatusReport = res.json().await?;
        debug!("Task {} reported '{}'", handle.task_id, report.status);
        Ok(report)
    }

    async fn cancel(&self, task_id: &str) -> Result<()> {
        if !self.cancel_enabled {
            return Ok(());
        }
        let path = format!("api/agents/{}/stop", urlencoding::encode(task_id));
        let res = self.client.post(self.endpoint(&path)?).send().await?;
        if !res.status().is_success() {
            return Err(anyhow!("stop endpoint returned {}", res.status()));
        }
        Ok(())
    }

    fn supports_cancel(&self) -> bool {
        self.cancel_enabled
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;
    use crate::core::settings::{AgentSettings, BrowserSettings, Secret};

    #[derive(Clone, Default)]
    struct Seen {
        bodies: Arc<Mutex<Vec<Value>>>,
        paths: Arc<Mutex<Vec<String>>>,
    }

    async fn start(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
        seen.bodies.lock().unwrap().push(body);
        Json(json!({
            "status": "started",
            "task_id": "task_1",
            "execution_status": "processing",
            "progress": "Task queued for execution"
        }))
    }

    async fn status(State(seen): State<Seen>, Path(id): Path<String>) -> Json<Value> {
        seen.paths.lock().unwrap().push(id.clone());
        Json(json!({"task_id": id, "status": "running", "progress": "Opening page"}))
    }

    async fn stop(State(seen): State<Seen>, Path(id): Path<String>) -> Json<Value> {
        seen.paths.lock().unwrap().push(format!("stop:{}", id));
        Json(json!({"status": "stopped"}))
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{}", addr)
    }

    async fn mock(seen: Seen) -> String {
        serve(
            Router::new()
                .route("/api/agents/start", post(start))
                .route("/api/task/{id}/status", get(status))
                .route("/api/agents/{id}/stop", post(stop))
                .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
                .route(
                    "/api/agents",
                    get(|| async {
                        Json(json!({"agents": [{"id": "browser_use", "name": "Browser Use Agent"}]}))
                    }),
                )
                .with_state(seen),
        )
        .await
    }

    fn request() -> StartRequest {
        let agent_settings = AgentSettings {
            llm_api_key: Some(Secret::new("sk-test")),
            ..AgentSettings::default()
        };
        StartRequest {
            instruction: "find flights".into(),
            agent_settings,
            browser_settings: BrowserSettings::default(),
            agent_type: "browser_use".into(),
        }
    }

    #[tokio::test]
    async fn submit_sends_full_settings() {
        let seen = Seen::default();
        let base = mock(seen.clone()).await;
        let gateway = HttpGateway::new(&base, false).unwrap();

        let ack = gateway.submit(&request()).await.unwrap();
        assert_eq!(ack.task_id.as_deref(), Some("task_1"));

        let body = seen.bodies.lock().unwrap()[0].clone();
        assert_eq!(body["instruction"], "find flights");
        assert_eq!(body["agent_type"], "browser_use");
        assert_eq!(body["agent_settings"]["llmApiKey"], "sk-test");
        assert_eq!(body["browser_settings"]["windowWidth"], 1280);
    }

    #[tokio::test]
    async fn status_path_is_percent_encoded() {
        let seen = Seen::default();
        let base = mock(seen.clone()).await;
        let gateway = HttpGateway::new(&base, false).unwrap();
        let handle = PollingHandle {
            task_id: "a b/c".into(),
            polling_url: None,
        };

        let report = gateway.task_status(&handle).await.unwrap();
        assert_eq!(report.status, "running");
        assert_eq!(seen.paths.lock().unwrap()[0], "a b/c");
    }

    #[tokio::test]
    async fn cancel_only_calls_out_when_enabled() {
        let seen = Seen::default();
        let base = mock(seen.clone()).await;

        HttpGateway::new(&base, false).unwrap().cancel("t1").await.unwrap();
        assert!(seen.paths.lock().unwrap().is_empty());

        let gateway = HttpGateway::new(&base, true).unwrap();
        assert!(gateway.supports_cancel());
        gateway.cancel("t1").await.unwrap();
        assert_eq!(seen.paths.lock().unwrap()[0], "stop:t1");
    }

    #[tokio::test]
    async fn non_success_submit_is_an_error() {
        let base = serve(Router::new().route(
            "/api/agents/start",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
        ))
        .await;
        let gateway = HttpGateway::new(&base, false).unwrap();
        let err = gateway.submit(&request()).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn health_and_agents_are_read() {
        let base = mock(Seen::default()).await;
        let gateway = HttpGateway::new(&base, false).unwrap();
        assert_eq!(gateway.health().await.unwrap()["status"], "ok");
        let agents = gateway.list_agents().await.unwrap();
        assert_eq!(agents[0].id, "browser_use");
    }
}
