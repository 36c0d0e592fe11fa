use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::gateway::DEFAULT_AGENT_TYPE;
use crate::core::task::PollTiming;
use crate::core::task::poller::{
    DEFAULT_INITIAL_DELAY, DEFAULT_INTERVAL, DEFAULT_MANUAL_HANDOFF_DELAY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_REQUEST_TIMEOUT,
};

pub const CONFIG_FILE: &str = "voxa.toml";
pub const API_URL_ENV: &str = "VOXA_API_URL";

/// Client-side settings: where the executor lives and how patiently to poll.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_agent_type")]
    pub agent_type: String,

    /// Call the executor's stop endpoint when a task is stopped.
    #[serde(default)]
    pub cancel_on_stop: bool,

    #[serde(default)]
    pub poll: PollConfig,
}

/// Poll timing in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_manual_handoff_delay_ms")]
    pub manual_handoff_delay_ms: u64,
}

fn default_api_url() -> String {
    "http://localhost:8001".to_string()
}
fn default_agent_type() -> String {
    DEFAULT_AGENT_TYPE.to_string()
}
fn default_initial_delay_ms() -> u64 {
    DEFAULT_INITIAL_DELAY.as_millis() as u64
}
fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL.as_millis() as u64
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_millis() as u64
}
fn default_manual_handoff_delay_ms() -> u64 {
    DEFAULT_MANUAL_HANDOFF_DELAY.as_millis() as u64
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
            request_timeout_ms: default_request_timeout_ms(),
            manual_handoff_delay_ms: default_manual_handoff_delay_ms(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            agent_type: default_agent_type(),
            cancel_on_stop: false,
            poll: PollConfig::default(),
        }
    }
}

impl ClientConfig {
    pub async fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let config_path = data_dir.as_ref().join(CONFIG_FILE);
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path).await?;
            toml::from_str::<ClientConfig>(&content)
                .with_context(|| format!("invalid {}", config_path.display()))?
        } else {
            info!("No {} found, using defaults.", CONFIG_FILE);
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.timing()?;

        info!(
            "Loaded client config: api_url={}, agent_type={}, cancel_on_stop={}, max_attempts={}",
            config.api_url, config.agent_type, config.cancel_on_stop, config.poll.max_attempts
        );
        Ok(config)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.api_url = url.trim().to_string();
        }
    }

    pub fn timing(&self) -> Result<PollTiming> {
        let timing = PollTiming {
            initial_delay: Duration::from_millis(self.poll.initial_delay_ms),
            interval: Duration::from_millis(self.poll.interval_ms),
            max_attempts: self.poll.max_attempts,
            request_timeout: Duration::from_millis(self.poll.request_timeout_ms),
            manual_handoff_delay: Duration::from_millis(self.poll.manual_handoff_delay_ms),
        };
        timing.validate()?;
        Ok(timing)
    }
}
