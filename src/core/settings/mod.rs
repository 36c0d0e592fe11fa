//! Agent and browser runtime settings.
//!
//! Both records serialize with camelCase keys so they travel unchanged in the
//! executor start request and in exported configuration bundles.

mod bundle;
mod secret;

pub use bundle::{BundleError, ConfigBundle};
pub use secret::Secret;

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[default]
    Openai,
    AzureOpenai,
    Anthropic,
    Deepseek,
    Google,
    Alibaba,
    Moonshot,
    Unbound,
    Ibm,
    Grok,
    Ollama,
}

impl LlmProvider {
    pub const ALL: [LlmProvider; 11] = [
        LlmProvider::Openai,
        LlmProvider::AzureOpenai,
        LlmProvider::Anthropic,
        LlmProvider::Deepseek,
        LlmProvider::Google,
        LlmProvider::Alibaba,
        LlmProvider::Moonshot,
        LlmProvider::Unbound,
        LlmProvider::Ibm,
        LlmProvider::Grok,
        LlmProvider::Ollama,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LlmProvider::Openai => "openai",
            LlmProvider::AzureOpenai => "azure_openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Deepseek => "deepseek",
            LlmProvider::Google => "google",
            LlmProvider::Alibaba => "alibaba",
            LlmProvider::Moonshot => "moonshot",
            LlmProvider::Unbound => "unbound",
            LlmProvider::Ibm => "ibm",
            LlmProvider::Grok => "grok",
            LlmProvider::Ollama => "ollama",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase();
        Self::ALL.into_iter().find(|p| p.as_str() == normalized)
    }

    /// Context length is only forwarded to the model for local ollama runs.
    pub fn uses_context_length(self) -> bool {
        self == LlmProvider::Ollama
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallingMethod {
    FunctionCalling,
    JsonMode,
    Raw,
    #[default]
    Auto,
    Tools,
    #[serde(rename = "None")]
    Disabled,
}

impl ToolCallingMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolCallingMethod::FunctionCalling => "function_calling",
            ToolCallingMethod::JsonMode => "json_mode",
            ToolCallingMethod::Raw => "raw",
            ToolCallingMethod::Auto => "auto",
            ToolCallingMethod::Tools => "tools",
            ToolCallingMethod::Disabled => "None",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value.trim() {
            "function_calling" => Some(ToolCallingMethod::FunctionCalling),
            "json_mode" => Some(ToolCallingMethod::JsonMode),
            "raw" => Some(ToolCallingMethod::Raw),
            "auto" => Some(ToolCallingMethod::Auto),
            "tools" => Some(ToolCallingMethod::Tools),
            "None" | "none" => Some(ToolCallingMethod::Disabled),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SettingsError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("{field} expects a number, got '{input}'")]
    NotANumber { field: String, input: String },
    #[error("{field} expects true or false, got '{input}'")]
    NotAFlag { field: String, input: String },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("invalid URL for {field}: {reason}")]
    InvalidUrl { field: &'static str, reason: String },
    #[error("MCP server config is not valid JSON: {0}")]
    InvalidMcpConfig(String),
    #[error("unknown LLM provider '{0}'")]
    UnknownProvider(String),
    #[error("unknown tool calling method '{0}'")]
    UnknownToolCallingMethod(String),
    #[error("{0} requires a planner provider to be selected first")]
    PlannerDisabled(String),
    #[error("planner is given both as a nested record and as flat plannerLlm* keys")]
    PlannerConflict,
    #[error("unknown setting '{0}'")]
    UnknownField(String),
}

/// Optional secondary model used for planning steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerSettings {
    pub provider: LlmProvider,
    pub model_name: String,
    pub temperature: f64,
    pub use_vision: bool,
    pub ollama_num_ctx: u32,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub base_url: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub api_key: Option<Secret>,
}

impl PlannerSettings {
    pub fn for_provider(provider: LlmProvider) -> Self {
        Self {
            provider,
            model_name: String::new(),
            temperature: 0.6,
            use_vision: false,
            ollama_num_ctx: 16000,
            base_url: None,
            api_key: None,
        }
    }
}

/// Tool server configuration as typed by the operator, plus its parsed form.
#[derive(Debug, Clone, PartialEq)]
pub struct McpServerConfig {
    raw: String,
    parsed: serde_json::Value,
}

impl McpServerConfig {
    pub fn parse(raw: &str) -> Result<Self, SettingsError> {
        let parsed = serde_json::from_str(raw)
            .map_err(|e| SettingsError::InvalidMcpConfig(e.to_string()))?;
        Ok(Self {
            raw: raw.to_string(),
            parsed,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn parsed(&self) -> &serde_json::Value {
        &self.parsed
    }
}

/// Serialized as the raw text only; the parsed form is rebuilt on load.
mod mcp_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::McpServerConfig;

    pub fn serialize<S: Serializer>(
        value: &Option<McpServerConfig>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(cfg) => serializer.serialize_some(cfg.raw()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<McpServerConfig>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            Some(text) if !text.trim().is_empty() => McpServerConfig::parse(&text)
                .map(Some)
                .map_err(D::Error::custom),
            _ => Ok(None),
        }
    }
}

/// Unset text fields arrive as `""` from web editors; treat them as absent.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .map(T::from))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "AgentSettingsRepr")]
pub struct AgentSettings {
    pub override_system_prompt: String,
    pub extend_system_prompt: String,
    pub llm_provider: LlmProvider,
    pub llm_model_name: String,
    pub llm_temperature: f64,
    pub use_vision: bool,
    pub ollama_num_ctx: u32,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<Secret>,
    pub planner: Option<PlannerSettings>,
    pub max_steps: u32,
    pub max_actions: u32,
    pub max_input_tokens: u32,
    pub tool_calling_method: ToolCallingMethod,
    #[serde(serialize_with = "mcp_serde::serialize")]
    pub mcp_server_config: Option<McpServerConfig>,
}

/// Input layout for [`AgentSettings`]. Besides the nested `planner` record it
/// accepts the flat `planner*` keys written by the web panel, where a blank
/// `plannerLlmProvider` means no planner.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentSettingsRepr {
    override_system_prompt: String,
    extend_system_prompt: String,
    llm_provider: LlmProvider,
    llm_model_name: String,
    llm_temperature: f64,
    use_vision: bool,
    ollama_num_ctx: u32,
    #[serde(default, deserialize_with = "blank_as_none")]
    llm_base_url: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    llm_api_key: Option<Secret>,
    #[serde(default)]
    planner: Option<PlannerSettings>,
    #[serde(default, deserialize_with = "blank_as_none")]
    planner_llm_provider: Option<String>,
    #[serde(default)]
    planner_llm_model_name: Option<String>,
    #[serde(default)]
    planner_llm_temperature: Option<f64>,
    #[serde(default)]
    planner_use_vision: Option<bool>,
    #[serde(default)]
    planner_ollama_num_ctx: Option<u32>,
    #[serde(default, deserialize_with = "blank_as_none")]
    planner_llm_base_url: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    planner_llm_api_key: Option<Secret>,
    max_steps: u32,
    max_actions: u32,
    max_input_tokens: u32,
    tool_calling_method: ToolCallingMethod,
    #[serde(default, with = "mcp_serde")]
    mcp_server_config: Option<McpServerConfig>,
}

impl TryFrom<AgentSettingsRepr> for AgentSettings {
    type Error = SettingsError;

    fn try_from(repr: AgentSettingsRepr) -> Result<Self, SettingsError> {
        let flat_planner = match repr.planner_llm_provider {
            None => None,
            Some(name) => {
                let provider =
                    LlmProvider::from_name(&name).ok_or(SettingsError::UnknownProvider(name))?;
                let defaults = PlannerSettings::for_provider(provider);
                Some(PlannerSettings {
                    provider,
                    model_name: repr
                        .planner_llm_model_name
                        .map(|m| m.trim().to_string())
                        .unwrap_or(defaults.model_name),
                    temperature: repr.planner_llm_temperature.unwrap_or(defaults.temperature),
                    use_vision: repr.planner_use_vision.unwrap_or(defaults.use_vision),
                    ollama_num_ctx: repr.planner_ollama_num_ctx.unwrap_or(defaults.ollama_num_ctx),
                    base_url: repr.planner_llm_base_url,
                    api_key: repr.planner_llm_api_key,
                })
            }
        };
        let planner = match (repr.planner, flat_planner) {
            (Some(_), Some(_)) => return Err(SettingsError::PlannerConflict),
            (nested, flat) => nested.or(flat),
        };

        Ok(Self {
            override_system_prompt: repr.override_system_prompt,
            extend_system_prompt: repr.extend_system_prompt,
            llm_provider: repr.llm_provider,
            llm_model_name: repr.llm_model_name,
            llm_temperature: repr.llm_temperature,
            use_vision: repr.use_vision,
            ollama_num_ctx: repr.ollama_num_ctx,
            llm_base_url: repr.llm_base_url,
            llm_api_key: repr.llm_api_key,
            planner,
            max_steps: repr.max_steps,
            max_actions: repr.max_actions,
            max_input_tokens: repr.max_input_tokens,
            tool_calling_method: repr.tool_calling_method,
            mcp_server_config: repr.mcp_server_config,
        })
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            override_system_prompt: String::new(),
            extend_system_prompt: String::new(),
            llm_provider: LlmProvider::Openai,
            llm_model_name: "gpt-4o".to_string(),
            llm_temperature: 0.6,
            use_vision: true,
            ollama_num_ctx: 16000,
            llm_base_url: None,
            llm_api_key: None,
            planner: None,
            max_steps: 100,
            max_actions: 10,
            max_input_tokens: 128000,
            tool_calling_method: ToolCallingMethod::Auto,
            mcp_server_config: None,
        }
    }
}

impl AgentSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.llm_model_name.trim().is_empty() {
            return Err(SettingsError::Empty("llmModelName"));
        }
        check_range("llmTemperature", self.llm_temperature, 0.0, 2.0)?;
        check_range("ollamaNumCtx", self.ollama_num_ctx as f64, 256.0, 65536.0)?;
        check_range("maxSteps", self.max_steps as f64, 1.0, 1000.0)?;
        check_range("maxActions", self.max_actions as f64, 1.0, 100.0)?;
        check_range(
            "maxInputTokens",
            self.max_input_tokens as f64,
            1000.0,
            1_000_000.0,
        )?;
        check_url("llmBaseUrl", self.llm_base_url.as_deref(), &["http", "https"])?;

        if let Some(planner) = &self.planner {
            check_range("plannerLlmTemperature", planner.temperature, 0.0, 2.0)?;
            check_range(
                "plannerOllamaNumCtx",
                planner.ollama_num_ctx as f64,
                256.0,
                65536.0,
            )?;
            check_url(
                "plannerLlmBaseUrl",
                planner.base_url.as_deref(),
                &["http", "https"],
            )?;
        }
        Ok(())
    }

    fn apply(&mut self, patch: AgentSettingsPatch) {
        if let Some(v) = patch.override_system_prompt {
            self.override_system_prompt = v;
        }
        if let Some(v) = patch.extend_system_prompt {
            self.extend_system_prompt = v;
        }
        if let Some(v) = patch.llm_provider {
            self.llm_provider = v;
        }
        if let Some(v) = patch.llm_model_name {
            self.llm_model_name = v;
        }
        if let Some(v) = patch.llm_temperature {
            self.llm_temperature = v;
        }
        if let Some(v) = patch.use_vision {
            self.use_vision = v;
        }
        if let Some(v) = patch.ollama_num_ctx {
            self.ollama_num_ctx = v;
        }
        if let Some(v) = patch.llm_base_url {
            self.llm_base_url = v;
        }
        if let Some(v) = patch.llm_api_key {
            self.llm_api_key = v;
        }
        if let Some(v) = patch.planner {
            self.planner = v;
        }
        if let Some(v) = patch.max_steps {
            self.max_steps = v;
        }
        if let Some(v) = patch.max_actions {
            self.max_actions = v;
        }
        if let Some(v) = patch.max_input_tokens {
            self.max_input_tokens = v;
        }
        if let Some(v) = patch.tool_calling_method {
            self.tool_calling_method = v;
        }
        if let Some(v) = patch.mcp_server_config {
            self.mcp_server_config = v;
        }
    }
}

/// Fields left as `None` keep their current value. Nested `Option`s clear the
/// field when set to `Some(None)`.
#[derive(Debug, Clone, Default)]
pub struct AgentSettingsPatch {
    pub override_system_prompt: Option<String>,
    pub extend_system_prompt: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model_name: Option<String>,
    pub llm_temperature: Option<f64>,
    pub use_vision: Option<bool>,
    pub ollama_num_ctx: Option<u32>,
    pub llm_base_url: Option<Option<String>>,
    pub llm_api_key: Option<Option<Secret>>,
    pub planner: Option<Option<PlannerSettings>>,
    pub max_steps: Option<u32>,
    pub max_actions: Option<u32>,
    pub max_input_tokens: Option<u32>,
    pub tool_calling_method: Option<ToolCallingMethod>,
    pub mcp_server_config: Option<Option<McpServerConfig>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSettings {
    pub browser_binary_path: String,
    pub browser_user_data_dir: String,
    pub use_own_browser: bool,
    pub keep_browser_open: bool,
    pub headless: bool,
    pub disable_security: bool,
    pub window_width: u32,
    pub window_height: u32,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub cdp_url: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub wss_url: Option<String>,
    pub save_recording_path: String,
    pub save_trace_path: String,
    pub save_agent_history_path: String,
    pub save_download_path: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            browser_binary_path: String::new(),
            browser_user_data_dir: String::new(),
            use_own_browser: false,
            keep_browser_open: true,
            headless: false,
            disable_security: false,
            window_width: 1280,
            window_height: 1100,
            cdp_url: None,
            wss_url: None,
            save_recording_path: "./tmp/record_videos".to_string(),
            save_trace_path: "./tmp/traces".to_string(),
            save_agent_history_path: "./tmp/agent_history".to_string(),
            save_download_path: "./tmp/downloads".to_string(),
        }
    }
}

impl BrowserSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        check_range("windowWidth", self.window_width as f64, 800.0, 2560.0)?;
        check_range("windowHeight", self.window_height as f64, 600.0, 1440.0)?;
        check_url(
            "cdpUrl",
            self.cdp_url.as_deref(),
            &["http", "https", "ws", "wss"],
        )?;
        check_url("wssUrl", self.wss_url.as_deref(), &["ws", "wss"])?;
        Ok(())
    }

    /// Names of the session-shaping flags that differ between `self` and `other`.
    pub fn changed_session_flags(&self, other: &BrowserSettings) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.use_own_browser != other.use_own_browser {
            changed.push("useOwnBrowser");
        }
        if self.keep_browser_open != other.keep_browser_open {
            changed.push("keepBrowserOpen");
        }
        if self.headless != other.headless {
            changed.push("headless");
        }
        if self.disable_security != other.disable_security {
            changed.push("disableSecurity");
        }
        changed
    }

    fn apply(&mut self, patch: BrowserSettingsPatch) {
        if let Some(v) = patch.browser_binary_path {
            self.browser_binary_path = v;
        }
        if let Some(v) = patch.browser_user_data_dir {
            self.browser_user_data_dir = v;
        }
        if let Some(v) = patch.use_own_browser {
            self.use_own_browser = v;
        }
        if let Some(v) = patch.keep_browser_open {
            self.keep_browser_open = v;
        }
        if let Some(v) = patch.headless {
            self.headless = v;
        }
        if let Some(v) = patch.disable_security {
            self.disable_security = v;
        }
        if let Some(v) = patch.window_width {
            self.window_width = v;
        }
        if let Some(v) = patch.window_height {
            self.window_height = v;
        }
        if let Some(v) = patch.cdp_url {
            self.cdp_url = v;
        }
        if let Some(v) = patch.wss_url {
            self.wss_url = v;
        }
        if let Some(v) = patch.save_recording_path {
            self.save_recording_path = v;
        }
        if let Some(v) = patch.save_trace_path {
            self.save_trace_path = v;
        }
        if let Some(v) = patch.save_agent_history_path {
            self.save_agent_history_path = v;
        }
        if let Some(v) = patch.save_download_path {
            self.save_download_path = v;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BrowserSettingsPatch {
    pub browser_binary_path: Option<String>,
    pub browser_user_data_dir: Option<String>,
    pub use_own_browser: Option<bool>,
    pub keep_browser_open: Option<bool>,
    pub headless: Option<bool>,
    pub disable_security: Option<bool>,
    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
    pub cdp_url: Option<Option<String>>,
    pub wss_url: Option<Option<String>>,
    pub save_recording_path: Option<String>,
    pub save_trace_path: Option<String>,
    pub save_agent_history_path: Option<String>,
    pub save_download_path: Option<String>,
}

/// Sent to whoever owns the remote browser context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserSignal {
    TeardownRequested { changed: Vec<&'static str> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserUpdate {
    pub teardown_requested: bool,
}

pub struct SettingsStore {
    agent: AgentSettings,
    browser: BrowserSettings,
    browser_signals: broadcast::Sender<BrowserSignal>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(AgentSettings::default(), BrowserSettings::default())
    }
}

impl SettingsStore {
    pub fn new(agent: AgentSettings, browser: BrowserSettings) -> Self {
        let (browser_signals, _) = broadcast::channel(16);
        Self {
            agent,
            browser,
            browser_signals,
        }
    }

    pub fn agent(&self) -> &AgentSettings {
        &self.agent
    }

    pub fn browser(&self) -> &BrowserSettings {
        &self.browser
    }

    pub fn snapshot(&self) -> (AgentSettings, BrowserSettings) {
        (self.agent.clone(), self.browser.clone())
    }

    pub fn subscribe_browser_signals(&self) -> broadcast::Receiver<BrowserSignal> {
        self.browser_signals.subscribe()
    }

    pub fn update_agent_settings(&mut self, patch: AgentSettingsPatch) -> Result<(), SettingsError> {
        let mut candidate = self.agent.clone();
        candidate.apply(patch);
        candidate.validate()?;
        self.agent = candidate;
        Ok(())
    }

    pub fn update_browser_settings(
        &mut self,
        patch: BrowserSettingsPatch,
    ) -> Result<BrowserUpdate, SettingsError> {
        let mut candidate = self.browser.clone();
        candidate.apply(patch);
        candidate.validate()?;
        let changed = self.browser.changed_session_flags(&candidate);
        self.browser = candidate;
        Ok(self.signal_teardown(changed))
    }

    /// Replace both records at once. Nothing is stored unless both validate.
    pub fn replace_all(
        &mut self,
        agent: AgentSettings,
        browser: BrowserSettings,
    ) -> Result<BrowserUpdate, SettingsError> {
        agent.validate()?;
        browser.validate()?;
        let changed = self.browser.changed_session_flags(&browser);
        self.agent = agent;
        self.browser = browser;
        Ok(self.signal_teardown(changed))
    }

    /// String entry point used by interactive editors. `key` is the camelCase
    /// field name as it appears in exported bundles.
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<BrowserUpdate, SettingsError> {
        let result = self.set_field_inner(key, value);
        if let Err(e) = &result {
            warn!("Rejected setting {}: {}", key, e);
        }
        result
    }

    fn set_field_inner(&mut self, key: &str, value: &str) -> Result<BrowserUpdate, SettingsError> {
        let untouched = BrowserUpdate {
            teardown_requested: false,
        };
        let mut agent = AgentSettingsPatch::default();
        match key {
            "overrideSystemPrompt" => agent.override_system_prompt = Some(value.to_string()),
            "extendSystemPrompt" => agent.extend_system_prompt = Some(value.to_string()),
            "llmProvider" => {
                agent.llm_provider = Some(
                    LlmProvider::from_name(value)
                        .ok_or_else(|| SettingsError::UnknownProvider(value.to_string()))?,
                )
            }
            "llmModelName" => agent.llm_model_name = Some(value.trim().to_string()),
            "llmTemperature" => agent.llm_temperature = Some(parse_number(key, value)?),
            "useVision" => agent.use_vision = Some(parse_flag(key, value)?),
            "ollamaNumCtx" => agent.ollama_num_ctx = Some(parse_number(key, value)?),
            "llmBaseUrl" => agent.llm_base_url = Some(optional_text(value)),
            "llmApiKey" => agent.llm_api_key = Some(optional_text(value).map(Secret::new)),
            "maxSteps" => agent.max_steps = Some(parse_number(key, value)?),
            "maxActions" => agent.max_actions = Some(parse_number(key, value)?),
            "maxInputTokens" => agent.max_input_tokens = Some(parse_number(key, value)?),
            "toolCallingMethod" => {
                agent.tool_calling_method = Some(
                    ToolCallingMethod::from_name(value)
                        .ok_or_else(|| SettingsError::UnknownToolCallingMethod(value.to_string()))?,
                )
            }
            "mcpServerConfig" => {
                agent.mcp_server_config = Some(match optional_text(value) {
                    Some(text) => Some(McpServerConfig::parse(&text)?),
                    None => None,
                })
            }
            "plannerLlmProvider" => {
                agent.planner = Some(match optional_text(value) {
                    None => None,
                    Some(name) => {
                        let provider = LlmProvider::from_name(&name)
                            .ok_or(SettingsError::UnknownProvider(name))?;
                        let mut planner = self
                            .agent
                            .planner
                            .clone()
                            .unwrap_or_else(|| PlannerSettings::for_provider(provider));
                        planner.provider = provider;
                        Some(planner)
                    }
                })
            }
            k if k.starts_with("planner") => {
                let mut planner = self
                    .agent
                    .planner
                    .clone()
                    .ok_or_else(|| SettingsError::PlannerDisabled(k.to_string()))?;
                match k {
                    "plannerLlmModelName" => planner.model_name = value.trim().to_string(),
                    "plannerLlmTemperature" => planner.temperature = parse_number(k, value)?,
                    "plannerUseVision" => planner.use_vision = parse_flag(k, value)?,
                    "plannerOllamaNumCtx" => planner.ollama_num_ctx = parse_number(k, value)?,
                    "plannerLlmBaseUrl" => planner.base_url = optional_text(value),
                    "plannerLlmApiKey" => planner.api_key = optional_text(value).map(Secret::new),
                    _ => return Err(SettingsError::UnknownField(k.to_string())),
                }
                agent.planner = Some(Some(planner));
            }
            _ => return self.set_browser_field(key, value),
        }
        self.update_agent_settings(agent)?;
        Ok(untouched)
    }

    fn set_browser_field(&mut self, key: &str, value: &str) -> Result<BrowserUpdate, SettingsError> {
        let mut patch = BrowserSettingsPatch::default();
        match key {
            "browserBinaryPath" => patch.browser_binary_path = Some(value.trim().to_string()),
            "browserUserDataDir" => patch.browser_user_data_dir = Some(value.trim().to_string()),
            "useOwnBrowser" => patch.use_own_browser = Some(parse_flag(key, value)?),
            "keepBrowserOpen" => patch.keep_browser_open = Some(parse_flag(key, value)?),
            "headless" => patch.headless = Some(parse_flag(key, value)?),
            "disableSecurity" => patch.disable_security = Some(parse_flag(key, value)?),
            "windowWidth" => patch.window_width = Some(parse_number(key, value)?),
            "windowHeight" => patch.window_height = Some(parse_number(key, value)?),
            "cdpUrl" => patch.cdp_url = Some(optional_text(value)),
            "wssUrl" => patch.wss_url = Some(optional_text(value)),
            "saveRecordingPath" => patch.save_recording_path = Some(value.trim().to_string()),
            "saveTracePath" => patch.save_trace_path = Some(value.trim().to_string()),
            "saveAgentHistoryPath" => {
                patch.save_agent_history_path = Some(value.trim().to_string())
            }
            "saveDownloadPath" => patch.save_download_path = Some(value.trim().to_string()),
            _ => return Err(SettingsError::UnknownField(key.to_string())),
        }
        self.update_browser_settings(patch)
    }

    fn signal_teardown(&self, changed: Vec<&'static str>) -> BrowserUpdate {
        if changed.is_empty() {
            return BrowserUpdate {
                teardown_requested: false,
            };
        }
        info!(
            "Browser session flags changed ({}), requesting teardown",
            changed.join(", ")
        );
        // No receivers simply means no browser session is open.
        let _ = self
            .browser_signals
            .send(BrowserSignal::TeardownRequested { changed });
        BrowserUpdate {
            teardown_requested: true,
        }
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), SettingsError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::OutOfRange {
            field,
            min,
            max,
            value,
        })
    }
}

fn check_url(
    field: &'static str,
    value: Option<&str>,
    schemes: &[&str],
) -> Result<(), SettingsError> {
    let Some(raw) = value else {
        return Ok(());
    };
    let parsed = url::Url::parse(raw).map_err(|e| SettingsError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(SettingsError::InvalidUrl {
            field,
            reason: format!(
                "scheme '{}' is not one of {}",
                parsed.scheme(),
                schemes.join(", ")
            ),
        });
    }
    Ok(())
}

fn parse_number<T: FromStr>(field: &str, input: &str) -> Result<T, SettingsError> {
    input
        .trim()
        .parse::<T>()
        .map_err(|_| SettingsError::NotANumber {
            field: field.to_string(),
            input: input.to_string(),
        })
}

fn parse_flag(field: &str, input: &str) -> Result<bool, SettingsError> {
    match input.trim().to_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(SettingsError::NotAFlag {
            field: field.to_string(),
            input: input.to_string(),
        }),
    }
}

fn optional_text(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
