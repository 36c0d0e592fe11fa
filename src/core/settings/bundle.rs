use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AgentSettings, BrowserSettings, BrowserUpdate, SettingsError, SettingsStore};

pub const BUNDLE_VERSION: &str = "1.0.0";

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("configuration file is not valid JSON: {0}")]
    Malformed(String),
    #[error("configuration file does not match the expected layout: {0}")]
    Schema(String),
    #[error("unsupported configuration version '{0}' (expected 1.x)")]
    UnsupportedVersion(String),
    #[error("configuration rejected: {0}")]
    Invalid(#[from] SettingsError),
}

/// Portable snapshot of both settings records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigBundle {
    pub agent_settings: AgentSettings,
    pub browser_settings: BrowserSettings,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl ConfigBundle {
    pub fn capture(store: &SettingsStore) -> Self {
        let (agent_settings, browser_settings) = store.snapshot();
        Self {
            agent_settings,
            browser_settings,
            timestamp: Utc::now(),
            version: BUNDLE_VERSION.to_string(),
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Drop every API key from the bundle.
    pub fn redact_secrets(mut self) -> Self {
        self.agent_settings.llm_api_key = None;
        if let Some(planner) = self.agent_settings.planner.as_mut() {
            planner.api_key = None;
        }
        self
    }

    /// Parse and fully validate a bundle. Nothing is returned unless every
    /// stage passes, so callers can apply the result without further checks.
    pub fn parse(text: &str) -> Result<Self, BundleError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| BundleError::Malformed(e.to_string()))?;
        let bundle: ConfigBundle =
            serde_json::from_value(value).map_err(|e| BundleError::Schema(e.to_string()))?;

        let major = bundle.version.split('.').next().unwrap_or_default();
        let expected_major = BUNDLE_VERSION.split('.').next().unwrap_or_default();
        if major != expected_major {
            return Err(BundleError::UnsupportedVersion(bundle.version));
        }

        bundle.agent_settings.validate()?;
        bundle.browser_settings.validate()?;
        Ok(bundle)
    }

    pub fn apply(self, store: &mut SettingsStore) -> Result<BrowserUpdate, BundleError> {
        let update = store.replace_all(self.agent_settings, self.browser_settings)?;
        info!("Applied configuration bundle from {}", self.timestamp);
        Ok(update)
    }
}
