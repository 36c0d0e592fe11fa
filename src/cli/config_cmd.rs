use std::path::Path;

use anyhow::{Context, Result};

use super::{ExportArgs, load_settings};
use crate::core::settings::ConfigBundle;
use crate::core::terminal::{GuideSection, print_success, print_warn};
use crate::platform::{NativePlatform, Platform};

pub async fn export(args: ExportArgs) -> Result<()> {
    let store = load_settings(args.common.settings.as_deref()).await?;
    let mut bundle = ConfigBundle::capture(&store);
    if args.redact_secrets {
        bundle = bundle.redact_secrets();
    }
    let json = bundle.to_json()?;

    match args.out {
        Some(path) => {
            // The bundle may carry API keys.
            NativePlatform::write_private_file(&path, json.as_bytes())
                .with_context(|| format!("cannot write {}", path.display()))?;
            print_success(&format!("Configuration exported to {}", path.display()));
        }
        None => println!("{}", json),
    }
    Ok(())
}

pub async fn check(path: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let bundle = ConfigBundle::parse(&text)?;
    let agent = &bundle.agent_settings;
    let browser = &bundle.browser_settings;

    print_success(&format!("{} is a valid configuration", path.display()));
    GuideSection::new("Summary")
        .status("Version", &bundle.version)
        .status("Exported", &bundle.timestamp.to_rfc3339())
        .status(
            "Model",
            &format!("{} / {}", agent.llm_provider.as_str(), agent.llm_model_name),
        )
        .status(
            "Planner",
            &agent
                .planner
                .as_ref()
                .map(|p| format!("{} / {}", p.provider.as_str(), p.model_name))
                .unwrap_or_else(|| "none".to_string()),
        )
        .status(
            "Limits",
            &format!(
                "{} steps, {} actions per step",
                agent.max_steps, agent.max_actions
            ),
        )
        .status(
            "Window",
            &format!("{}x{}", browser.window_width, browser.window_height),
        )
        .print();
    println!();

    if agent.llm_api_key.is_some() {
        print_warn("This file contains an API key. Keep it private.");
    }
    Ok(())
}
