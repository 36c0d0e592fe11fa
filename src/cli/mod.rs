mod config_cmd;
mod health;
mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use console::style;

use crate::core::config::ClientConfig;
use crate::core::gateway::HttpGateway;
use crate::core::session::AgentSession;
use crate::core::settings::{ConfigBundle, SettingsStore};
use crate::core::terminal::{self, GuideSection, print_error};
use crate::interfaces::cli::CliInterface;
use crate::platform::{NativePlatform, Platform};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Tasks")
        .command("run", "Submit one instruction and stream the transcript")
        .command("tui", "Start the interactive control panel")
        .print();

    GuideSection::new("Configuration")
        .command("config export", "Write agent and browser settings as JSON")
        .command("config check", "Validate a settings bundle without applying it")
        .print();

    GuideSection::new("Diagnostics")
        .command("health", "Check the executor and list its agents")
        .command("help", "Show this message")
        .print();

    GuideSection::new("Common flags")
        .text("--api-url <url>          Executor base URL (default: http://localhost:8001)")
        .text("--settings, -s <path>    Settings bundle to load before running")
        .blank()
        .hint("voxa run -i \"find the cheapest flight to Lisbon\"", "")
        .hint("voxa config export --out agent.json --redact-secrets", "")
        .print();

    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("voxa").green()
    );
}

/// Flags shared by every command that talks to the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CommonFlags {
    pub api_url: Option<String>,
    pub settings: Option<PathBuf>,
}

impl CommonFlags {
    /// Consume `args[i]` if it is a shared flag. Returns the next index.
    fn take(&mut self, args: &[String], i: usize) -> Option<usize> {
        match args[i].as_str() {
            "--api-url" => {
                if i + 1 < args.len() {
                    self.api_url = Some(args[i + 1].clone());
                    Some(i + 2)
                } else {
                    Some(i + 1)
                }
            }
            "--settings" | "-s" => {
                if i + 1 < args.len() {
                    self.settings = Some(PathBuf::from(&args[i + 1]));
                    Some(i + 2)
                } else {
                    Some(i + 1)
                }
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunCommandArgs {
    pub instruction: String,
    pub common: CommonFlags,
}

pub(crate) fn parse_run_command_args(args: &[String], start: usize) -> RunCommandArgs {
    let mut instruction = String::new();
    let mut words = Vec::new();
    let mut common = CommonFlags::default();
    let mut i = start;
    while i < args.len() {
        if let Some(next) = common.take(args, i) {
            i = next;
            continue;
        }
        match args[i].as_str() {
            "--instruction" | "-i" => {
                if i + 1 < args.len() {
                    instruction = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            other => {
                words.push(other.to_string());
                i += 1;
            }
        }
    }
    if instruction.is_empty() {
        instruction = words.join(" ");
    }
    RunCommandArgs {
        instruction,
        common,
    }
}

pub(crate) fn parse_common_flags(args: &[String], start: usize) -> CommonFlags {
    let mut common = CommonFlags::default();
    let mut i = start;
    while i < args.len() {
        i = common.take(args, i).unwrap_or(i + 1);
    }
    common
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ExportArgs {
    pub out: Option<PathBuf>,
    pub redact_secrets: bool,
    pub common: CommonFlags,
}

pub(crate) fn parse_export_args(args: &[String], start: usize) -> ExportArgs {
    let mut parsed = ExportArgs::default();
    let mut i = start;
    while i < args.len() {
        if let Some(next) = parsed.common.take(args, i) {
            i = next;
            continue;
        }
        match args[i].as_str() {
            "--out" | "-o" => {
                if i + 1 < args.len() {
                    parsed.out = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--redact-secrets" => {
                parsed.redact_secrets = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    parsed
}

pub(crate) async fn load_config(data_dir: &Path, flags: &CommonFlags) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(data_dir).await?;
    if let Some(url) = &flags.api_url {
        config.api_url = url.clone();
    }
    Ok(config)
}

/// Default settings, or the ones from a bundle file when one is given.
pub(crate) async fn load_settings(path: Option<&Path>) -> Result<SettingsStore> {
    let mut store = SettingsStore::default();
    if let Some(path) = path {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        ConfigBundle::parse(&text)?.apply(&mut store)?;
    }
    Ok(store)
}

pub(crate) async fn build_session(config: &ClientConfig, flags: &CommonFlags) -> Result<AgentSession> {
    let settings = load_settings(flags.settings.as_deref()).await?;
    let gateway = Arc::new(HttpGateway::new(&config.api_url, config.cancel_on_stop)?);
    Ok(AgentSession::new(
        gateway,
        settings,
        config.timing()?,
        config.agent_type.clone(),
    ))
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let data_dir = NativePlatform::data_dir();

    let Some(cmd) = args.get(1).map(String::as_str) else {
        print_help();
        return Ok(());
    };

    match cmd {
        "run" => {
            let parsed = parse_run_command_args(&args, 2);
            if parsed.instruction.trim().is_empty() {
                bail!("--instruction is required for run mode.");
            }
            crate::logging::init(false);
            let config = load_config(&data_dir, &parsed.common).await?;
            let session = build_session(&config, &parsed.common).await?;
            run::run_headless(session, &parsed.instruction).await
        }
        "tui" => {
            let flags = parse_common_flags(&args, 2);
            let log_tx = crate::logging::init(true);
            let config = load_config(&data_dir, &flags).await?;
            let session = build_session(&config, &flags).await?;
            let mut cli = CliInterface::new(session, config.api_url.clone(), log_tx);
            cli.run_tui().await?;
            terminal::print_goodbye();
            Ok(())
        }
        "config" => {
            let sub_cmd = args.get(2).map(String::as_str).unwrap_or("");
            match sub_cmd {
                "export" => config_cmd::export(parse_export_args(&args, 3)).await,
                "check" => match args.get(3) {
                    Some(path) => config_cmd::check(Path::new(path)).await,
                    None => bail!("Usage: voxa config check <path>"),
                },
                _ => {
                    GuideSection::new("voxa config")
                        .command("export", "Write settings as JSON (--out, --redact-secrets)")
                        .command("check", "Validate a settings bundle")
                        .print();
                    println!();
                    Ok(())
                }
            }
        }
        "health" => {
            let flags = parse_common_flags(&args, 2);
            crate::logging::init(false);
            let config = load_config(&data_dir, &flags).await?;
            health::run_health(&config).await
        }
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        _ => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(())
        }
    }
}
