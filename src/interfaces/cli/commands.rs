use super::{COMMANDS, CliInterface};
use crate::core::task::TaskState;
use crate::platform::{NativePlatform, Platform};

impl CliInterface {
    pub(super) async fn handle_command(&mut self, input: &str) {
        let parts: Vec<&str> = input.splitn(3, ' ').collect();
        let cmd = parts[0];

        match cmd {
            "/help" => {
                self.cmd_output_lines.clear();
                self.push_cmd_output("Commands:".to_string());
                for info in COMMANDS {
                    self.push_cmd_output(format!("  {:<10} {}", info.name, info.description));
                }
                self.push_cmd_output("Anything else is sent to the agent as an instruction.".to_string());
            }
            "/pause" => {
                self.cmd_output_lines.clear();
                match self.session.toggle_pause().await {
                    Some(TaskState::Paused) => {
                        self.push_cmd_output("Task paused. Status updates keep arriving.".to_string())
                    }
                    Some(_) => self.push_cmd_output("Task resumed.".to_string()),
                    // The session publishes its own notice.
                    None => {}
                }
            }
            "/stop" => {
                self.cmd_output_lines.clear();
                self.session.stop().await;
            }
            "/status" => {
                self.cmd_output_lines.clear();
                let state = self.session.state().await;
                self.push_cmd_output(format!("State:    {}", state.as_str()));
                if let Some(task) = self.session.current_task().await {
                    self.push_cmd_output(format!("Task:     {}", task.id));
                    self.push_cmd_output(format!("Asked:    {}", task.instruction));
                    self.push_cmd_output(format!(
                        "Started:  {}",
                        task.created_at.format("%H:%M:%S")
                    ));
                    if let Some(url) = task.handle().and_then(|h| h.polling_url.as_deref()) {
                        self.push_cmd_output(format!("Polling:  {}", url));
                    }
                }
                self.push_cmd_output(format!("Executor: {}", self.api_url));
                let shots = self.session.screenshots().await;
                if !shots.is_empty() {
                    self.push_cmd_output(format!("Screenshots: {}", shots.len()));
                    for shot in shots.iter().rev().take(3) {
                        self.push_cmd_output(format!("  • {}", shot));
                    }
                }
            }
            "/settings" => {
                self.cmd_output_lines.clear();
                let (agent, browser) = self.session.settings_snapshot().await;
                self.push_cmd_output(format!(
                    "llm:      {} / {} (temperature {})",
                    agent.llm_provider.as_str(),
                    agent.llm_model_name,
                    agent.llm_temperature
                ));
                if agent.llm_provider.uses_context_length() {
                    self.push_cmd_output(format!("context:  {} tokens", agent.ollama_num_ctx));
                }
                if let Some(planner) = &agent.planner {
                    self.push_cmd_output(format!(
                        "planner:  {} / {}",
                        planner.provider.as_str(),
                        planner.model_name
                    ));
                }
                self.push_cmd_output(format!(
                    "limits:   {} steps, {} actions, {} input tokens",
                    agent.max_steps, agent.max_actions, agent.max_input_tokens
                ));
                self.push_cmd_output(format!(
                    "vision:   {}   tool calling: {}",
                    agent.use_vision,
                    agent.tool_calling_method.as_str()
                ));
                self.push_cmd_output(format!(
                    "browser:  {}x{} headless={} keep_open={} own={}",
                    browser.window_width,
                    browser.window_height,
                    browser.headless,
                    browser.keep_browser_open,
                    browser.use_own_browser
                ));
                if let Some(cdp) = &browser.cdp_url {
                    self.push_cmd_output(format!("cdp:      {}", cdp));
                }
                self.push_cmd_output("Change with /set <key> <value>, e.g. /set maxSteps 50".to_string());
            }
            "/set" => {
                self.cmd_output_lines.clear();
                let (Some(key), Some(value)) = (parts.get(1), parts.get(2)) else {
                    self.push_cmd_output("Usage: /set <key> <value>".to_string());
                    return;
                };
                match self.session.set_field(key, value).await {
                    Ok(_) => self.push_cmd_output(format!("{} updated.", key)),
                    Err(e) => self.push_cmd_output(format!("Error: {}", e)),
                }
            }
            "/import" => {
                self.cmd_output_lines.clear();
                let Some(path) = command_argument(input) else {
                    self.push_cmd_output("Usage: /import <path>".to_string());
                    return;
                };
                let text = match tokio::fs::read_to_string(path).await {
                    Ok(text) => text,
                    Err(e) => {
                        self.push_cmd_output(format!("Error: cannot read {}: {}", path, e));
                        return;
                    }
                };
                match self.session.import_bundle(&text).await {
                    Ok(_) => self.push_cmd_output(format!("Settings loaded from {}", path)),
                    Err(e) => self.push_cmd_output(format!("Error: {}", e)),
                }
            }
            "/export" => {
                self.cmd_output_lines.clear();
                let Some(path) = command_argument(input) else {
                    self.push_cmd_output("Usage: /export <path>".to_string());
                    return;
                };
                let json = match self.session.export_bundle().await.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        self.push_cmd_output(format!("Error: {}", e));
                        return;
                    }
                };
                match NativePlatform::write_private_file(std::path::Path::new(path), json.as_bytes()) {
                    Ok(()) => self.push_cmd_output(format!("Settings saved to {}", path)),
                    Err(e) => self.push_cmd_output(format!("Error: cannot write {}: {}", path, e)),
                }
            }
            "/open" => {
                self.cmd_output_lines.clear();
                match self.session.backend_link().await {
                    Some(link) => {
                        if let Err(e) = open::that(&link) {
                            self.push_cmd_output(format!("Could not open browser: {}", e));
                        }
                        self.push_cmd_output(format!("Web UI: {}", link));
                    }
                    None => self.push_cmd_output("No web UI link yet.".to_string()),
                }
            }
            "/logs" => {
                self.logs_visible = !self.logs_visible;
            }
            "/clear" => {
                self.session.clear().await;
                self.cmd_output_lines.clear();
                self.cmd_output_visible = false;
                self.scroll_offset = 0;
            }
            "/quit" | "/exit" => {
                self.should_quit = true;
            }
            _ => {
                self.cmd_output_lines.clear();
                self.push_cmd_output(format!("Unknown command: {}. Try /help", cmd));
            }
        }
    }
}

/// Everything after the command name, so paths may contain spaces.
fn command_argument(input: &str) -> Option<&str> {
    input
        .split_once(' ')
        .map(|(_, rest)| rest.trim())
        .filter(|rest| !rest.is_empty())
}
