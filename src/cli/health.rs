use anyhow::Result;

use crate::core::config::ClientConfig;
use crate::core::gateway::HttpGateway;
use crate::core::terminal::{GuideSection, print_status, print_success, print_warn};

pub async fn run_health(config: &ClientConfig) -> Result<()> {
    let gateway = HttpGateway::new(&config.api_url, false)?;
    let health = gateway.health().await?;
    let status = health
        .get("status")
        .and_then(|s| s.as_str())
        .unwrap_or("unknown");
    print_success(&format!("Executor at {} is {}", gateway.base_url(), status));
    print_status("Agent type", &config.agent_type);
    print_status(
        "Stop cancels remotely",
        if config.cancel_on_stop { "yes" } else { "no" },
    );

    match gateway.list_agents().await {
        Ok(agents) if !agents.is_empty() => {
            let mut section = GuideSection::new("Agents");
            for agent in &agents {
                let description = if agent.description.is_empty() {
                    agent.name.clone()
                } else {
                    format!("{} ({})", agent.description, agent.status)
                };
                section = section.command(&agent.id, &description);
            }
            section.print();
            println!();
        }
        Ok(_) => print_warn("Executor reports no agents."),
        Err(e) => print_warn(&format!("Could not list agents: {}", e)),
    }
    Ok(())
}
