//! Agent command - instance lifecycle calls

use crate::agent::HttpAgentClient;
use crate::cli::args::{AgentAction, AgentArgs};
use crate::config::Config;
use crate::error::RelprovResult;
use crate::instance::{PostStarter, Stopper};
use console::style;
use std::sync::Arc;

/// Execute the agent command
pub async fn execute(args: AgentArgs, config: &Config) -> RelprovResult<()> {
    let url = args.agent_url.as_deref().unwrap_or(&config.agent.url);
    let agent = Arc::new(HttpAgentClient::new(
        url,
        config.agent.timeout(),
        config.agent.poll_interval(),
    ));

    match args.action {
        AgentAction::Stop => {
            Stopper::new(agent).stop().await?;
            eprintln!("{} Instance stopped", style("✓").green());
        }
        AgentAction::PostStart => {
            PostStarter::new(agent).post_start().await?;
            eprintln!("{} Post-start scripts finished", style("✓").green());
        }
    }

    Ok(())
}
