//! Instance lifecycle steps driven through the agent

use crate::agent::AgentClient;
use crate::error::{RelprovError, RelprovResult};
use std::sync::Arc;
use tracing::debug;

/// Stops all jobs on an instance
pub struct Stopper {
    agent: Arc<dyn AgentClient>,
}

impl Stopper {
    pub fn new(agent: Arc<dyn AgentClient>) -> Self {
        Self { agent }
    }

    pub async fn stop(&self) -> RelprovResult<()> {
        debug!("Stopping instance");

        self.agent
            .stop()
            .await
            .map_err(|e| e.with_context("Stopping instance"))?;
        Ok(())
    }
}

/// Runs post-start scripts once an instance is running
pub struct PostStarter {
    agent: Arc<dyn AgentClient>,
}

impl PostStarter {
    pub fn new(agent: Arc<dyn AgentClient>) -> Self {
        Self { agent }
    }

    /// Any agent failure becomes [`RelprovError::PostStartFailed`], with the
    /// agent's error kept as its source
    pub async fn post_start(&self) -> RelprovResult<()> {
        debug!("Running post-start");

        match self.agent.post_start().await {
            Ok(_) => Ok(()),
            Err(e) => Err(RelprovError::PostStartFailed {
                source: Box::new(e),
            }),
        }
    }
}
