//! JSON-over-HTTP agent client
//!
//! Every call is a `POST {url}/agent` with
//! `{"method", "arguments", "reply_to"}`. The agent answers with
//! `{"value": ...}` or `{"exception": {"message": ...}}`. Long running
//! methods answer with a task handle (`agent_task_id`, `state: running`)
//! which is polled with `get_task` until it settles.

use crate::agent::{AgentClient, CompilePackageRequest};
use crate::blobstore::BlobRef;
use crate::error::{RelprovError, RelprovResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct AgentResponse {
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    exception: Option<AgentException>,
}

#[derive(Debug, Deserialize)]
struct AgentException {
    message: String,
}

#[derive(Debug, Deserialize)]
struct TaskHandle {
    agent_task_id: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct CompileResult {
    result: CompiledBlob,
}

#[derive(Debug, Deserialize)]
struct CompiledBlob {
    blobstore_id: String,
    sha1: String,
}

/// Agent client speaking the agent's HTTP endpoint
pub struct HttpAgentClient {
    endpoint: String,
    agent: ureq::Agent,
    timeout: Duration,
    poll_interval: Duration,
}

impl HttpAgentClient {
    /// `timeout` bounds each HTTP round-trip, not a whole polled task
    pub fn new(url: &str, timeout: Duration, poll_interval: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            endpoint: format!("{}/agent", url.trim_end_matches('/')),
            agent,
            timeout,
            poll_interval,
        }
    }

    async fn send(&self, method: &str, arguments: Vec<Value>) -> RelprovResult<Value> {
        let body = json!({
            "method": method,
            "arguments": arguments,
            "reply_to": Uuid::new_v4().to_string(),
        })
        .to_string();

        debug!("Sending agent request {}", method);

        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let text = tokio::task::spawn_blocking(move || -> Result<String, ureq::Error> {
            let mut response = agent
                .post(&endpoint)
                .header("Content-Type", "application/json")
                .send(body.as_str())?;
            response.body_mut().read_to_string()
        })
        .await
        .map_err(|e| RelprovError::Internal(format!("agent request task: {}", e)))?
        .map_err(|e| match e {
            ureq::Error::Timeout(_) => RelprovError::Timeout {
                operation: format!("agent {}", method),
                after: self.timeout,
            },
            other => RelprovError::Transport(format!("{}: {}", method, other)),
        })?;

        let response: AgentResponse = serde_json::from_str(&text).map_err(|e| {
            RelprovError::Transport(format!("{}: malformed agent response: {}", method, e))
        })?;

        if let Some(exception) = response.exception {
            return Err(RelprovError::AgentTask(exception.message));
        }

        response.value.ok_or_else(|| {
            RelprovError::Transport(format!("{}: agent response without value", method))
        })
    }

    /// Send a method and wait for its task to settle
    async fn run_task(&self, method: &str, arguments: Vec<Value>) -> RelprovResult<Value> {
        let mut value = self.send(method, arguments).await?;

        loop {
            let handle = match serde_json::from_value::<TaskHandle>(value.clone()) {
                Ok(handle) if handle.state == "running" => handle,
                _ => return Ok(value),
            };

            debug!("Waiting for agent task {}", handle.agent_task_id);
            tokio::time::sleep(self.poll_interval).await;
            value = self
                .send("get_task", vec![Value::String(handle.agent_task_id)])
                .await?;
        }
    }
}

fn ack(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn compile_package(&self, request: &CompilePackageRequest) -> RelprovResult<BlobRef> {
        let arguments = vec![
            Value::String(request.source.blob_id.clone()),
            Value::String(request.source.fingerprint.clone()),
            Value::String(request.name.clone()),
            Value::String(request.version.clone()),
            serde_json::to_value(&request.dependencies)?,
        ];

        let value = self.run_task("compile_package", arguments).await?;
        let compiled: CompileResult = serde_json::from_value(value).map_err(|e| {
            RelprovError::Transport(format!("compile_package: unexpected result: {}", e))
        })?;

        Ok(BlobRef::new(compiled.result.blobstore_id, compiled.result.sha1))
    }

    async fn stop(&self) -> RelprovResult<String> {
        self.run_task("stop", vec![]).await.map(ack)
    }

    async fn post_start(&self) -> RelprovResult<String> {
        self.run_task("run_script", vec![json!("post-start"), json!({})])
            .await
            .map(ack)
    }
}
