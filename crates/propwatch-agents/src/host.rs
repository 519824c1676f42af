use std::time::Duration;

use async_trait::async_trait;
use propwatch_models::{HostConfig, TokenUsage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::AgentError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Local tool calls the assistant made on this turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolRequest>,
    /// Set on tool results: the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolRequest>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// Where a requested tool runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Executed by the host; recorded for telemetry only.
    Remote,
    /// Executed by the caller; the result goes back into the conversation.
    Local,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub kind: ToolKind,
}

/// Search capabilities the host runs itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RemoteTool {
    WebSearch,
    XSearch,
}

impl RemoteTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteTool::WebSearch => "web_search",
            RemoteTool::XSearch => "x_search",
        }
    }
}

/// Schema of a caller-executed tool, as advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SamplingConfig {
    pub reasoning_effort: Option<String>,
    /// Host-side cap on tool turns within one request.
    pub max_turns: Option<u32>,
    pub parallel_tool_calls: bool,
}

impl From<&HostConfig> for SamplingConfig {
    fn from(config: &HostConfig) -> Self {
        Self {
            reasoning_effort: config.reasoning_effort.clone(),
            max_turns: config.max_turns,
            parallel_tool_calls: config.parallel_tool_calls,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostRequest {
    pub messages: Vec<Message>,
    pub remote_tools: Vec<RemoteTool>,
    pub local_tools: Vec<ToolDescriptor>,
    pub sampling: SamplingConfig,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostResponse {
    pub text: String,
    pub citations: Vec<String>,
    pub usage: TokenUsage,
    pub tool_requests: Vec<ToolRequest>,
}

/// A hosted reasoning model. One call is one turn.
#[async_trait]
pub trait ModelHost: Send + Sync {
    fn name(&self) -> &str;

    async fn respond(&self, request: &HostRequest) -> Result<HostResponse, AgentError>;
}

/// Retries transport failures of the wrapped host with exponential backoff.
pub struct RetryingHost<H> {
    inner: H,
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl<H: ModelHost> RetryingHost<H> {
    pub fn new(inner: H, attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(inner: H, config: &HostConfig) -> Self {
        Self::new(
            inner,
            config.transport_attempts,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }
}

fn calculate_backoff(current: Duration, factor: u32, max: Duration) -> Duration {
    std::cmp::min(current.saturating_mul(factor), max)
}

#[async_trait]
impl<H: ModelHost> ModelHost for RetryingHost<H> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn respond(&self, request: &HostRequest) -> Result<HostResponse, AgentError> {
        let mut delay = std::cmp::min(self.base_delay, self.max_delay);
        let mut attempt = 1;
        loop {
            match self.inner.respond(request).await {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_transport() => return Err(e),
                Err(e) if attempt >= self.attempts => {
                    return Err(AgentError::Transport(format!(
                        "{} unreachable after {attempt} attempts: {e}",
                        self.inner.name()
                    )));
                }
                Err(e) => {
                    warn!(
                        host = %self.inner.name(),
                        attempt,
                        max_attempts = self.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Host call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay = calculate_backoff(delay, 2, self.max_delay);
                    attempt += 1;
                }
            }
        }
    }
}
