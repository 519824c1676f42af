//! Multi-turn tool-calling exchange with a model host.
//!
//! Each turn submits the whole conversation. Remote tool requests are only
//! counted; local ones are executed through the bound [`ToolRegistry`] and
//! their results appended before the next turn. The exchange ends on the
//! first turn without local requests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use propwatch_models::{AgentUsage, SessionConfig, TokenUsage, ToolCallCounts, TurnToolCalls};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AgentError;
use crate::host::{HostRequest, Message, ModelHost, RemoteTool, SamplingConfig, ToolKind};
use crate::tools::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Host calls allowed in one exchange.
    pub max_turns: u32,
    /// Wall-clock budget for [`ToolCallingSession::run_with_deadline`].
    pub timeout: Duration,
}

impl From<&SessionConfig> for SessionLimits {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_turns: config.max_turns.max(1),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

/// Result of one exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOutcome {
    /// Text of the last turn.
    pub text: String,
    /// Deduplicated, in first-seen order.
    pub citations: Vec<String>,
    pub usage: TokenUsage,
    pub tool_calls: TurnToolCalls,
    pub turns: u32,
    /// The wall-clock budget ran out. Nothing else in the outcome is usable.
    pub timed_out: bool,
    /// The model still wanted local tools when the turn cap was hit.
    pub turn_limit_reached: bool,
}

impl SessionOutcome {
    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }

    /// Usage record for an agent that started this exchange at `started`.
    pub fn agent_usage(&self, agent: &str, started: Instant) -> AgentUsage {
        AgentUsage {
            agent: agent.to_string(),
            tokens: self.usage,
            turns: self.turns,
            tool_calls: self.tool_calls.clone(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        }
    }
}

/// Drives exchanges against one host with a fixed tool set.
///
/// Holds no conversation state; concurrent exchanges share only the
/// read-only tool bindings.
#[derive(Clone)]
pub struct ToolCallingSession {
    host: Arc<dyn ModelHost>,
    remote_tools: Vec<RemoteTool>,
    local_tools: Arc<ToolRegistry>,
    sampling: SamplingConfig,
    limits: SessionLimits,
}

impl ToolCallingSession {
    pub fn new(host: Arc<dyn ModelHost>, sampling: SamplingConfig, limits: SessionLimits) -> Self {
        Self {
            host,
            remote_tools: Vec::new(),
            local_tools: Arc::new(ToolRegistry::new()),
            sampling,
            limits,
        }
    }

    pub fn with_remote_tools(mut self, tools: Vec<RemoteTool>) -> Self {
        self.remote_tools = tools;
        self
    }

    pub fn with_local_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.local_tools = tools;
        self
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    /// Run the exchange to completion. Host errors propagate.
    pub async fn run(&self, messages: Vec<Message>) -> Result<SessionOutcome, AgentError> {
        let mut conversation = messages;
        let mut outcome = SessionOutcome::default();
        let local_descriptors = self.local_tools.descriptors();

        loop {
            if outcome.turns >= self.limits.max_turns {
                warn!(
                    host = %self.host.name(),
                    max_turns = self.limits.max_turns,
                    "Turn cap reached with tool calls still pending"
                );
                outcome.turn_limit_reached = true;
                break;
            }

            let request = HostRequest {
                messages: conversation.clone(),
                remote_tools: self.remote_tools.clone(),
                local_tools: local_descriptors.clone(),
                sampling: self.sampling.clone(),
            };
            let response = self.host.respond(&request).await?;
            outcome.turns += 1;
            let turn = outcome.turns;

            outcome.usage += response.usage;
            for citation in response.citations {
                if !outcome.citations.contains(&citation) {
                    outcome.citations.push(citation);
                }
            }

            let mut counts = ToolCallCounts::default();
            let mut local = Vec::new();
            for call in response.tool_requests {
                match call.kind {
                    ToolKind::Remote => counts.remote += 1,
                    ToolKind::Local => {
                        counts.local += 1;
                        local.push(call);
                    }
                }
            }
            outcome.tool_calls.insert(turn, counts);
            debug!(
                turn,
                remote = counts.remote,
                local = counts.local,
                tokens = response.usage.total_tokens,
                "Session turn complete"
            );
            outcome.text = response.text;

            if local.is_empty() {
                break;
            }

            let mut executed = Vec::with_capacity(local.len());
            let mut results = Vec::with_capacity(local.len());
            for mut call in local {
                let Some(tool) = self.local_tools.get(&call.name) else {
                    warn!(tool = %call.name, turn, "Model requested an unbound tool, skipping");
                    continue;
                };
                if call.id.is_empty() {
                    call.id = format!("call_{}", Uuid::new_v4().simple());
                }
                let result = tool.execute(&call.arguments).await;
                debug!(tool = %call.name, turn, bytes = result.len(), "Local tool executed");
                results.push(Message::tool_result(call.id.clone(), result));
                executed.push(call);
            }
            conversation.push(Message::assistant(outcome.text.clone(), executed));
            conversation.extend(results);
        }

        Ok(outcome)
    }

    /// [`run`](Self::run) under the wall-clock budget. Expiry is returned as
    /// [`SessionOutcome::timed_out`], not as an error.
    pub async fn run_with_deadline(
        &self,
        messages: Vec<Message>,
    ) -> Result<SessionOutcome, AgentError> {
        match tokio::time::timeout(self.limits.timeout, self.run(messages)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    host = %self.host.name(),
                    timeout_s = self.limits.timeout.as_secs(),
                    "Session timed out"
                );
                Ok(SessionOutcome::timed_out())
            }
        }
    }

    /// Blocking form of [`run_with_deadline`](Self::run_with_deadline).
    ///
    /// Must not be called from inside an async runtime.
    pub fn run_blocking(&self, messages: Vec<Message>) -> Result<SessionOutcome, AgentError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run_with_deadline(messages))
    }
}
