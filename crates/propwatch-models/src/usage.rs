use std::collections::BTreeMap;
use std::ops::AddAssign;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token counters reported by the model host.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub reasoning_tokens: u64,
    pub total_tokens: u64,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.reasoning_tokens += rhs.reasoning_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

/// Tool invocations requested in a single turn, split by where they ran.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallCounts {
    /// Executed by the host (web/X search).
    pub remote: u32,
    /// Executed by us through a bound local tool.
    pub local: u32,
}

impl AddAssign for ToolCallCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.remote += rhs.remote;
        self.local += rhs.local;
    }
}

/// Turn index (1-based) to tool-call counts for that turn.
pub type TurnToolCalls = BTreeMap<u32, ToolCallCounts>;

/// Usage recorded for one successful agent call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentUsage {
    /// Display label, e.g. "Research Agent (Arsenal)".
    pub agent: String,
    pub tokens: TokenUsage,
    pub turns: u32,
    pub tool_calls: TurnToolCalls,
    pub elapsed_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl AgentUsage {
    pub fn tool_call_totals(&self) -> ToolCallCounts {
        let mut totals = ToolCallCounts::default();
        for counts in self.tool_calls.values() {
            totals += *counts;
        }
        totals
    }
}

/// Usage aggregated over every agent call of one fixture run.
///
/// Kept in memory only; flushed to the log when the fixture completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureUsage {
    pub fixture: String,
    pub match_time: NaiveDateTime,
    pub started_at: DateTime<Utc>,
    pub agent_usages: Vec<AgentUsage>,
}

impl FixtureUsage {
    pub fn new(fixture: impl Into<String>, match_time: NaiveDateTime) -> Self {
        Self {
            fixture: fixture.into(),
            match_time,
            started_at: Utc::now(),
            agent_usages: Vec::new(),
        }
    }

    pub fn record(&mut self, usage: AgentUsage) {
        self.agent_usages.push(usage);
    }

    pub fn total_tokens(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for usage in &self.agent_usages {
            total += usage.tokens;
        }
        total
    }

    pub fn total_tool_calls(&self) -> ToolCallCounts {
        let mut total = ToolCallCounts::default();
        for usage in &self.agent_usages {
            total += usage.tool_call_totals();
        }
        total
    }
}
