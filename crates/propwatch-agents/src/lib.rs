pub mod analyst;
pub mod error;
pub mod host;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod research;
pub mod session;
pub mod shark;
pub mod tools;
pub mod xai;

pub mod test_support;

pub use analyst::{AnalystAgent, TeamAnalyst};
pub use error::AgentError;
pub use host::{
    HostRequest, HostResponse, Message, ModelHost, RemoteTool, RetryingHost, Role,
    SamplingConfig, ToolDescriptor, ToolKind, ToolRequest,
};
pub use orchestrator::{run_agent_with_retry, AgentPipeline, AlertGenerator, PipelineOutput};
pub use prompts::{sport_prompts, AgentPrompt, SportPrompts};
pub use research::{ResearchAgent, TeamResearcher};
pub use session::{SessionLimits, SessionOutcome, ToolCallingSession};
pub use shark::{FixtureAssessor, SharkAgent};
pub use tools::{LocalTool, RosterTool, ToolRegistry, ROSTER_TOOL_NAME};
pub use xai::XaiHost;
