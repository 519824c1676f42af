use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Model host transport error: {0}")]
    Transport(String),

    #[error("Model host returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("Prompt rendering error: {0}")]
    Prompt(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("{agent} failed: max attempts ({attempts}) exhausted. Last error: {last_error}")]
    Exhausted {
        agent: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Run interrupted")]
    Interrupted,

    #[error("Invalid fixture: {0}")]
    InvalidFixture(#[from] propwatch_models::FixtureError),

    #[error("Store error: {0}")]
    Store(#[from] propwatch_store::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl AgentError {
    /// Deliberate operator abort. Never retried.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, AgentError::Interrupted)
    }

    /// Failures worth retrying at the transport layer.
    pub fn is_transport(&self) -> bool {
        match self {
            AgentError::Transport(_) => true,
            AgentError::Http { status, .. } => *status == 429 || *status >= 500 || *status == 401,
            _ => false,
        }
    }
}
