pub mod agent_output;
pub mod alert;
pub mod config;
pub mod fixture;
pub mod matching;
pub mod projection;
pub mod run;
pub mod schema;
pub mod usage;

pub use agent_output::{
    FixtureAssessment, ManagerComment, ParseQuality, PlayerStatus, ResearchFindings,
    ResearchReport, Speculation, TeamAnalysis, TeamReport,
};
pub use alert::{AlertCandidate, AlertLevel, AlertOrigin, IdempotencyKey, PlayerAlert, StoredAlert};
pub use config::{
    AgentsConfig, HostConfig, MatchingConfig, PipelineConfig, PropwatchConfig, SessionConfig,
    StoreConfig, WarehouseConfig,
};
pub use fixture::{split_fixture, Fixture, FixtureError, TeamContext};
pub use matching::{normalize_name, IdentityMatcher};
pub use projection::{EnrichedRow, ProjectionRow, WriteMode};
pub use run::{RunContext, RunId};
pub use schema::RosterEntry;
pub use usage::{AgentUsage, FixtureUsage, TokenUsage, ToolCallCounts, TurnToolCalls};
