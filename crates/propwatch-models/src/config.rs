use serde::{Deserialize, Serialize};

/// Top-level configuration for propwatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PropwatchConfig {
    pub host: HostConfig,
    pub session: SessionConfig,
    pub agents: AgentsConfig,
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
    pub warehouse: WarehouseConfig,
    pub matching: MatchingConfig,
}

/// Connection and sampling settings for the reasoning-model host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    pub api_base: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// "low" or "high"; omitted from requests when unset.
    pub reasoning_effort: Option<String>,
    /// Host-side cap on remote tool turns per request.
    pub max_turns: Option<u32>,
    pub parallel_tool_calls: bool,
    pub request_timeout_seconds: u64,
    /// Attempts per host call before a transport failure propagates.
    pub transport_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.x.ai/v1".to_string(),
            model: "grok-4-1-fast-reasoning".to_string(),
            api_key_env: "XAI_API_KEY".to_string(),
            reasoning_effort: None,
            max_turns: Some(5),
            parallel_tool_calls: true,
            request_timeout_seconds: 120,
            transport_attempts: 3,
            backoff_base_ms: 2_000,
            backoff_max_ms: 10_000,
        }
    }
}

/// Limits for one multi-turn tool-calling exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Client-side cap on turns (each turn is one host call).
    pub max_turns: u32,
    /// Wall-clock budget over the whole exchange.
    pub timeout_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 8,
            timeout_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    /// Attempts per agent call, gated by the agent's validator.
    pub max_attempts: u32,
    pub research_lookback_days: u32,
    /// Selects the prompt set.
    pub sport: String,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            research_lookback_days: 7,
            sport: "soccer".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Attempts per fixture, on top of the per-agent attempts.
    pub fixture_attempts: u32,
    pub max_concurrent_fixtures: usize,
    /// Write every projection row, not only rows that carry an alert.
    pub push_all: bool,
    /// Only process fixtures in these leagues. Empty means all.
    pub leagues: Vec<String>,
    /// Only process these fixtures. Empty means all.
    pub fixtures: Vec<String>,
    /// Generate alerts but skip every write.
    pub dry_run: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fixture_attempts: 3,
            max_concurrent_fixtures: 1,
            push_all: true,
            leagues: Vec::new(),
            fixtures: Vec::new(),
            dry_run: false,
        }
    }
}

/// SQLite alert/roster store and the in-memory roster cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub sqlite_path: String,
    pub roster_cache_capacity: u64,
    pub roster_cache_ttl_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/propwatch.db".to_string(),
            roster_cache_capacity: 1_000,
            roster_cache_ttl_seconds: 300,
        }
    }
}

/// File-backed analytics warehouse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WarehouseConfig {
    pub dir: String,
    pub fixtures_file: String,
    pub projections_file: String,
    pub output_file: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            dir: "data/warehouse".to_string(),
            fixtures_file: "fixtures.json".to_string(),
            projections_file: "projections.json".to_string(),
            output_file: "enriched_projections.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatchingConfig {
    /// Similarity floor for player names.
    pub threshold: f64,
    /// Similarity floor when resolving team and league names for roster lookups.
    pub roster_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.80,
            roster_threshold: 0.75,
        }
    }
}
