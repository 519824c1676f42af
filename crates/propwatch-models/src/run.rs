use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Identifier of one pipeline run, e.g. `2025_12_13_091500`.
///
/// Written once when the run starts. Alerts are tagged with it so a retried
/// fixture can find what an earlier attempt of the same run already saved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_time(at: DateTime<Local>) -> Self {
        Self(at.format("%Y_%m_%d_%H%M%S").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-wide context for a run, constructed once at startup and handed to
/// every component that needs the run id or the interrupt signal.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: RunId,
    started_at: DateTime<Utc>,
    interrupt: CancellationToken,
}

impl RunContext {
    pub fn start() -> Self {
        Self::with_run_id(RunId::from_time(Local::now()))
    }

    pub fn with_run_id(run_id: RunId) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            interrupt: CancellationToken::new(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Token that fires when the operator aborts the run.
    pub fn interrupt_token(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    pub fn interrupt(&self) {
        self.interrupt.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }
}
