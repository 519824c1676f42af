use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::alert::AlertLevel;

/// A per-player, per-fixture forecast row from the warehouse.
///
/// Only the two join columns are typed; everything else is passed through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectionRow {
    pub player_name: String,
    pub fixture: String,
    #[serde(flatten)]
    pub columns: Map<String, Value>,
}

impl ProjectionRow {
    pub fn new(player_name: impl Into<String>, fixture: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            fixture: fixture.into(),
            columns: Map::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(name.into(), value.into());
        self
    }
}

/// A projection row with alert columns attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedRow {
    #[serde(flatten)]
    pub row: ProjectionRow,
    pub alert_level: AlertLevel,
    pub alert_description: Option<String>,
    /// Stamped when the row is written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enriched_at: Option<DateTime<Utc>>,
}

impl EnrichedRow {
    pub fn unalerted(row: ProjectionRow) -> Self {
        Self {
            row,
            alert_level: AlertLevel::NoAlert,
            alert_description: None,
            enriched_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    Overwrite,
    Append,
}
