use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::run::RunId;

/// Severity of an availability alert. Ordered: higher is more actionable.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    #[default]
    NoAlert,
    Low,
    Medium,
    High,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::NoAlert => "no_alert",
            AlertLevel::Low => "low",
            AlertLevel::Medium => "medium",
            AlertLevel::High => "high",
        }
    }

    pub fn is_alert(&self) -> bool {
        *self != AlertLevel::NoAlert
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAlertLevel(pub String);

impl fmt::Display for UnknownAlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown alert level '{}'", self.0)
    }
}

impl std::error::Error for UnknownAlertLevel {}

impl FromStr for AlertLevel {
    type Err = UnknownAlertLevel;

    /// Case-insensitive; accepts "no alert" and "none" for [`AlertLevel::NoAlert`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(' ', "_").as_str() {
            "high" => Ok(AlertLevel::High),
            "medium" => Ok(AlertLevel::Medium),
            "low" => Ok(AlertLevel::Low),
            "no_alert" | "none" => Ok(AlertLevel::NoAlert),
            _ => Err(UnknownAlertLevel(s.to_string())),
        }
    }
}

/// An alert produced by the assessor for one player in one fixture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerAlert {
    pub player_name: String,
    pub fixture: String,
    pub fixture_datetime: NaiveDateTime,
    pub level: AlertLevel,
    /// One sentence.
    pub rationale: String,
}

/// A persisted alert row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredAlert {
    pub id: i64,
    pub run_id: RunId,
    pub player_name: String,
    pub fixture: String,
    pub fixture_datetime: NaiveDateTime,
    pub level: AlertLevel,
    pub description: String,
    pub last_alert_update: DateTime<Utc>,
    pub acknowledged: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl StoredAlert {
    /// The alert as the assessor produced it, without storage metadata.
    pub fn to_player_alert(&self) -> PlayerAlert {
        PlayerAlert {
            player_name: self.player_name.clone(),
            fixture: self.fixture.clone(),
            fixture_datetime: self.fixture_datetime,
            level: self.level,
            rationale: self.description.clone(),
        }
    }
}

/// Where an [`AlertCandidate`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOrigin {
    /// Generated in this process and not read back from the store.
    Generated,
    Stored { id: i64, run_id: RunId },
}

/// The one alert shape the reconciler consumes, whichever producer built it.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub player_name: String,
    pub fixture: String,
    pub level: AlertLevel,
    pub description: String,
    pub origin: AlertOrigin,
}

impl AlertCandidate {
    pub fn from_player_alert(alert: &PlayerAlert) -> Self {
        Self {
            player_name: alert.player_name.clone(),
            fixture: alert.fixture.clone(),
            level: alert.level,
            description: alert.rationale.clone(),
            origin: AlertOrigin::Generated,
        }
    }

    pub fn from_stored(alert: &StoredAlert) -> Self {
        Self {
            player_name: alert.player_name.clone(),
            fixture: alert.fixture.clone(),
            level: alert.level,
            description: alert.description.clone(),
            origin: AlertOrigin::Stored {
                id: alert.id,
                run_id: alert.run_id.clone(),
            },
        }
    }
}

impl From<&PlayerAlert> for AlertCandidate {
    fn from(alert: &PlayerAlert) -> Self {
        Self::from_player_alert(alert)
    }
}

impl From<&StoredAlert> for AlertCandidate {
    fn from(alert: &StoredAlert) -> Self {
        Self::from_stored(alert)
    }
}

/// Identifies the alerts one fixture produced within one run.
/// Checked before any retry that could repeat the save.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub run_id: RunId,
    pub fixture: String,
}

impl IdempotencyKey {
    pub fn new(run_id: &RunId, fixture: impl Into<String>) -> Self {
        Self {
            run_id: run_id.clone(),
            fixture: fixture.into(),
        }
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.run_id, self.fixture)
    }
}
