use serde::{Deserialize, Serialize};

/// Alert table written by the pipeline and read by enrichment and the dashboard.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS alerts (
///     id                 INTEGER PRIMARY KEY AUTOINCREMENT,
///     run_id             TEXT NOT NULL,
///     player_name        TEXT NOT NULL,
///     fixture            TEXT NOT NULL,
///     fixture_date       TEXT NOT NULL,
///     alert_level        TEXT NOT NULL,
///     description        TEXT NOT NULL,
///     last_alert_update  TEXT NOT NULL,
///     acknowledged       INTEGER NOT NULL DEFAULT 0,
///     active_projection  INTEGER NOT NULL DEFAULT 1,
///     created_at         TEXT NOT NULL
/// );
/// ```
///
/// Timestamps are RFC 3339 strings; `fixture_date` is the naive kickoff time
/// in `%Y-%m-%dT%H:%M:%S`.
pub const ALERTS_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS alerts (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id             TEXT NOT NULL,
    player_name        TEXT NOT NULL,
    fixture            TEXT NOT NULL,
    fixture_date       TEXT NOT NULL,
    alert_level        TEXT NOT NULL,
    description        TEXT NOT NULL,
    last_alert_update  TEXT NOT NULL,
    acknowledged       INTEGER NOT NULL DEFAULT 0,
    active_projection  INTEGER NOT NULL DEFAULT 1,
    created_at         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_fixture ON alerts(fixture);
CREATE INDEX IF NOT EXISTS idx_alerts_run ON alerts(run_id, fixture);
";

/// Roster table populated by the roster sync job and read by the roster tool.
pub const ROSTER_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS rosters (
    league       TEXT NOT NULL,
    team         TEXT NOT NULL,
    player_name  TEXT NOT NULL,
    position     TEXT,
    updated_at   TEXT NOT NULL,
    PRIMARY KEY (league, team, player_name)
);
CREATE INDEX IF NOT EXISTS idx_rosters_team ON rosters(team);
";

/// Format of `alerts.fixture_date`.
pub const FIXTURE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Keys for the in-memory roster cache.
pub mod key_patterns {
    pub fn roster(league: &str, team: &str) -> String {
        format!("roster:{league}:{team}")
    }

    pub fn teams(league: &str) -> String {
        format!("teams:{league}")
    }

    pub fn leagues() -> String {
        "leagues".to_string()
    }
}

/// One player on a team's current roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RosterEntry {
    pub player_name: String,
    pub position: Option<String>,
}
