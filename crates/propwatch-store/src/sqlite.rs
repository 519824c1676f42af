use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use propwatch_models::schema::{ALERTS_TABLE_DDL, FIXTURE_DATE_FORMAT, ROSTER_TABLE_DDL};
use propwatch_models::{AlertLevel, IdempotencyKey, PlayerAlert, RosterEntry, RunId, StoredAlert};
use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::{debug, info};

use crate::alerts::{latest_per_player, AlertStore};
use crate::error::StoreError;
use crate::roster::RosterSource;

const ALERT_COLUMNS: &str = "id, run_id, player_name, fixture, fixture_date, alert_level, \
     description, last_alert_update, acknowledged, active_projection, created_at";

/// SQLite-backed alert and roster store.
///
/// `rusqlite::Connection` is not `Sync`, so access goes through a `Mutex`.
/// Each public call holds the lock for one statement or one transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Raw column values, converted to a `StoredAlert` outside the row callback.
struct AlertRow {
    id: i64,
    run_id: String,
    player_name: String,
    fixture: String,
    fixture_date: String,
    alert_level: String,
    description: String,
    last_alert_update: String,
    acknowledged: bool,
    active: bool,
    created_at: String,
}

impl AlertRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            run_id: row.get(1)?,
            player_name: row.get(2)?,
            fixture: row.get(3)?,
            fixture_date: row.get(4)?,
            alert_level: row.get(5)?,
            description: row.get(6)?,
            last_alert_update: row.get(7)?,
            acknowledged: row.get(8)?,
            active: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_alert(self) -> Result<StoredAlert, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            table: "alerts",
            reason,
        };
        let level = self
            .alert_level
            .parse::<AlertLevel>()
            .map_err(|e| corrupt(e.to_string()))?;
        let fixture_datetime =
            NaiveDateTime::parse_from_str(&self.fixture_date, FIXTURE_DATE_FORMAT)
                .map_err(|e| corrupt(format!("fixture_date '{}': {e}", self.fixture_date)))?;
        Ok(StoredAlert {
            id: self.id,
            run_id: RunId::new(self.run_id),
            player_name: self.player_name,
            fixture: self.fixture,
            fixture_datetime,
            level,
            description: self.description,
            last_alert_update: parse_timestamp(&self.last_alert_update).map_err(corrupt)?,
            acknowledged: self.acknowledged,
            active: self.active,
            created_at: parse_timestamp(&self.created_at).map_err(corrupt)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("timestamp '{raw}': {e}"))
}

/// Fixed-width UTC timestamps so string order equals time order.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

impl SqliteStore {
    /// Open (creating if needed) the database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(ALERTS_TABLE_DDL)?;
        conn.execute_batch(ROSTER_TABLE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    fn query_alerts(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<StoredAlert>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, AlertRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    /// Replace a team's roster in one transaction. Used by the roster sync job and tests.
    pub fn replace_roster(
        &self,
        league: &str,
        team: &str,
        players: &[RosterEntry],
    ) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM rosters WHERE league = ?1 AND team = ?2",
            params![league, team],
        )?;
        let now = format_timestamp(Utc::now());
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO rosters (league, team, player_name, position, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for player in players {
                stmt.execute(params![league, team, player.player_name, player.position, now])?;
            }
        }
        tx.commit()?;
        debug!(league, team, players = players.len(), "Roster replaced");
        Ok(players.len())
    }

    fn distinct_strings(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[async_trait]
impl AlertStore for SqliteStore {
    async fn save(&self, alerts: &[PlayerAlert], run_id: &RunId) -> Result<usize, StoreError> {
        if alerts.is_empty() {
            return Ok(0);
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = format_timestamp(Utc::now());
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO alerts (run_id, player_name, fixture, fixture_date, alert_level, \
                 description, last_alert_update, acknowledged, active_projection, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 1, ?7)",
            )?;
            for alert in alerts {
                stmt.execute(params![
                    run_id.as_str(),
                    alert.player_name,
                    alert.fixture,
                    alert.fixture_datetime.format(FIXTURE_DATE_FORMAT).to_string(),
                    alert.level.as_str(),
                    alert.rationale,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        info!(run_id = %run_id, count = alerts.len(), "Saved alerts");
        Ok(alerts.len())
    }

    async fn get_by_fixture(&self, fixture: &str) -> Result<Vec<StoredAlert>, StoreError> {
        self.query_alerts(
            &format!(
                "SELECT {ALERT_COLUMNS} FROM alerts \
                 WHERE fixture = ?1 AND active_projection = 1 ORDER BY id"
            ),
            params![fixture],
        )
    }

    async fn get_latest_by_fixtures(
        &self,
        fixtures: &[String],
    ) -> Result<Vec<StoredAlert>, StoreError> {
        if fixtures.is_empty() {
            return Ok(Vec::new());
        }
        let columns = ALERT_COLUMNS
            .split(", ")
            .map(|c| format!("a.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {columns} FROM alerts a \
             JOIN (SELECT player_name, fixture, MAX(created_at) AS max_created FROM alerts \
                   WHERE fixture IN ({}) AND active_projection = 1 \
                   GROUP BY player_name, fixture) l \
             ON a.player_name = l.player_name AND a.fixture = l.fixture \
                AND a.created_at = l.max_created \
             WHERE a.active_projection = 1 ORDER BY a.fixture, a.id",
            placeholders(fixtures.len())
        );
        let rows = self.query_alerts(&sql, params_from_iter(fixtures.iter()))?;
        Ok(latest_per_player(rows))
    }

    async fn exists_for_fixture(&self, fixture: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM alerts WHERE fixture = ?1 AND active_projection = 1)",
            params![fixture],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    async fn deactivate_for_fixture(&self, fixture: &str) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE alerts SET active_projection = 0, last_alert_update = ?2 \
             WHERE fixture = ?1 AND active_projection = 1",
            params![fixture, format_timestamp(Utc::now())],
        )?;
        info!(fixture, changed, "Deactivated fixture alerts");
        Ok(changed)
    }

    async fn get_by_run(&self, run_id: &RunId) -> Result<Vec<StoredAlert>, StoreError> {
        self.query_alerts(
            &format!(
                "SELECT {ALERT_COLUMNS} FROM alerts WHERE run_id = ?1 ORDER BY created_at, id"
            ),
            params![run_id.as_str()],
        )
    }

    async fn exists_for_key(&self, key: &IdempotencyKey) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM alerts WHERE run_id = ?1 AND fixture = ?2)",
            params![key.run_id.as_str(), key.fixture],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    async fn get_by_key(&self, key: &IdempotencyKey) -> Result<Vec<StoredAlert>, StoreError> {
        self.query_alerts(
            &format!(
                "SELECT {ALERT_COLUMNS} FROM alerts WHERE run_id = ?1 AND fixture = ?2 ORDER BY id"
            ),
            params![key.run_id.as_str(), key.fixture],
        )
    }
}

#[async_trait]
impl RosterSource for SqliteStore {
    async fn leagues(&self) -> Result<Vec<String>, StoreError> {
        self.distinct_strings(
            "SELECT DISTINCT league FROM rosters ORDER BY league",
            [],
        )
    }

    async fn teams_in_league(&self, league: &str) -> Result<Vec<String>, StoreError> {
        self.distinct_strings(
            "SELECT DISTINCT team FROM rosters WHERE league = ?1 ORDER BY team",
            params![league],
        )
    }

    async fn active_roster(
        &self,
        league: &str,
        team: &str,
    ) -> Result<Vec<RosterEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT player_name, position FROM rosters \
             WHERE league = ?1 AND team = ?2 ORDER BY player_name",
        )?;
        let rows = stmt
            .query_map(params![league, team], |row| {
                Ok(RosterEntry {
                    player_name: row.get(0)?,
                    position: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::tests::{alert, check_store_contract};

    fn entry(name: &str, position: &str) -> RosterEntry {
        RosterEntry {
            player_name: name.to_string(),
            position: Some(position.to_string()),
        }
    }

    #[tokio::test]
    async fn sqlite_store_contract() {
        let store = SqliteStore::open_in_memory().unwrap();
        check_store_contract(&store).await;
    }

    #[tokio::test]
    async fn alert_roundtrip_preserves_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let run = RunId::new("2025_12_13_091500");
        let original = alert("Martin Ødegaard", "Arsenal vs Brentford", AlertLevel::Medium);
        store.save(&[original.clone()], &run).await.unwrap();

        let rows = store.get_by_run(&run).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.player_name, original.player_name);
        assert_eq!(row.fixture_datetime, original.fixture_datetime);
        assert_eq!(row.level, AlertLevel::Medium);
        assert_eq!(row.description, original.rationale);
        assert_eq!(row.created_at, row.last_alert_update);
    }

    #[tokio::test]
    async fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("alerts.db");
        let run = RunId::new("r1");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .save(&[alert("Saka", "Arsenal vs Brentford", AlertLevel::Low)], &run)
                .await
                .unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert!(reopened
            .exists_for_key(&IdempotencyKey::new(&run, "Arsenal vs Brentford"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn roster_tables() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .replace_roster(
                "Premier League",
                "Arsenal",
                &[entry("Bukayo Saka", "RW"), entry("Viktor Gyökeres", "CF")],
            )
            .unwrap();
        store
            .replace_roster("Premier League", "Brentford", &[entry("Igor Thiago", "CF")])
            .unwrap();
        store
            .replace_roster("La Liga", "Real Madrid", &[entry("Kylian Mbappé", "CF")])
            .unwrap();

        assert_eq!(store.leagues().await.unwrap(), vec!["La Liga", "Premier League"]);
        assert_eq!(
            store.teams_in_league("Premier League").await.unwrap(),
            vec!["Arsenal", "Brentford"]
        );
        let roster = store.active_roster("Premier League", "Arsenal").await.unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].player_name, "Bukayo Saka");

        // replacing drops players who left
        store
            .replace_roster("Premier League", "Arsenal", &[entry("Bukayo Saka", "RW")])
            .unwrap();
        assert_eq!(
            store.active_roster("Premier League", "Arsenal").await.unwrap().len(),
            1
        );
        assert!(store.active_roster("Premier League", "Chelsea").await.unwrap().is_empty());
    }
}
