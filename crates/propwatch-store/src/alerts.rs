use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use propwatch_models::{IdempotencyKey, PlayerAlert, RunId, StoredAlert};

use crate::error::StoreError;

/// Persistent store for player alerts.
///
/// Every method is one bounded operation; a failed call leaves no partial
/// multi-row change behind.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Persist a batch under `run_id`. Returns the number of rows written.
    async fn save(&self, alerts: &[PlayerAlert], run_id: &RunId) -> Result<usize, StoreError>;

    /// Active alerts for a fixture, oldest first.
    async fn get_by_fixture(&self, fixture: &str) -> Result<Vec<StoredAlert>, StoreError>;

    /// Most recent active alert per (player, fixture) across `fixtures`.
    ///
    /// Later writes are assumed to supersede earlier ones. Two runs writing
    /// the same player concurrently are not reconciled.
    async fn get_latest_by_fixtures(
        &self,
        fixtures: &[String],
    ) -> Result<Vec<StoredAlert>, StoreError>;

    async fn exists_for_fixture(&self, fixture: &str) -> Result<bool, StoreError>;

    /// Mark every active alert for the fixture inactive. Returns the number changed.
    async fn deactivate_for_fixture(&self, fixture: &str) -> Result<usize, StoreError>;

    async fn get_by_run(&self, run_id: &RunId) -> Result<Vec<StoredAlert>, StoreError>;

    async fn exists_for_key(&self, key: &IdempotencyKey) -> Result<bool, StoreError> {
        Ok(!self.get_by_key(key).await?.is_empty())
    }

    /// Alerts one fixture produced within one run.
    async fn get_by_key(&self, key: &IdempotencyKey) -> Result<Vec<StoredAlert>, StoreError>;
}

/// Keep the latest alert per (player, fixture); ties keep the higher id.
pub(crate) fn latest_per_player(alerts: Vec<StoredAlert>) -> Vec<StoredAlert> {
    let mut latest: HashMap<(String, String), StoredAlert> = HashMap::new();
    for alert in alerts {
        let key = (alert.player_name.clone(), alert.fixture.clone());
        match latest.get(&key) {
            Some(existing)
                if (existing.created_at, existing.id) >= (alert.created_at, alert.id) => {}
            _ => {
                latest.insert(key, alert);
            }
        }
    }
    let mut out: Vec<StoredAlert> = latest.into_values().collect();
    out.sort_by(|a, b| a.fixture.cmp(&b.fixture).then(a.id.cmp(&b.id)));
    out
}

/// Alert store held in process memory. Used for dry runs and tests.
#[derive(Default)]
pub struct MemoryAlertStore {
    rows: Mutex<Vec<StoredAlert>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_rows<T>(
        &self,
        f: impl FnOnce(&mut Vec<StoredAlert>) -> T,
    ) -> Result<T, StoreError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("alert mutex poisoned: {e}")))?;
        Ok(f(&mut rows))
    }

    fn select(
        &self,
        pred: impl Fn(&StoredAlert) -> bool,
    ) -> Result<Vec<StoredAlert>, StoreError> {
        self.with_rows(|rows| rows.iter().filter(|a| pred(a)).cloned().collect())
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn save(&self, alerts: &[PlayerAlert], run_id: &RunId) -> Result<usize, StoreError> {
        self.with_rows(|rows| {
            let now = Utc::now();
            for alert in alerts {
                let id = rows.len() as i64 + 1;
                rows.push(StoredAlert {
                    id,
                    run_id: run_id.clone(),
                    player_name: alert.player_name.clone(),
                    fixture: alert.fixture.clone(),
                    fixture_datetime: alert.fixture_datetime,
                    level: alert.level,
                    description: alert.rationale.clone(),
                    last_alert_update: now,
                    acknowledged: false,
                    active: true,
                    created_at: now,
                });
            }
            alerts.len()
        })
    }

    async fn get_by_fixture(&self, fixture: &str) -> Result<Vec<StoredAlert>, StoreError> {
        self.select(|a| a.active && a.fixture == fixture)
    }

    async fn get_latest_by_fixtures(
        &self,
        fixtures: &[String],
    ) -> Result<Vec<StoredAlert>, StoreError> {
        let rows = self.select(|a| a.active && fixtures.iter().any(|f| f == &a.fixture))?;
        Ok(latest_per_player(rows))
    }

    async fn exists_for_fixture(&self, fixture: &str) -> Result<bool, StoreError> {
        self.with_rows(|rows| rows.iter().any(|a| a.active && a.fixture == fixture))
    }

    async fn deactivate_for_fixture(&self, fixture: &str) -> Result<usize, StoreError> {
        self.with_rows(|rows| {
            let mut changed = 0;
            for alert in rows.iter_mut().filter(|a| a.active && a.fixture == fixture) {
                alert.active = false;
                changed += 1;
            }
            changed
        })
    }

    async fn get_by_run(&self, run_id: &RunId) -> Result<Vec<StoredAlert>, StoreError> {
        self.select(|a| &a.run_id == run_id)
    }

    async fn get_by_key(&self, key: &IdempotencyKey) -> Result<Vec<StoredAlert>, StoreError> {
        self.select(|a| a.run_id == key.run_id && a.fixture == key.fixture)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use propwatch_models::AlertLevel;

    pub(crate) fn kickoff() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2025, 12, 13)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    }

    pub(crate) fn alert(player: &str, fixture: &str, level: AlertLevel) -> PlayerAlert {
        PlayerAlert {
            player_name: player.to_string(),
            fixture: fixture.to_string(),
            fixture_datetime: kickoff(),
            level,
            rationale: format!("{player} is doubtful."),
        }
    }

    /// Exercises the contract shared by every backend.
    pub(crate) async fn check_store_contract(store: &dyn AlertStore) {
        let run1 = RunId::new("2025_12_12_080000");
        let run2 = RunId::new("2025_12_13_080000");
        let fixture = "Arsenal vs Brentford";

        let saved = store
            .save(
                &[
                    alert("Viktor Gyökeres", fixture, AlertLevel::High),
                    alert("Ben White", fixture, AlertLevel::Low),
                ],
                &run1,
            )
            .await
            .unwrap();
        assert_eq!(saved, 2);
        assert_eq!(store.save(&[], &run1).await.unwrap(), 0);

        let key1 = IdempotencyKey::new(&run1, fixture);
        let key2 = IdempotencyKey::new(&run2, fixture);
        assert!(store.exists_for_key(&key1).await.unwrap());
        assert!(!store.exists_for_key(&key2).await.unwrap());
        assert!(store.exists_for_fixture(fixture).await.unwrap());
        assert!(!store.exists_for_fixture("Chelsea vs Everton").await.unwrap());

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .save(&[alert("Viktor Gyökeres", fixture, AlertLevel::Medium)], &run2)
            .await
            .unwrap();

        assert_eq!(store.get_by_fixture(fixture).await.unwrap().len(), 3);
        assert_eq!(store.get_by_run(&run2).await.unwrap().len(), 1);
        assert_eq!(store.get_by_key(&key1).await.unwrap().len(), 2);

        let latest = store
            .get_latest_by_fixtures(&[fixture.to_string()])
            .await
            .unwrap();
        assert_eq!(latest.len(), 2);
        let gyokeres = latest
            .iter()
            .find(|a| a.player_name == "Viktor Gyökeres")
            .unwrap();
        assert_eq!(gyokeres.level, AlertLevel::Medium);
        assert_eq!(gyokeres.run_id, run2);
        assert!(gyokeres.active);
        assert!(!gyokeres.acknowledged);

        assert_eq!(store.deactivate_for_fixture(fixture).await.unwrap(), 3);
        assert!(!store.exists_for_fixture(fixture).await.unwrap());
        assert!(store.get_by_fixture(fixture).await.unwrap().is_empty());
        assert!(store
            .get_latest_by_fixtures(&[fixture.to_string()])
            .await
            .unwrap()
            .is_empty());
        // run lookups still see inactive rows
        assert_eq!(store.get_by_run(&run1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn memory_store_contract() {
        let store = MemoryAlertStore::new();
        check_store_contract(&store).await;
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn latest_breaks_ties_by_id() {
        let now = Utc::now();
        let make = |id: i64| StoredAlert {
            id,
            run_id: RunId::new("r"),
            player_name: "Saka".into(),
            fixture: "Arsenal vs Brentford".into(),
            fixture_datetime: kickoff(),
            level: AlertLevel::Low,
            description: String::new(),
            last_alert_update: now,
            acknowledged: false,
            active: true,
            created_at: now,
        };
        let latest = latest_per_player(vec![make(2), make(5), make(3)]);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, 5);
    }
}
