use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use propwatch_models::schema::key_patterns;
use propwatch_models::RosterEntry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::StoreError;
use crate::memory::MemoryCache;

/// Read access to the synced team rosters.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn leagues(&self) -> Result<Vec<String>, StoreError>;

    async fn teams_in_league(&self, league: &str) -> Result<Vec<String>, StoreError>;

    /// Current players for an exact (league, team) pair. Empty when unknown.
    async fn active_roster(&self, league: &str, team: &str)
        -> Result<Vec<RosterEntry>, StoreError>;
}

/// Read-through cache: checks moka (hot), then the backing source.
///
/// Hits from the backing source are promoted so repeated lookups during a
/// run (both teams' research agents, retries) stay off SQLite.
pub struct CachedRosterSource {
    memory: MemoryCache,
    inner: Arc<dyn RosterSource>,
}

impl CachedRosterSource {
    pub fn new(inner: Arc<dyn RosterSource>, max_capacity: u64, ttl: Duration) -> Self {
        Self {
            memory: MemoryCache::new(max_capacity, ttl),
            inner,
        }
    }

    async fn cached<T, F>(&self, key: String, load: F) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        if let Some(json) = self.memory.get(&key).await {
            return Ok(serde_json::from_str(&json)?);
        }
        let value = load.await?;
        debug!(key = %key, "Roster cache miss");
        self.memory.insert(key, serde_json::to_string(&value)?).await;
        Ok(value)
    }

    pub fn hot_cache_size(&self) -> u64 {
        self.memory.entry_count()
    }
}

#[async_trait]
impl RosterSource for CachedRosterSource {
    async fn leagues(&self) -> Result<Vec<String>, StoreError> {
        self.cached(key_patterns::leagues(), self.inner.leagues()).await
    }

    async fn teams_in_league(&self, league: &str) -> Result<Vec<String>, StoreError> {
        self.cached(key_patterns::teams(league), self.inner.teams_in_league(league))
            .await
    }

    async fn active_roster(
        &self,
        league: &str,
        team: &str,
    ) -> Result<Vec<RosterEntry>, StoreError> {
        self.cached(
            key_patterns::roster(league, team),
            self.inner.active_roster(league, team),
        )
        .await
    }
}
