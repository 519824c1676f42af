use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use propwatch_models::{EnrichedRow, Fixture, ProjectionRow, WarehouseConfig, WriteMode};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::error::StoreError;

/// Tabular source of fixtures and projection rows, and sink for enriched rows.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Fixtures that have not kicked off yet, earliest first.
    async fn get_upcoming_fixtures(&self) -> Result<Vec<Fixture>, StoreError>;

    async fn get_projection_rows(
        &self,
        fixtures: &[String],
    ) -> Result<Vec<ProjectionRow>, StoreError>;

    /// Write rows in one call. Returns the number written.
    async fn write(&self, rows: &[EnrichedRow], mode: WriteMode) -> Result<usize, StoreError>;
}

/// Warehouse backed by JSON files in one directory.
///
/// Fixtures and projections are JSON arrays; enriched output is JSON lines.
pub struct FileWarehouse {
    fixtures_path: PathBuf,
    projections_path: PathBuf,
    output_path: PathBuf,
    as_of: Option<NaiveDateTime>,
}

impl FileWarehouse {
    pub fn new(config: &WarehouseConfig) -> Self {
        let dir = Path::new(&config.dir);
        Self {
            fixtures_path: dir.join(&config.fixtures_file),
            projections_path: dir.join(&config.projections_file),
            output_path: dir.join(&config.output_file),
            as_of: None,
        }
    }

    /// Treat `now` as the current time when selecting upcoming fixtures.
    pub fn as_of(mut self, now: NaiveDateTime) -> Self {
        self.as_of = Some(now);
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn read_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
        let raw = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl Warehouse for FileWarehouse {
    async fn get_upcoming_fixtures(&self) -> Result<Vec<Fixture>, StoreError> {
        let now = self.as_of.unwrap_or_else(|| Local::now().naive_local());
        let mut fixtures: Vec<Fixture> = Self::read_array(&self.fixtures_path)?;
        fixtures.retain(|f| f.match_time >= now);
        fixtures.sort_by_key(|f| f.match_time);
        Ok(fixtures)
    }

    async fn get_projection_rows(
        &self,
        fixtures: &[String],
    ) -> Result<Vec<ProjectionRow>, StoreError> {
        if fixtures.is_empty() {
            return Ok(Vec::new());
        }
        if !self.projections_path.exists() {
            warn!(path = %self.projections_path.display(), "No projections file");
            return Ok(Vec::new());
        }
        let mut rows: Vec<ProjectionRow> = Self::read_array(&self.projections_path)?;
        rows.retain(|r| fixtures.iter().any(|f| f == &r.fixture));
        Ok(rows)
    }

    async fn write(&self, rows: &[EnrichedRow], mode: WriteMode) -> Result<usize, StoreError> {
        let mut buf = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut buf, row)?;
            buf.push(b'\n');
        }

        let io_err = |source| StoreError::Io {
            path: self.output_path.display().to_string(),
            source,
        };
        if let Some(parent) = self.output_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(mode == WriteMode::Append)
            .truncate(mode == WriteMode::Overwrite)
            .open(&self.output_path)
            .map_err(io_err)?;
        // one write call for the whole batch
        file.write_all(&buf).map_err(io_err)?;

        info!(
            rows = rows.len(),
            mode = ?mode,
            path = %self.output_path.display(),
            "Wrote enriched rows"
        );
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propwatch_models::AlertLevel;

    fn setup(dir: &Path) -> FileWarehouse {
        std::fs::write(
            dir.join("fixtures.json"),
            r#"[
                {"fixture": "Chelsea vs Everton", "match_time": "2025-12-14 16:30:00", "league": "Premier League"},
                {"fixture": "Arsenal vs Brentford", "match_time": "2025-12-13T15:00:00", "league": "Premier League"},
                {"fixture": "Leeds vs Fulham", "match_time": "2025-12-01", "league": "Premier League"}
            ]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("projections.json"),
            r#"[
                {"player_name": "Viktor Gyokeres", "fixture": "Arsenal vs Brentford", "projected_goals": 0.61},
                {"player_name": "Bukayo Saka", "fixture": "Arsenal vs Brentford", "projected_goals": 0.38},
                {"player_name": "Cole Palmer", "fixture": "Chelsea vs Everton", "projected_goals": 0.45}
            ]"#,
        )
        .unwrap();
        let config = WarehouseConfig {
            dir: dir.display().to_string(),
            ..WarehouseConfig::default()
        };
        let now = chrono::NaiveDate::from_ymd_opt(2025, 12, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        FileWarehouse::new(&config).as_of(now)
    }

    #[tokio::test]
    async fn upcoming_fixtures_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = setup(dir.path());

        let fixtures = warehouse.get_upcoming_fixtures().await.unwrap();
        let names: Vec<&str> = fixtures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Arsenal vs Brentford", "Chelsea vs Everton"]);
    }

    #[tokio::test]
    async fn projection_rows_for_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = setup(dir.path());

        let rows = warehouse
            .get_projection_rows(&["Arsenal vs Brentford".to_string()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(warehouse.get_projection_rows(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_modes() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = setup(dir.path());
        let mut row =
            EnrichedRow::unalerted(ProjectionRow::new("Bukayo Saka", "Arsenal vs Brentford"));
        row.alert_level = AlertLevel::Low;

        warehouse.write(&[row.clone()], WriteMode::Append).await.unwrap();
        warehouse.write(&[row.clone()], WriteMode::Append).await.unwrap();
        let out = std::fs::read_to_string(warehouse.output_path()).unwrap();
        assert_eq!(out.lines().count(), 2);
        let first: serde_json::Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(first["alert_level"], "low");

        warehouse.write(&[row], WriteMode::Overwrite).await.unwrap();
        let out = std::fs::read_to_string(warehouse.output_path()).unwrap();
        assert_eq!(out.lines().count(), 1);
    }
}
