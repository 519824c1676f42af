//! Whole runs over a file warehouse and an in-memory SQLite store, with the
//! model-backed agents replaced by mocks.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use propwatch::agents::test_support::{
    player_alert, MockAnalyst, MockAssessor, MockGenerator, MockResearcher,
};
use propwatch::agents::{AgentPipeline, AlertGenerator};
use propwatch::models::{AlertLevel, PropwatchConfig, RunContext, RunId};
use propwatch::store::{AlertStore, FileWarehouse, SqliteStore};
use propwatch::Services;
use serde_json::Value;

const FIXTURE: &str = "Arsenal vs Brentford";

fn seed_warehouse(dir: &Path) {
    std::fs::write(
        dir.join("fixtures.json"),
        r#"[
            {"fixture": "Arsenal vs Brentford", "match_time": "2025-12-13T15:00:00", "league": "Premier League"},
            {"fixture": "Leeds vs Fulham", "match_time": "2025-12-01T15:00:00", "league": "Premier League"}
        ]"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("projections.json"),
        r#"[
            {"player_name": "Viktor Gyokeres", "fixture": "Arsenal vs Brentford", "projected_goals": 0.61},
            {"player_name": "Bukayo Saka", "fixture": "Arsenal vs Brentford", "projected_goals": 0.38},
            {"player_name": "Joe Rodon", "fixture": "Leeds vs Fulham", "projected_goals": 0.05}
        ]"#,
    )
    .unwrap();
}

fn config(dir: &Path) -> PropwatchConfig {
    let mut config = PropwatchConfig::default();
    config.warehouse.dir = dir.display().to_string();
    config
}

fn services(
    config: &PropwatchConfig,
    store: Arc<SqliteStore>,
    generator: Arc<dyn AlertGenerator>,
) -> Services {
    let now = NaiveDate::from_ymd_opt(2025, 12, 10)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();
    Services {
        alerts: store,
        warehouse: Arc::new(FileWarehouse::new(&config.warehouse).as_of(now)),
        generator,
    }
}

fn mock_pipeline() -> Arc<AgentPipeline> {
    Arc::new(AgentPipeline::new(
        Arc::new(MockResearcher::new()),
        Arc::new(MockAnalyst::new()),
        Arc::new(MockAssessor::new(vec![("Viktor Gyökeres", AlertLevel::High)])),
        3,
    ))
}

fn written_rows(dir: &Path) -> Vec<Value> {
    std::fs::read_to_string(dir.join("enriched_projections.jsonl"))
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn alert_reaches_matching_projection_row() {
    let dir = tempfile::tempdir().unwrap();
    seed_warehouse(dir.path());
    let config = config(dir.path());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let services = services(&config, store.clone(), mock_pipeline());
    let ctx = RunContext::with_run_id(RunId::new("2025_12_10_090000"));

    let summary = propwatch::run(&config, &services, &ctx).await.unwrap();

    assert_eq!(summary.fixtures_processed, 1);
    assert_eq!(summary.fixtures_failed, 0);
    assert_eq!(summary.alerts_generated, 1);
    assert_eq!((summary.rows_matched, summary.rows_unmatched), (1, 1));
    assert_eq!(summary.rows_written, 2);

    let rows = written_rows(dir.path());
    assert_eq!(rows.len(), 2);
    let by_player = |name: &str| rows.iter().find(|r| r["player_name"] == name).unwrap().clone();
    let gyokeres = by_player("Viktor Gyokeres");
    assert_eq!(gyokeres["alert_level"], "high");
    assert_eq!(gyokeres["projected_goals"], 0.61);
    assert!(gyokeres["enriched_at"].is_string());
    assert_eq!(by_player("Bukayo Saka")["alert_level"], "no_alert");

    let stored = store.get_by_fixture(FIXTURE).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].run_id.as_str(), "2025_12_10_090000");
}

#[tokio::test]
async fn alerts_only_writes_alerted_rows() {
    let dir = tempfile::tempdir().unwrap();
    seed_warehouse(dir.path());
    let mut config = config(dir.path());
    config.pipeline.push_all = false;
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let services = services(&config, store, mock_pipeline());

    let summary = propwatch::run(&config, &services, &RunContext::start()).await.unwrap();

    assert_eq!(summary.rows_written, 1);
    let rows = written_rows(dir.path());
    assert_eq!(rows[0]["player_name"], "Viktor Gyokeres");
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    seed_warehouse(dir.path());
    let mut config = config(dir.path());
    config.pipeline.dry_run = true;
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let services = services(&config, store.clone(), mock_pipeline());

    let summary = propwatch::run(&config, &services, &RunContext::start()).await.unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.rows_matched, 1);
    assert_eq!(summary.rows_written, 0);
    assert!(!dir.path().join("enriched_projections.jsonl").exists());
    assert!(!store.exists_for_fixture(FIXTURE).await.unwrap());
}

#[tokio::test]
async fn rerun_under_same_run_id_reuses_stored_alerts() {
    let dir = tempfile::tempdir().unwrap();
    seed_warehouse(dir.path());
    let config = config(dir.path());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let generator = Arc::new(MockGenerator::new().script(
        FIXTURE,
        vec![Ok(vec![player_alert("Viktor Gyökeres", FIXTURE, AlertLevel::High)])],
    ));
    let services = services(&config, store, generator.clone());
    let ctx = RunContext::with_run_id(RunId::new("2025_12_10_090000"));

    propwatch::run(&config, &services, &ctx).await.unwrap();
    let second = propwatch::run(&config, &services, &ctx).await.unwrap();

    assert_eq!(generator.calls_for(FIXTURE), 1);
    assert_eq!(second.fixtures_reused, 1);
    assert_eq!(second.alerts_generated, 1);
    assert_eq!(second.rows_matched, 1);
}

#[tokio::test]
async fn interrupted_run_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    seed_warehouse(dir.path());
    let config = config(dir.path());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let services = services(&config, store, mock_pipeline());
    let ctx = RunContext::start();
    ctx.interrupt();

    let err = propwatch::run(&config, &services, &ctx).await.unwrap_err();
    assert!(err.to_string().contains("interrupted"));
}
