use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};
use propwatch_agents::{AgentError, AlertGenerator};
use propwatch_models::{Fixture, IdempotencyKey, PipelineConfig, PlayerAlert, RunContext};
use propwatch_store::AlertStore;
use tracing::{error, info, warn};

/// How a fixture's alerts were obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum FixtureStatus {
    /// The agent chain ran and its alerts were saved (unless dry-run).
    Generated,
    /// Alerts for this fixture were already stored under the current run id.
    AlreadyPersisted,
    /// Every attempt failed; the fixture is skipped.
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct FixtureResult {
    pub fixture: Fixture,
    pub status: FixtureStatus,
    pub alerts: Vec<PlayerAlert>,
    pub attempts: u32,
}

impl FixtureResult {
    pub fn succeeded(&self) -> bool {
        !matches!(self.status, FixtureStatus::Failed { .. })
    }
}

/// Per-fixture results, in fixture order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub results: Vec<FixtureResult>,
}

impl RunReport {
    pub fn processed(&self) -> impl Iterator<Item = &FixtureResult> {
        self.results.iter().filter(|r| r.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FixtureResult> {
        self.results.iter().filter(|r| !r.succeeded())
    }

    pub fn alerts(&self) -> impl Iterator<Item = &PlayerAlert> {
        self.results.iter().flat_map(|r| r.alerts.iter())
    }
}

/// Runs the alert generator over fixtures with fixture-level retry.
///
/// Before every attempt the store is checked for alerts saved under
/// `(run id, fixture)`; if any exist the generator is not called again.
pub struct FixtureRunner {
    generator: Arc<dyn AlertGenerator>,
    store: Arc<dyn AlertStore>,
    attempts: u32,
    concurrency: usize,
    dry_run: bool,
}

impl FixtureRunner {
    pub fn new(
        generator: Arc<dyn AlertGenerator>,
        store: Arc<dyn AlertStore>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            generator,
            store,
            attempts: config.fixture_attempts.max(1),
            concurrency: config.max_concurrent_fixtures.max(1),
            dry_run: config.dry_run,
        }
    }

    /// Process every fixture. Only an interrupt is returned as an error;
    /// other failures are recorded in the report.
    pub async fn run_all(
        &self,
        fixtures: &[Fixture],
        run: &RunContext,
    ) -> Result<RunReport, AgentError> {
        let results = stream::iter(fixtures)
            .map(|fixture| self.run_fixture(fixture, run))
            .buffered(self.concurrency)
            .try_collect()
            .await?;
        Ok(RunReport { results })
    }

    pub async fn run_fixture(
        &self,
        fixture: &Fixture,
        run: &RunContext,
    ) -> Result<FixtureResult, AgentError> {
        let key = IdempotencyKey::new(run.run_id(), &fixture.name);
        let started = Instant::now();
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            if run.is_interrupted() {
                return Err(AgentError::Interrupted);
            }

            match self.store.get_by_key(&key).await {
                Ok(existing) if !existing.is_empty() => {
                    info!(
                        fixture = %fixture.name,
                        key = %key,
                        alerts = existing.len(),
                        attempt,
                        "Alerts already stored for this run, skipping agents"
                    );
                    return Ok(FixtureResult {
                        fixture: fixture.clone(),
                        status: FixtureStatus::AlreadyPersisted,
                        alerts: existing.iter().map(|a| a.to_player_alert()).collect(),
                        attempts: attempt,
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(fixture = %fixture.name, error = %e, "Idempotency check failed"),
            }

            match self.attempt(fixture, run).await {
                Ok(alerts) => {
                    info!(
                        fixture = %fixture.name,
                        alerts = alerts.len(),
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Fixture complete"
                    );
                    return Ok(FixtureResult {
                        fixture: fixture.clone(),
                        status: FixtureStatus::Generated,
                        alerts,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_interrupt() => return Err(e),
                Err(e) => {
                    warn!(
                        fixture = %fixture.name,
                        attempt,
                        max_attempts = self.attempts,
                        error = %e,
                        "Fixture attempt failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        error!(
            fixture = %fixture.name,
            attempts = self.attempts,
            error = %last_error,
            "Fixture failed, skipping"
        );
        Ok(FixtureResult {
            fixture: fixture.clone(),
            status: FixtureStatus::Failed { error: last_error },
            alerts: Vec::new(),
            attempts: self.attempts,
        })
    }

    async fn attempt(
        &self,
        fixture: &Fixture,
        run: &RunContext,
    ) -> Result<Vec<PlayerAlert>, AgentError> {
        let alerts = self.generator.generate(fixture, run).await?;
        if self.dry_run {
            info!(fixture = %fixture.name, alerts = alerts.len(), "Dry run, not saving alerts");
        } else {
            let saved = self.store.save(&alerts, run.run_id()).await?;
            info!(fixture = %fixture.name, saved, run_id = %run.run_id(), "Alerts saved");
        }
        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propwatch_agents::test_support::{arsenal_fixture, kickoff, player_alert, MockGenerator};
    use propwatch_models::{AlertLevel, RunId};
    use propwatch_store::MemoryAlertStore;

    const FIXTURE: &str = "Arsenal vs Brentford";

    fn config(attempts: u32) -> PipelineConfig {
        PipelineConfig {
            fixture_attempts: attempts,
            ..PipelineConfig::default()
        }
    }

    fn run() -> RunContext {
        RunContext::with_run_id(RunId::new("2025_12_10_090000"))
    }

    fn exhausted() -> AgentError {
        AgentError::Exhausted {
            agent: "Research Agent (Arsenal)".into(),
            attempts: 3,
            last_error: "Invalid response structure".into(),
        }
    }

    #[tokio::test]
    async fn generated_alerts_are_saved() {
        let store = Arc::new(MemoryAlertStore::new());
        let generator = Arc::new(MockGenerator::new().script(
            FIXTURE,
            vec![Ok(vec![player_alert("Viktor Gyökeres", FIXTURE, AlertLevel::High)])],
        ));
        let runner = FixtureRunner::new(generator.clone(), store.clone(), &config(3));
        let run = run();

        let result = runner.run_fixture(&arsenal_fixture(), &run).await.unwrap();

        assert_eq!(result.status, FixtureStatus::Generated);
        assert_eq!(result.alerts.len(), 1);
        assert_eq!(store.len(), 1);
        let key = IdempotencyKey::new(run.run_id(), FIXTURE);
        assert!(store.exists_for_key(&key).await.unwrap());
    }

    #[tokio::test]
    async fn retries_after_failure() {
        let store = Arc::new(MemoryAlertStore::new());
        let generator = Arc::new(MockGenerator::new().script(
            FIXTURE,
            vec![
                Err(exhausted()),
                Ok(vec![player_alert("Bukayo Saka", FIXTURE, AlertLevel::Medium)]),
            ],
        ));
        let runner = FixtureRunner::new(generator.clone(), store, &config(3));

        let result = runner.run_fixture(&arsenal_fixture(), &run()).await.unwrap();
        assert_eq!(result.attempts, 2);
        assert_eq!(generator.calls_for(FIXTURE), 2);
        assert!(result.succeeded());
    }

    #[tokio::test]
    async fn stored_alerts_short_circuit_the_pipeline() {
        let store = Arc::new(MemoryAlertStore::new());
        let run = run();
        store
            .save(&[player_alert("Viktor Gyökeres", FIXTURE, AlertLevel::High)], run.run_id())
            .await
            .unwrap();
        let generator = Arc::new(MockGenerator::new());
        let runner = FixtureRunner::new(generator.clone(), store.clone(), &config(3));

        let result = runner.run_fixture(&arsenal_fixture(), &run).await.unwrap();

        assert_eq!(result.status, FixtureStatus::AlreadyPersisted);
        assert_eq!(result.alerts[0].player_name, "Viktor Gyökeres");
        assert_eq!(result.alerts[0].fixture_datetime, kickoff());
        assert_eq!(generator.calls_for(FIXTURE), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn alerts_from_another_run_do_not_short_circuit() {
        let store = Arc::new(MemoryAlertStore::new());
        store
            .save(
                &[player_alert("Viktor Gyökeres", FIXTURE, AlertLevel::High)],
                &RunId::new("2025_12_09_090000"),
            )
            .await
            .unwrap();
        let generator = Arc::new(MockGenerator::new());
        let runner = FixtureRunner::new(generator.clone(), store, &config(3));

        let result = runner.run_fixture(&arsenal_fixture(), &run()).await.unwrap();
        assert_eq!(result.status, FixtureStatus::Generated);
        assert_eq!(generator.calls_for(FIXTURE), 1);
    }

    #[tokio::test]
    async fn exhausted_fixture_is_skipped_not_fatal() {
        let store = Arc::new(MemoryAlertStore::new());
        let generator = Arc::new(
            MockGenerator::new()
                .script(FIXTURE, vec![Err(exhausted()), Err(exhausted())])
                .script(
                    "Chelsea vs Everton",
                    vec![Ok(vec![player_alert(
                        "Cole Palmer",
                        "Chelsea vs Everton",
                        AlertLevel::Low,
                    )])],
                ),
        );
        let runner = FixtureRunner::new(generator.clone(), store, &config(2));
        let fixtures = vec![arsenal_fixture(), Fixture::new("Chelsea vs Everton", kickoff())];

        let report = runner.run_all(&fixtures, &run()).await.unwrap();

        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.processed().count(), 1);
        assert_eq!(report.alerts().count(), 1);
        assert_eq!(generator.calls_for(FIXTURE), 2);
        match &report.results[0].status {
            FixtureStatus::Failed { error } => assert!(error.contains("Research Agent (Arsenal)")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn interrupt_aborts_the_run() {
        let store = Arc::new(MemoryAlertStore::new());
        let generator = Arc::new(
            MockGenerator::new().script(FIXTURE, vec![Err(AgentError::Interrupted)]),
        );
        let runner = FixtureRunner::new(generator.clone(), store, &config(3));
        let fixtures = vec![arsenal_fixture(), Fixture::new("Chelsea vs Everton", kickoff())];

        let err = runner.run_all(&fixtures, &run()).await.unwrap_err();
        assert!(err.is_interrupt());
        assert_eq!(generator.calls_for(FIXTURE), 1);
        assert_eq!(generator.calls_for("Chelsea vs Everton"), 0);
    }

    #[tokio::test]
    async fn dry_run_does_not_save() {
        let store = Arc::new(MemoryAlertStore::new());
        let generator = Arc::new(MockGenerator::new().script(
            FIXTURE,
            vec![Ok(vec![player_alert("Viktor Gyökeres", FIXTURE, AlertLevel::High)])],
        ));
        let config = PipelineConfig {
            dry_run: true,
            ..PipelineConfig::default()
        };
        let runner = FixtureRunner::new(generator, store.clone(), &config);

        let result = runner.run_fixture(&arsenal_fixture(), &run()).await.unwrap();
        assert_eq!(result.alerts.len(), 1);
        assert!(store.is_empty());
    }
}
