//! propwatch: player-availability alerts for upcoming fixtures.
//!
//! A reasoning-model agent chain researches both teams of each fixture,
//! decides which players warrant an alert, and the alerts are joined onto
//! externally sourced projection rows by fuzzy player-name matching.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use propwatch::models::RunContext;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = propwatch::load_config("config/propwatch.toml")?;
//! let services = propwatch::build_services(&config)?;
//! let summary = propwatch::run(&config, &services, &RunContext::start()).await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub use propwatch_agents as agents;
pub use propwatch_models as models;
pub use propwatch_store as store;

pub mod reconcile;
pub mod runner;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use propwatch_agents::{
    sport_prompts, AgentError, AgentPipeline, AlertGenerator, AnalystAgent, ModelHost, RemoteTool,
    ResearchAgent, RetryingHost, RosterTool, SamplingConfig, SessionLimits, SharkAgent,
    ToolCallingSession, ToolRegistry, XaiHost,
};
use propwatch_models::{
    AlertCandidate, Fixture, PipelineConfig, PropwatchConfig, RunContext, RunId, WriteMode,
};
use propwatch_store::{
    AlertStore, CachedRosterSource, FileWarehouse, RosterSource, SqliteStore, Warehouse,
};
use tracing::{info, info_span, Instrument};

use crate::reconcile::{filter_alerted, stamp, AlertReconciler};
use crate::runner::{FixtureRunner, FixtureStatus};

/// Read and parse a TOML config file.
pub fn load_config(path: &str) -> anyhow::Result<PropwatchConfig> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {path}"))?;
    toml::from_str(&raw).with_context(|| format!("Failed to parse config: {path}"))
}

/// Everything a run talks to.
#[derive(Clone)]
pub struct Services {
    pub alerts: Arc<dyn AlertStore>,
    pub warehouse: Arc<dyn Warehouse>,
    pub generator: Arc<dyn AlertGenerator>,
}

pub fn build_warehouse(config: &PropwatchConfig) -> Arc<dyn Warehouse> {
    Arc::new(FileWarehouse::new(&config.warehouse))
}

/// xAI host wrapped in transport retry. Needs the API key in the environment.
pub fn build_host(config: &PropwatchConfig) -> anyhow::Result<Arc<dyn ModelHost>> {
    let host = XaiHost::from_env(&config.host).context("Failed to create model host")?;
    info!(model = %host.model(), "Model host ready");
    Ok(Arc::new(RetryingHost::from_config(host, &config.host)))
}

/// Wire the three agents over `host`. All three get remote search; research
/// also gets the roster tool.
pub fn build_pipeline(
    config: &PropwatchConfig,
    host: Arc<dyn ModelHost>,
    roster: Arc<dyn RosterSource>,
) -> anyhow::Result<AgentPipeline> {
    let prompts = sport_prompts(&config.agents.sport)?;
    let base = ToolCallingSession::new(
        host,
        SamplingConfig::from(&config.host),
        SessionLimits::from(&config.session),
    );
    let roster_tool = RosterTool::new(roster, config.matching.roster_threshold);
    let roster_tools = Arc::new(ToolRegistry::new().register(Arc::new(roster_tool)));
    let search = vec![RemoteTool::WebSearch, RemoteTool::XSearch];

    let research = ResearchAgent::new(
        base.clone()
            .with_remote_tools(search.clone())
            .with_local_tools(roster_tools),
        prompts.research.clone(),
        config.agents.research_lookback_days,
    );
    let analyst = AnalystAgent::new(
        base.clone().with_remote_tools(search.clone()),
        prompts.analyst.clone(),
    );
    // replacement players are search-verified before alerting
    let shark = SharkAgent::new(base.with_remote_tools(search), prompts.shark.clone());

    Ok(AgentPipeline::new(
        Arc::new(research),
        Arc::new(analyst),
        Arc::new(shark),
        config.agents.max_attempts,
    ))
}

/// Open the SQLite store and build the production pipeline from config.
pub fn build_services(config: &PropwatchConfig) -> anyhow::Result<Services> {
    let sqlite = Arc::new(
        SqliteStore::open(&config.store.sqlite_path)
            .with_context(|| format!("Failed to open store: {}", config.store.sqlite_path))?,
    );
    let roster = Arc::new(CachedRosterSource::new(
        sqlite.clone(),
        config.store.roster_cache_capacity,
        Duration::from_secs(config.store.roster_cache_ttl_seconds),
    ));
    let pipeline = build_pipeline(config, build_host(config)?, roster)?;

    Ok(Services {
        alerts: sqlite,
        warehouse: build_warehouse(config),
        generator: Arc::new(pipeline),
    })
}

/// Apply the league and fixture filters. Comparison ignores case and
/// surrounding whitespace; an empty filter keeps everything.
pub fn select_fixtures(fixtures: Vec<Fixture>, config: &PipelineConfig) -> Vec<Fixture> {
    let norm = |s: &str| s.trim().to_lowercase();
    let leagues: Vec<String> = config.leagues.iter().map(|l| norm(l)).collect();
    let names: Vec<String> = config.fixtures.iter().map(|f| norm(f)).collect();
    fixtures
        .into_iter()
        .filter(|f| {
            leagues.is_empty()
                || f.league.as_deref().is_some_and(|l| leagues.contains(&norm(l)))
        })
        .filter(|f| names.is_empty() || names.contains(&norm(&f.name)))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: RunId,
    pub dry_run: bool,
    pub fixtures_processed: usize,
    pub fixtures_failed: usize,
    /// Processed fixtures whose alerts were already stored for this run.
    pub fixtures_reused: usize,
    pub alerts_generated: usize,
    pub rows_matched: usize,
    pub rows_unmatched: usize,
    pub rows_written: usize,
    pub duration: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}{}", self.run_id, if self.dry_run { " (dry run)" } else { "" })?;
        writeln!(
            f,
            "  fixtures: {} processed, {} failed, {} reused",
            self.fixtures_processed, self.fixtures_failed, self.fixtures_reused
        )?;
        writeln!(f, "  alerts generated: {}", self.alerts_generated)?;
        writeln!(
            f,
            "  projection rows: {} matched, {} unmatched, {} written",
            self.rows_matched, self.rows_unmatched, self.rows_written
        )?;
        write!(f, "  duration: {:.1}s", self.duration.as_secs_f64())
    }
}

/// Generate alerts for the selected upcoming fixtures, then enrich and
/// write their projection rows.
///
/// A failing fixture is skipped; only an interrupt or a store/warehouse
/// failure outside the fixture loop aborts the run.
pub async fn run(
    config: &PropwatchConfig,
    services: &Services,
    ctx: &RunContext,
) -> anyhow::Result<RunSummary> {
    let span = info_span!("run", run_id = %ctx.run_id());
    run_inner(config, services, ctx).instrument(span).await
}

async fn run_inner(
    config: &PropwatchConfig,
    services: &Services,
    ctx: &RunContext,
) -> anyhow::Result<RunSummary> {
    let started = Instant::now();
    let dry_run = config.pipeline.dry_run;

    let upcoming = services
        .warehouse
        .get_upcoming_fixtures()
        .await
        .context("Failed to load upcoming fixtures")?;
    let fixtures = select_fixtures(upcoming, &config.pipeline);
    info!(fixtures = fixtures.len(), dry_run, "Starting run");

    let runner = FixtureRunner::new(
        services.generator.clone(),
        services.alerts.clone(),
        &config.pipeline,
    );
    let report = match runner.run_all(&fixtures, ctx).await {
        Ok(report) => report,
        Err(AgentError::Interrupted) => anyhow::bail!("Run interrupted"),
        Err(e) => return Err(e).context("Fixture loop failed"),
    };

    let processed: Vec<String> = report.processed().map(|r| r.fixture.name.clone()).collect();
    let rows = services
        .warehouse
        .get_projection_rows(&processed)
        .await
        .context("Failed to load projection rows")?;

    let candidates: Vec<AlertCandidate> = if dry_run {
        report.alerts().map(AlertCandidate::from).collect()
    } else {
        services
            .alerts
            .get_latest_by_fixtures(&processed)
            .await
            .context("Failed to load latest alerts")?
            .iter()
            .map(AlertCandidate::from)
            .collect()
    };

    let reconciled = AlertReconciler::new(config.matching.threshold).reconcile(rows, &candidates);
    let mut output = if config.pipeline.push_all {
        reconciled.rows
    } else {
        filter_alerted(reconciled.rows)
    };
    stamp(&mut output, Utc::now());

    let rows_written = if dry_run {
        info!(rows = output.len(), "Dry run, not writing enriched rows");
        0
    } else if output.is_empty() {
        0
    } else {
        services
            .warehouse
            .write(&output, WriteMode::Append)
            .await
            .context("Failed to write enriched rows")?
    };

    let summary = RunSummary {
        run_id: ctx.run_id().clone(),
        dry_run,
        fixtures_processed: processed.len(),
        fixtures_failed: report.failed().count(),
        fixtures_reused: report
            .results
            .iter()
            .filter(|r| r.status == FixtureStatus::AlreadyPersisted)
            .count(),
        alerts_generated: report.alerts().count(),
        rows_matched: reconciled.matched,
        rows_unmatched: reconciled.unmatched,
        rows_written,
        duration: started.elapsed(),
    };
    info!(
        processed = summary.fixtures_processed,
        failed = summary.fixtures_failed,
        alerts = summary.alerts_generated,
        matched = summary.rows_matched,
        unmatched = summary.rows_unmatched,
        written = summary.rows_written,
        elapsed_ms = summary.duration.as_millis() as u64,
        "Run complete"
    );
    Ok(summary)
}
