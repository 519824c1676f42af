use anyhow::{Context, Result};
use clap::Parser;
use propwatch::store::Warehouse;
use propwatch_models::RunContext;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "propwatch", about = "Player-availability alerts for upcoming fixtures")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/propwatch.toml")]
    config: String,

    /// Generate alerts without saving them or writing projection rows
    #[arg(long)]
    dry_run: bool,

    /// Only process fixtures in this league (repeatable)
    #[arg(long = "league")]
    leagues: Vec<String>,

    /// Only process this fixture, e.g. "Arsenal vs Brentford" (repeatable)
    #[arg(long = "fixture")]
    fixtures: Vec<String>,

    /// Write every projection row
    #[arg(long, conflicts_with = "alerts_only")]
    push_all: bool,

    /// Write only projection rows that carry an alert
    #[arg(long)]
    alerts_only: bool,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// List the selected upcoming fixtures and exit
    #[arg(long)]
    fixtures_only: bool,
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = propwatch::load_config(&cli.config)?;
    if cli.dry_run {
        config.pipeline.dry_run = true;
    }
    if !cli.leagues.is_empty() {
        config.pipeline.leagues = cli.leagues.clone();
    }
    if !cli.fixtures.is_empty() {
        config.pipeline.fixtures = cli.fixtures.clone();
    }
    if cli.push_all {
        config.pipeline.push_all = true;
    }
    if cli.alerts_only {
        config.pipeline.push_all = false;
    }

    if cli.fixtures_only {
        let warehouse = propwatch::build_warehouse(&config);
        let upcoming = warehouse
            .get_upcoming_fixtures()
            .await
            .context("Failed to load upcoming fixtures")?;
        for fixture in propwatch::select_fixtures(upcoming, &config.pipeline) {
            println!(
                "{}\t{}\t{}",
                fixture.match_time.format("%Y-%m-%d %H:%M"),
                fixture.league.as_deref().unwrap_or("-"),
                fixture.name
            );
        }
        return Ok(());
    }

    let services = propwatch::build_services(&config).context("Failed to build services")?;
    let ctx = RunContext::start();
    info!(run_id = %ctx.run_id(), config = %cli.config, "propwatch starting");

    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping run");
            interrupt.interrupt();
        }
    });

    let summary = propwatch::run(&config, &services, &ctx).await?;
    println!("{summary}");

    Ok(())
}
