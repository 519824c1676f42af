use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use propwatch_models::{
    AgentUsage, Fixture, FixtureAssessment, FixtureUsage, ParseQuality, PlayerAlert,
    ResearchFindings, RunContext, TeamAnalysis, TeamContext, TeamReport,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analyst::{analyst_agent_name, TeamAnalyst};
use crate::error::AgentError;
use crate::research::{research_agent_name, TeamResearcher};
use crate::shark::{shark_agent_name, FixtureAssessor};

/// Produces the alert list for one fixture. Mockable for testing.
#[async_trait]
pub trait AlertGenerator: Send + Sync {
    async fn generate(
        &self,
        fixture: &Fixture,
        run: &RunContext,
    ) -> Result<Vec<PlayerAlert>, AgentError>;
}

/// Output of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub alerts: Vec<PlayerAlert>,
    pub reports: [TeamReport; 2],
    pub usage: FixtureUsage,
}

/// Runs the agent chain for a fixture: research then analysis for each side
/// (both sides concurrently), then one assessment over both.
pub struct AgentPipeline {
    researcher: Arc<dyn TeamResearcher>,
    analyst: Arc<dyn TeamAnalyst>,
    assessor: Arc<dyn FixtureAssessor>,
    max_attempts: u32,
}

impl AgentPipeline {
    pub fn new(
        researcher: Arc<dyn TeamResearcher>,
        analyst: Arc<dyn TeamAnalyst>,
        assessor: Arc<dyn FixtureAssessor>,
        max_attempts: u32,
    ) -> Self {
        Self {
            researcher,
            analyst,
            assessor,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn run_fixture(
        &self,
        fixture: &Fixture,
        interrupt: &CancellationToken,
    ) -> Result<PipelineOutput, AgentError> {
        let started = Instant::now();
        let [home, away] = TeamContext::pair_for(fixture)?;
        info!(fixture = %fixture.name, kickoff = %fixture.match_time, "Starting agent pipeline");

        let (home, away) = tokio::try_join!(
            self.run_team(home, interrupt),
            self.run_team(away, interrupt)
        )?;

        let mut usage = FixtureUsage::new(&fixture.name, fixture.match_time);
        for report in [&home, &away] {
            record(&mut usage, &report.research.usage);
            record(&mut usage, &report.analysis.usage);
        }

        let reports = [home, away];
        let assessment = run_agent_with_retry(
            &shark_agent_name(&fixture.name),
            self.max_attempts,
            interrupt,
            || self.assessor.assess_fixture(&reports),
            validate_assessment,
        )
        .await?;
        record(&mut usage, &assessment.usage);

        let tokens = usage.total_tokens();
        let tool_calls = usage.total_tool_calls();
        info!(
            fixture = %fixture.name,
            alerts = assessment.alerts.len(),
            agent_calls = usage.agent_usages.len(),
            total_tokens = tokens.total_tokens,
            reasoning_tokens = tokens.reasoning_tokens,
            remote_tool_calls = tool_calls.remote,
            local_tool_calls = tool_calls.local,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fixture pipeline complete"
        );

        Ok(PipelineOutput {
            alerts: assessment.alerts,
            reports,
            usage,
        })
    }

    async fn run_team(
        &self,
        context: TeamContext,
        interrupt: &CancellationToken,
    ) -> Result<TeamReport, AgentError> {
        let research = run_agent_with_retry(
            &research_agent_name(&context.team),
            self.max_attempts,
            interrupt,
            || self.researcher.research(&context),
            validate_research,
        )
        .await?;

        let analysis = run_agent_with_retry(
            &analyst_agent_name(&context.team),
            self.max_attempts,
            interrupt,
            || self.analyst.analyze(&context, &research),
            validate_analysis,
        )
        .await?;

        Ok(TeamReport {
            context,
            research,
            analysis,
        })
    }
}

#[async_trait]
impl AlertGenerator for AgentPipeline {
    async fn generate(
        &self,
        fixture: &Fixture,
        run: &RunContext,
    ) -> Result<Vec<PlayerAlert>, AgentError> {
        let output = self.run_fixture(fixture, &run.interrupt_token()).await?;
        Ok(output.alerts)
    }
}

fn record(usage: &mut FixtureUsage, agent: &AgentUsage) {
    let tools = agent.tool_call_totals();
    info!(
        fixture = %usage.fixture,
        agent = %agent.agent,
        prompt_tokens = agent.tokens.prompt_tokens,
        completion_tokens = agent.tokens.completion_tokens,
        reasoning_tokens = agent.tokens.reasoning_tokens,
        turns = agent.turns,
        remote_tool_calls = tools.remote,
        local_tool_calls = tools.local,
        elapsed_ms = agent.elapsed_ms,
        "Agent usage"
    );
    usage.record(agent.clone());
}

pub fn validate_research(findings: &ResearchFindings) -> Result<(), String> {
    if findings.timed_out {
        return Err("Agent timed out".to_string());
    }
    if !findings.findings.has_description() {
        return Err("Invalid response structure: research has no description".to_string());
    }
    Ok(())
}

pub fn validate_analysis(analysis: &TeamAnalysis) -> Result<(), String> {
    if analysis.timed_out {
        return Err("Agent timed out".to_string());
    }
    if !analysis.has_analysis() {
        return Err("Invalid response structure: empty analysis".to_string());
    }
    Ok(())
}

pub fn validate_assessment(assessment: &FixtureAssessment) -> Result<(), String> {
    if assessment.timed_out {
        return Err("Agent timed out".to_string());
    }
    if assessment.parse_quality == ParseQuality::Failed {
        return Err("Invalid response structure: no alert list in response".to_string());
    }
    Ok(())
}

/// Call `op` until its output passes `validate`, at most `max_attempts` times.
///
/// Errors and validator rejections both consume an attempt. An interrupt,
/// whether signalled on `interrupt` or returned by `op`, ends the loop at once.
pub async fn run_agent_with_retry<T, F, Fut, V>(
    agent: &str,
    max_attempts: u32,
    interrupt: &CancellationToken,
    mut op: F,
    validate: V,
) -> Result<T, AgentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AgentError>>,
    V: Fn(&T) -> Result<(), String>,
{
    let attempts = max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if interrupt.is_cancelled() {
            return Err(AgentError::Interrupted);
        }
        let invocation = Uuid::new_v4();
        let result = tokio::select! {
            biased;
            _ = interrupt.cancelled() => return Err(AgentError::Interrupted),
            result = op() => result,
        };

        match result {
            Ok(value) => match validate(&value) {
                Ok(()) => {
                    if attempt > 1 {
                        info!(agent, attempt, %invocation, "Agent succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(reason) => {
                    warn!(
                        agent,
                        attempt,
                        max_attempts = attempts,
                        %invocation,
                        reason = %reason,
                        "Agent output rejected"
                    );
                    last_error = reason;
                }
            },
            Err(e) if e.is_interrupt() => return Err(e),
            Err(e) => {
                warn!(
                    agent,
                    attempt,
                    max_attempts = attempts,
                    %invocation,
                    error = %e,
                    "Agent call failed"
                );
                last_error = e.to_string();
            }
        }
    }

    Err(AgentError::Exhausted {
        agent: agent.to_string(),
        attempts,
        last_error,
    })
}
