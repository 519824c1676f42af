use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use propwatch_models::{ParseQuality, ResearchFindings, ResearchReport, TeamContext};
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::host::Message;
use crate::parser::{parse_two_tier, JsonShape};
use crate::prompts::AgentPrompt;
use crate::session::ToolCallingSession;

pub fn research_agent_name(team: &str) -> String {
    format!("Research Agent ({team})")
}

/// Gathers availability news for one team. Mockable for testing.
#[async_trait]
pub trait TeamResearcher: Send + Sync {
    async fn research(&self, context: &TeamContext) -> Result<ResearchFindings, AgentError>;
}

/// Research agent backed by a tool-calling session with web/X search and
/// the roster lookup.
///
/// A response that cannot be parsed is returned with an empty report and
/// [`ParseQuality::Failed`], not as an error, so the caller's validator
/// decides whether to retry.
pub struct ResearchAgent {
    session: ToolCallingSession,
    prompt: Arc<dyn AgentPrompt>,
    lookback_days: u32,
    today: Option<NaiveDate>,
}

impl ResearchAgent {
    pub fn new(
        session: ToolCallingSession,
        prompt: Arc<dyn AgentPrompt>,
        lookback_days: u32,
    ) -> Self {
        Self {
            session,
            prompt,
            lookback_days,
            today: None,
        }
    }

    /// Pin the date used for the lookback window.
    pub fn as_of(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn user_prompt(&self, context: &TeamContext) -> Result<String, AgentError> {
        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let start = today - ChronoDuration::days(i64::from(self.lookback_days));
        self.prompt.render_user(&[
            ("team", context.team.clone()),
            ("lookback_days", self.lookback_days.to_string()),
            ("start_lookback_date", start.format("%Y-%m-%d").to_string()),
            ("current_date", today.format("%Y-%m-%d").to_string()),
        ])
    }
}

#[async_trait]
impl TeamResearcher for ResearchAgent {
    async fn research(&self, context: &TeamContext) -> Result<ResearchFindings, AgentError> {
        let started = Instant::now();
        let agent = research_agent_name(&context.team);
        let messages = vec![
            Message::system(self.prompt.system_prompt()),
            Message::user(self.user_prompt(context)?),
        ];

        let outcome = self.session.run_with_deadline(messages).await?;
        let usage = outcome.agent_usage(&agent, started);

        let (findings, parse_quality) = if outcome.timed_out {
            (ResearchReport::default(), ParseQuality::Failed)
        } else {
            let parsed = parse_two_tier::<ResearchReport>(&outcome.text, JsonShape::Object);
            match parsed.quality {
                ParseQuality::Strict => {}
                ParseQuality::Recovered => {
                    debug!(agent = %agent, reason = ?parsed.error, "Research JSON recovered")
                }
                ParseQuality::Failed => {
                    warn!(agent = %agent, reason = ?parsed.error, "Research response unparseable")
                }
            }
            (parsed.value.unwrap_or_default(), parsed.quality)
        };

        info!(
            agent = %agent,
            confirmed_out = findings.confirmed_out.len(),
            questionable = findings.questionable.len(),
            returning = findings.returned_to_training.len(),
            citations = outcome.citations.len(),
            quality = ?parse_quality,
            elapsed_ms = usage.elapsed_ms,
            "Research complete"
        );

        Ok(ResearchFindings {
            team: context.team.clone(),
            fixture: context.fixture.clone(),
            findings,
            citations: outcome.citations,
            usage,
            parse_quality,
            timed_out: outcome.timed_out,
        })
    }
}
