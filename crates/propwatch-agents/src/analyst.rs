use std::sync::{Arc, OnceLock};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Local;
use propwatch_models::{ResearchFindings, TeamAnalysis, TeamContext};
use regex::Regex;
use tracing::info;

use crate::error::AgentError;
use crate::host::Message;
use crate::prompts::AgentPrompt;
use crate::session::ToolCallingSession;

pub fn analyst_agent_name(team: &str) -> String {
    format!("Analyst Agent ({team})")
}

/// Turns one team's research into a tactical narrative. Mockable for testing.
#[async_trait]
pub trait TeamAnalyst: Send + Sync {
    async fn analyze(
        &self,
        context: &TeamContext,
        research: &ResearchFindings,
    ) -> Result<TeamAnalysis, AgentError>;
}

/// Analyst backed by a session with remote search only.
pub struct AnalystAgent {
    session: ToolCallingSession,
    prompt: Arc<dyn AgentPrompt>,
}

impl AnalystAgent {
    pub fn new(session: ToolCallingSession, prompt: Arc<dyn AgentPrompt>) -> Self {
        Self { session, prompt }
    }
}

#[async_trait]
impl TeamAnalyst for AnalystAgent {
    async fn analyze(
        &self,
        context: &TeamContext,
        research: &ResearchFindings,
    ) -> Result<TeamAnalysis, AgentError> {
        let started = Instant::now();
        let agent = analyst_agent_name(&context.team);
        let user = self.prompt.render_user(&[
            ("team", context.team.clone()),
            ("opponent", context.opponent.clone()),
            ("fixture", context.fixture.clone()),
            ("fixture_date", context.fixture_datetime.format("%Y-%m-%d %H:%M").to_string()),
            ("research", research.findings.description.clone().unwrap_or_default()),
            ("current_date", Local::now().format("%Y-%m-%d").to_string()),
        ])?;

        let outcome = self
            .session
            .run_with_deadline(vec![
                Message::system(self.prompt.system_prompt()),
                Message::user(user),
            ])
            .await?;
        let usage = outcome.agent_usage(&agent, started);
        let analysis = strip_markup(&outcome.text);

        info!(
            agent = %agent,
            chars = analysis.len(),
            timed_out = outcome.timed_out,
            elapsed_ms = usage.elapsed_ms,
            "Analysis complete"
        );

        Ok(TeamAnalysis {
            team: context.team.clone(),
            opponent: context.opponent.clone(),
            fixture: context.fixture.clone(),
            analysis,
            citations: outcome.citations,
            usage,
            timed_out: outcome.timed_out,
        })
    }
}

struct MarkupPatterns {
    bold: Regex,
    underscore_bold: Regex,
    italic: Regex,
    heading: Regex,
}

fn markup_patterns() -> Option<&'static MarkupPatterns> {
    static PATTERNS: OnceLock<Option<MarkupPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(MarkupPatterns {
                bold: Regex::new(r"\*\*(.+?)\*\*").ok()?,
                underscore_bold: Regex::new(r"__(.+?)__").ok()?,
                italic: Regex::new(r"\*([^*\n]+)\*").ok()?,
                heading: Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+").ok()?,
            })
        })
        .as_ref()
}

/// Remove bold, italic and heading markup, keeping the text.
pub fn strip_markup(text: &str) -> String {
    let Some(p) = markup_patterns() else {
        return text.trim().to_string();
    };
    let out = p.bold.replace_all(text, "$1");
    let out = p.underscore_bold.replace_all(&out, "$1");
    let out = p.italic.replace_all(&out, "$1");
    let out = p.heading.replace_all(&out, "");
    out.trim().to_string()
}
