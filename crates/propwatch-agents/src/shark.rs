use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Local;
use propwatch_models::{
    normalize_name, AlertLevel, FixtureAssessment, ParseQuality, PlayerAlert, TeamReport,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::AgentError;
use crate::host::Message;
use crate::parser::{parse_two_tier, JsonShape};
use crate::prompts::AgentPrompt;
use crate::session::ToolCallingSession;

pub fn shark_agent_name(fixture: &str) -> String {
    format!("Shark Agent ({fixture})")
}

/// Decides alerts for a whole fixture from both teams' reports.
///
/// Seeing both sides in one call is what keeps a player from being alerted
/// twice; there is no later dedup pass. Mockable for testing.
#[async_trait]
pub trait FixtureAssessor: Send + Sync {
    async fn assess_fixture(
        &self,
        reports: &[TeamReport; 2],
    ) -> Result<FixtureAssessment, AgentError>;
}

pub struct SharkAgent {
    session: ToolCallingSession,
    prompt: Arc<dyn AgentPrompt>,
}

impl SharkAgent {
    pub fn new(session: ToolCallingSession, prompt: Arc<dyn AgentPrompt>) -> Self {
        Self { session, prompt }
    }

    fn user_prompt(&self, reports: &[TeamReport; 2]) -> Result<String, AgentError> {
        let [home, away] = reports;
        let injury_report = |report: &TeamReport| -> Result<String, AgentError> {
            Ok(serde_json::to_string_pretty(&report.research.findings)?)
        };
        self.prompt.render_user(&[
            ("fixture", home.context.fixture.clone()),
            (
                "fixture_date",
                home.context.fixture_datetime.format("%Y-%m-%d %H:%M").to_string(),
            ),
            ("team", home.context.team.clone()),
            ("opponent", home.context.opponent.clone()),
            ("team_injury_report", injury_report(home)?),
            ("opponent_injury_report", injury_report(away)?),
            ("team_tactical_analysis", home.analysis.analysis.clone()),
            ("opponent_tactical_analysis", away.analysis.analysis.clone()),
            ("current_date", Local::now().format("%Y-%m-%d").to_string()),
        ])
    }
}

#[derive(Debug, Deserialize)]
struct RawAlert {
    #[serde(default)]
    player_name: String,
    #[serde(default)]
    alert_level: String,
    #[serde(default, alias = "rationale")]
    reasoning: String,
}

/// A single alert sometimes comes back as a bare object instead of an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAlerts {
    Many(Vec<RawAlert>),
    One(RawAlert),
}

impl RawAlerts {
    /// `None` for a lone object that names no player.
    fn into_vec(self) -> Option<Vec<RawAlert>> {
        match self {
            RawAlerts::Many(items) => Some(items),
            RawAlerts::One(item) if item.player_name.trim().is_empty() => None,
            RawAlerts::One(item) => Some(vec![item]),
        }
    }
}

/// Array first, then a lone alert object.
fn parse_alerts(text: &str) -> (Vec<RawAlert>, ParseQuality, Option<String>) {
    let parsed = match parse_two_tier::<RawAlerts>(text, JsonShape::Array) {
        p if p.quality == ParseQuality::Failed => {
            parse_two_tier::<RawAlerts>(text, JsonShape::Object)
        }
        p => p,
    };
    match parsed.value.and_then(RawAlerts::into_vec) {
        Some(items) => (items, parsed.quality, parsed.error),
        None => (
            Vec::new(),
            ParseQuality::Failed,
            parsed
                .error
                .or_else(|| Some("alert object without a player name".to_string())),
        ),
    }
}

fn parse_level(raw: &str, player: &str, agent: &str) -> AlertLevel {
    if raw.trim().is_empty() {
        warn!(agent = %agent, player = %player, "Alert without a level, using low");
        return AlertLevel::Low;
    }
    raw.parse::<AlertLevel>().unwrap_or_else(|e| {
        warn!(agent = %agent, player = %player, error = %e, "Unknown alert level, using low");
        AlertLevel::Low
    })
}

/// One alert per player: a repeated name (after normalization) keeps the
/// higher level in the first entry's position.
fn to_alerts(raw: Vec<RawAlert>, report: &TeamReport, agent: &str) -> Vec<PlayerAlert> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut alerts: Vec<PlayerAlert> = Vec::with_capacity(raw.len());
    for item in raw {
        let player_name = item.player_name.trim().to_string();
        let key = normalize_name(&player_name);
        if key.is_empty() {
            warn!(agent = %agent, "Alert without a player name, skipping");
            continue;
        }
        let level = parse_level(&item.alert_level, &player_name, agent);
        if !level.is_alert() {
            continue;
        }
        let alert = PlayerAlert {
            player_name,
            fixture: report.context.fixture.clone(),
            fixture_datetime: report.context.fixture_datetime,
            level,
            rationale: item.reasoning.trim().to_string(),
        };
        match seen.get(&key) {
            Some(&i) => {
                warn!(
                    agent = %agent,
                    player = %alert.player_name,
                    kept = %alerts[i].player_name,
                    "Player alerted more than once, keeping the higher level"
                );
                if alert.level > alerts[i].level {
                    alerts[i] = alert;
                }
            }
            None => {
                seen.insert(key, alerts.len());
                alerts.push(alert);
            }
        }
    }
    alerts
}

#[async_trait]
impl FixtureAssessor for SharkAgent {
    async fn assess_fixture(
        &self,
        reports: &[TeamReport; 2],
    ) -> Result<FixtureAssessment, AgentError> {
        let started = Instant::now();
        let fixture = reports[0].context.fixture.clone();
        let agent = shark_agent_name(&fixture);
        let messages = vec![
            Message::system(self.prompt.system_prompt()),
            Message::user(self.user_prompt(reports)?),
        ];

        let outcome = self.session.run_with_deadline(messages).await?;
        let usage = outcome.agent_usage(&agent, started);

        let (alerts, parse_quality) = if outcome.timed_out {
            (Vec::new(), ParseQuality::Failed)
        } else {
            let (raw, quality, error) = parse_alerts(&outcome.text);
            if quality == ParseQuality::Failed {
                warn!(agent = %agent, reason = ?error, "Shark response unparseable");
            }
            (to_alerts(raw, &reports[0], &agent), quality)
        };

        info!(
            agent = %agent,
            alerts = alerts.len(),
            high = alerts.iter().filter(|a| a.level == AlertLevel::High).count(),
            quality = ?parse_quality,
            elapsed_ms = usage.elapsed_ms,
            "Fixture assessment complete"
        );

        Ok(FixtureAssessment {
            fixture,
            alerts,
            parse_quality,
            citations: outcome.citations,
            usage,
            timed_out: outcome.timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SamplingConfig;
    use crate::prompts::sport_prompts;
    use crate::session::SessionLimits;
    use crate::test_support::{fixture_reports, text_response, ScriptedHost};

    fn agent(host: Arc<ScriptedHost>) -> SharkAgent {
        let session =
            ToolCallingSession::new(host, SamplingConfig::default(), SessionLimits::default());
        SharkAgent::new(session, sport_prompts("soccer").unwrap().shark)
    }

    #[tokio::test]
    async fn parses_alerts_for_both_teams() {
        let host = Arc::new(ScriptedHost::new(vec![text_response(
            r#"[
                {"player_name": "Viktor Gyökeres", "alert_level": "high", "reasoning": "Ruled out."},
                {"player_name": "Kai Havertz", "alert_level": "MEDIUM", "reasoning": "Starts up front."},
                {"player_name": "Igor Thiago", "alert_level": "no_alert", "reasoning": "Fit."},
                {"player_name": "Kevin Schade", "alert_level": "severe", "reasoning": "Knock."}
            ]"#,
        )]));
        let reports = fixture_reports();
        let assessment = agent(host.clone()).assess_fixture(&reports).await.unwrap();

        assert_eq!(assessment.parse_quality, ParseQuality::Strict);
        let got: Vec<(&str, AlertLevel)> = assessment
            .alerts
            .iter()
            .map(|a| (a.player_name.as_str(), a.level))
            .collect();
        assert_eq!(
            got,
            vec![
                ("Viktor Gyökeres", AlertLevel::High),
                ("Kai Havertz", AlertLevel::Medium),
                ("Kevin Schade", AlertLevel::Low),
            ]
        );
        assert_eq!(assessment.alerts[0].fixture, "Arsenal vs Brentford");
        assert_eq!(assessment.usage.agent, "Shark Agent (Arsenal vs Brentford)");

        let user = &host.requests()[0].messages[1].content;
        assert!(user.contains("=== Arsenal injury report ==="));
        assert!(user.contains("=== Brentford tactical analysis ==="));
    }

    #[tokio::test]
    async fn empty_array_means_no_alerts() {
        let host = Arc::new(ScriptedHost::new(vec![text_response("[]")]));
        let assessment = agent(host).assess_fixture(&fixture_reports()).await.unwrap();
        assert!(assessment.alerts.is_empty());
        assert_eq!(assessment.parse_quality, ParseQuality::Strict);
    }

    #[tokio::test]
    async fn prose_only_is_failed_parse() {
        let host = Arc::new(ScriptedHost::new(vec![text_response(
            "No strong angles this week.",
        )]));
        let assessment = agent(host).assess_fixture(&fixture_reports()).await.unwrap();
        assert!(assessment.alerts.is_empty());
        assert_eq!(assessment.parse_quality, ParseQuality::Failed);
    }

    async fn assess(reply: &str) -> FixtureAssessment {
        let host = Arc::new(ScriptedHost::new(vec![text_response(reply)]));
        agent(host).assess_fixture(&fixture_reports()).await.unwrap()
    }

    fn levels(assessment: &FixtureAssessment) -> Vec<(&str, AlertLevel)> {
        assessment
            .alerts
            .iter()
            .map(|a| (a.player_name.as_str(), a.level))
            .collect()
    }

    #[tokio::test]
    async fn repeated_player_keeps_one_alert() {
        let assessment = assess(
            r#"[
                {"player_name": "Viktor Gyökeres", "alert_level": "medium", "reasoning": "Doubt."},
                {"player_name": "Kai Havertz", "alert_level": "medium", "reasoning": "Starts."},
                {"player_name": "Viktor Gyokeres", "alert_level": "high", "reasoning": "Out."},
                {"player_name": "kai havertz", "alert_level": "low", "reasoning": "Bench."}
            ]"#,
        )
        .await;
        assert_eq!(
            levels(&assessment),
            vec![
                ("Viktor Gyokeres", AlertLevel::High),
                ("Kai Havertz", AlertLevel::Medium),
            ]
        );
        assert_eq!(assessment.alerts[0].rationale, "Out.");
        assert_eq!(assessment.alerts[1].rationale, "Starts.");
    }

    #[tokio::test]
    async fn missing_level_defaults_to_low() {
        let assessment = assess(
            r#"[
                {"player_name": "Viktor Gyökeres", "alert_level": "high", "reasoning": "Out."},
                {"player_name": "Kevin Schade", "reasoning": "Knock."},
                {"alert_level": "high", "reasoning": "No name."}
            ]"#,
        )
        .await;
        assert_eq!(assessment.parse_quality, ParseQuality::Strict);
        assert_eq!(
            levels(&assessment),
            vec![
                ("Viktor Gyökeres", AlertLevel::High),
                ("Kevin Schade", AlertLevel::Low),
            ]
        );
    }

    #[tokio::test]
    async fn bare_object_is_one_alert() {
        let assessment =
            assess(r#"{"player_name": "Viktor Gyökeres", "alert_level": "high"}"#).await;
        assert_eq!(assessment.parse_quality, ParseQuality::Strict);
        assert_eq!(levels(&assessment), vec![("Viktor Gyökeres", AlertLevel::High)]);

        let assessment = assess(concat!(
            "Only one angle:\n```json\n",
            r#"{"player_name": "Kai Havertz", "alert_level": "medium"}"#,
            "\n```"
        ))
        .await;
        assert_eq!(assessment.parse_quality, ParseQuality::Recovered);
        assert_eq!(levels(&assessment), vec![("Kai Havertz", AlertLevel::Medium)]);
    }

    #[tokio::test]
    async fn object_without_player_is_failed_parse() {
        let assessment = assess(r#"{"summary": "nothing to flag"}"#).await;
        assert!(assessment.alerts.is_empty());
        assert_eq!(assessment.parse_quality, ParseQuality::Failed);
    }
}
