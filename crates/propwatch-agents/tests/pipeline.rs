//! Full agent chain over a routed scripted host.
//!
//! The host picks its reply from the prompt content, so the two teams'
//! concurrent chains get deterministic answers regardless of scheduling.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use propwatch_agents::test_support::{arsenal_fixture, local_call, text_response};
use propwatch_agents::{
    sport_prompts, AgentError, AgentPipeline, AnalystAgent, HostRequest, HostResponse, ModelHost,
    RemoteTool, ResearchAgent, RosterTool, SamplingConfig, SessionLimits, SharkAgent,
    ToolCallingSession, ToolRegistry, Role, ROSTER_TOOL_NAME,
};
use propwatch_models::{AlertLevel, RosterEntry};
use propwatch_store::SqliteStore;
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RoutedHost {
    roster_results: Mutex<Vec<String>>,
}

fn research_json(team: &str) -> String {
    match team {
        "Arsenal" => json!({
            "description": "Gyokeres is ruled out with a hamstring injury.",
            "confirmed_out": [{"player_name": "Viktor Gyökeres", "injury": "hamstring"}]
        }),
        _ => json!({"description": "Brentford have a fully fit squad."}),
    }
    .to_string()
}

#[async_trait]
impl ModelHost for RoutedHost {
    fn name(&self) -> &str {
        "routed"
    }

    async fn respond(&self, request: &HostRequest) -> Result<HostResponse, AgentError> {
        let user = request
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if let Some(team) = ["Arsenal", "Brentford"]
            .into_iter()
            .find(|t| user.starts_with(&format!("Research team news for {t}.")))
        {
            // first turn asks for the roster, second answers
            if let Some(result) = request.messages.iter().find(|m| m.role == Role::Tool) {
                self.roster_results.lock().unwrap().push(result.content.clone());
                return Ok(text_response(&research_json(team)));
            }
            return Ok(HostResponse {
                tool_requests: vec![local_call(
                    &format!("call_{team}"),
                    ROSTER_TOOL_NAME,
                    json!({"team": team, "league": "Premier League"}),
                )],
                ..text_response("")
            });
        }

        if user.contains("Analyse Arsenal") {
            return Ok(text_response("**Havertz** leads the line without Gyokeres."));
        }
        if user.contains("Analyse Brentford") {
            return Ok(text_response("## Shape\nUnchanged 4-3-3."));
        }
        if user.contains("Return the alert array.") {
            return Ok(text_response(
                r#"[{"player_name": "Viktor Gyökeres", "alert_level": "high", "reasoning": "Ruled out."},
                    {"player_name": "Kai Havertz", "alert_level": "medium", "reasoning": "Starts at nine."}]"#,
            ));
        }
        Err(AgentError::Parse(format!("unexpected prompt: {user}")))
    }
}

fn roster_store() -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().unwrap();
    let entry = |name: &str, position: &str| RosterEntry {
        player_name: name.to_string(),
        position: Some(position.to_string()),
    };
    store
        .replace_roster(
            "Premier League",
            "Arsenal",
            &[entry("Viktor Gyökeres", "CF"), entry("Kai Havertz", "CF")],
        )
        .unwrap();
    store
        .replace_roster("Premier League", "Brentford", &[entry("Igor Thiago", "CF")])
        .unwrap();
    Arc::new(store)
}

fn pipeline(host: Arc<RoutedHost>) -> AgentPipeline {
    let prompts = sport_prompts("soccer").unwrap();
    let roster = RosterTool::new(roster_store(), 0.75);
    let tools = Arc::new(ToolRegistry::new().register(Arc::new(roster)));
    let base = ToolCallingSession::new(host, SamplingConfig::default(), SessionLimits::default());

    let research = ResearchAgent::new(
        base.clone()
            .with_remote_tools(vec![RemoteTool::WebSearch, RemoteTool::XSearch])
            .with_local_tools(tools),
        prompts.research.clone(),
        7,
    )
    .as_of(NaiveDate::from_ymd_opt(2025, 12, 10).unwrap());
    let analyst = AnalystAgent::new(
        base.clone().with_remote_tools(vec![RemoteTool::WebSearch]),
        prompts.analyst.clone(),
    );
    let shark = SharkAgent::new(base, prompts.shark.clone());

    AgentPipeline::new(Arc::new(research), Arc::new(analyst), Arc::new(shark), 3)
}

#[tokio::test]
async fn fixture_produces_deduplicated_alerts() {
    let host = Arc::new(RoutedHost::default());
    let output = pipeline(host.clone())
        .run_fixture(&arsenal_fixture(), &CancellationToken::new())
        .await
        .unwrap();

    let alerts: Vec<(&str, AlertLevel)> = output
        .alerts
        .iter()
        .map(|a| (a.player_name.as_str(), a.level))
        .collect();
    assert_eq!(
        alerts,
        vec![("Viktor Gyökeres", AlertLevel::High), ("Kai Havertz", AlertLevel::Medium)]
    );

    let [arsenal, brentford] = &output.reports;
    assert_eq!(arsenal.research.findings.confirmed_out.len(), 1);
    assert_eq!(arsenal.analysis.analysis, "Havertz leads the line without Gyokeres.");
    assert_eq!(brentford.analysis.analysis, "Shape\nUnchanged 4-3-3.");

    let rosters = host.roster_results.lock().unwrap().clone();
    assert_eq!(rosters.len(), 2);
    assert!(rosters.iter().any(|r| r.contains("Kai Havertz")));
    assert!(rosters.iter().any(|r| r.contains("Igor Thiago")));

    // research took two turns with one local call each team
    let research_usage = &output.usage.agent_usages[0];
    assert_eq!(research_usage.turns, 2);
    assert_eq!(research_usage.tool_call_totals().local, 1);
    assert_eq!(output.usage.agent_usages.len(), 5);
}

#[tokio::test]
async fn malformed_fixture_is_rejected() {
    let host = Arc::new(RoutedHost::default());
    let mut fixture = arsenal_fixture();
    fixture.name = "Arsenal - Brentford".to_string();
    let err = pipeline(host)
        .run_fixture(&fixture, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidFixture(_)));
}
