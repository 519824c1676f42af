//! Scripted hosts, tools and agents for exercising the session and the
//! pipeline without a live model.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use propwatch_models::{
    AgentUsage, AlertLevel, Fixture, FixtureAssessment, ParseQuality, PlayerAlert,
    ResearchFindings, ResearchReport, RunContext, TeamAnalysis, TeamContext, TeamReport,
    TokenUsage, TurnToolCalls,
};
use serde_json::Value;

use crate::error::AgentError;
use crate::host::{
    HostRequest, HostResponse, ModelHost, Role, ToolDescriptor, ToolKind, ToolRequest,
};
use crate::orchestrator::AlertGenerator;
use crate::research::TeamResearcher;
use crate::analyst::TeamAnalyst;
use crate::shark::FixtureAssessor;
use crate::tools::LocalTool;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Final-turn response with fixed token usage (10 total).
pub fn text_response(text: &str) -> HostResponse {
    HostResponse {
        text: text.to_string(),
        citations: Vec::new(),
        usage: TokenUsage {
            prompt_tokens: 6,
            completion_tokens: 4,
            reasoning_tokens: 0,
            total_tokens: 10,
        },
        tool_requests: Vec::new(),
    }
}

pub fn local_call(id: &str, name: &str, arguments: Value) -> ToolRequest {
    ToolRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
        kind: ToolKind::Local,
    }
}

pub fn remote_call(id: &str, name: &str) -> ToolRequest {
    ToolRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments: Value::Null,
        kind: ToolKind::Remote,
    }
}

/// Host that replays a fixed script of responses and records every request.
pub struct ScriptedHost {
    script: Mutex<VecDeque<Result<HostResponse, AgentError>>>,
    requests: Mutex<Vec<HostRequest>>,
    delay: Option<Duration>,
}

impl ScriptedHost {
    pub fn new(responses: Vec<HostResponse>) -> Self {
        Self::from_results(responses.into_iter().map(Ok).collect())
    }

    pub fn from_results(results: Vec<Result<HostResponse, AgentError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn failing(error: AgentError) -> Self {
        Self::from_results(vec![Err(error)])
    }

    /// Sleep before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<HostRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl ModelHost for ScriptedHost {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn respond(&self, request: &HostRequest) -> Result<HostResponse, AgentError> {
        lock(&self.requests).push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::Parse("scripted host has no more responses".into())))
    }
}

/// Host that answers by the user prompt: the first route whose needle appears
/// in the user message wins. Order-independent, so concurrent chains work.
pub struct RoutedHost {
    routes: Vec<(String, String)>,
    requests: Mutex<Vec<HostRequest>>,
}

impl RoutedHost {
    pub fn new(routes: Vec<(&str, &str)>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(|(needle, reply)| (needle.to_string(), reply.to_string()))
                .collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HostRequest> {
        lock(&self.requests).clone()
    }

    /// Requests whose user message contains `needle`.
    pub fn requests_for(&self, needle: &str) -> Vec<HostRequest> {
        self.requests()
            .into_iter()
            .filter(|r| user_message(r).contains(needle))
            .collect()
    }
}

fn user_message(request: &HostRequest) -> &str {
    request
        .messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

#[async_trait]
impl ModelHost for RoutedHost {
    fn name(&self) -> &str {
        "routed"
    }

    async fn respond(&self, request: &HostRequest) -> Result<HostResponse, AgentError> {
        lock(&self.requests).push(request.clone());
        let user = user_message(request);
        self.routes
            .iter()
            .find(|(needle, _)| user.contains(needle.as_str()))
            .map(|(_, reply)| text_response(reply))
            .ok_or_else(|| AgentError::Parse(format!("no route for prompt: {user}")))
    }
}

/// Local tool that returns a fixed reply and records its arguments.
pub struct RecordingTool {
    name: String,
    reply: String,
    calls: Mutex<Vec<Value>>,
}

impl RecordingTool {
    pub fn new(name: &str, reply: &str) -> Self {
        Self {
            name: name.to_string(),
            reply: reply.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Value> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl LocalTool for RecordingTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: format!("Recording tool {}", self.name),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    async fn execute(&self, arguments: &Value) -> String {
        lock(&self.calls).push(arguments.clone());
        self.reply.clone()
    }
}

pub fn kickoff() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 12, 13)
        .and_then(|d| d.and_hms_opt(15, 0, 0))
        .unwrap_or_default()
}

pub fn arsenal_fixture() -> Fixture {
    Fixture::new("Arsenal vs Brentford", kickoff()).with_league("Premier League")
}

pub fn arsenal_context() -> TeamContext {
    TeamContext {
        team: "Arsenal".to_string(),
        opponent: "Brentford".to_string(),
        fixture: "Arsenal vs Brentford".to_string(),
        fixture_datetime: kickoff(),
        league: Some("Premier League".to_string()),
    }
}

pub fn usage(agent: &str) -> AgentUsage {
    AgentUsage {
        agent: agent.to_string(),
        tokens: TokenUsage {
            prompt_tokens: 60,
            completion_tokens: 40,
            reasoning_tokens: 0,
            total_tokens: 100,
        },
        turns: 1,
        tool_calls: TurnToolCalls::new(),
        elapsed_ms: 5,
        completed_at: Utc::now(),
    }
}

/// Research for `context`; an empty `description` leaves it unset.
pub fn research_findings(context: &TeamContext, description: &str) -> ResearchFindings {
    ResearchFindings {
        team: context.team.clone(),
        fixture: context.fixture.clone(),
        findings: ResearchReport {
            description: (!description.is_empty()).then(|| description.to_string()),
            ..ResearchReport::default()
        },
        citations: Vec::new(),
        usage: usage(&crate::research::research_agent_name(&context.team)),
        parse_quality: ParseQuality::Strict,
        timed_out: false,
    }
}

pub fn team_analysis(context: &TeamContext, analysis: &str) -> TeamAnalysis {
    TeamAnalysis {
        team: context.team.clone(),
        opponent: context.opponent.clone(),
        fixture: context.fixture.clone(),
        analysis: analysis.to_string(),
        citations: Vec::new(),
        usage: usage(&crate::analyst::analyst_agent_name(&context.team)),
        timed_out: false,
    }
}

/// Both sides of Arsenal vs Brentford with short research and analysis.
pub fn fixture_reports() -> [TeamReport; 2] {
    let fixture = arsenal_fixture();
    let contexts = match TeamContext::pair_for(&fixture) {
        Ok(pair) => pair,
        Err(_) => [arsenal_context(), arsenal_context()],
    };
    contexts.map(|context| TeamReport {
        research: research_findings(&context, &format!("{} availability summary.", context.team)),
        analysis: team_analysis(&context, &format!("{} tactical outlook.", context.team)),
        context,
    })
}

/// Researcher whose first `invalid` calls per team come back without a
/// description.
#[derive(Default)]
pub struct MockResearcher {
    invalid: u32,
    calls: Mutex<HashMap<String, u32>>,
}

impl MockResearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalid_first(mut self, attempts: u32) -> Self {
        self.invalid = attempts;
        self
    }

    pub fn calls_for(&self, team: &str) -> u32 {
        lock(&self.calls).get(team).copied().unwrap_or(0)
    }
}

#[async_trait]
impl TeamResearcher for MockResearcher {
    async fn research(&self, context: &TeamContext) -> Result<ResearchFindings, AgentError> {
        let call = {
            let mut calls = lock(&self.calls);
            let n = calls.entry(context.team.clone()).or_insert(0);
            *n += 1;
            *n
        };
        let description = if call <= self.invalid {
            String::new()
        } else {
            format!("{} availability summary.", context.team)
        };
        Ok(research_findings(context, &description))
    }
}

#[derive(Default)]
pub struct MockAnalyst {
    calls: AtomicU32,
}

impl MockAnalyst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TeamAnalyst for MockAnalyst {
    async fn analyze(
        &self,
        context: &TeamContext,
        research: &ResearchFindings,
    ) -> Result<TeamAnalysis, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let narrative = research.findings.description.clone().unwrap_or_default();
        Ok(team_analysis(context, &format!("Outlook: {narrative}")))
    }
}

/// Assessor that returns fixed alerts and records the teams it was shown.
pub struct MockAssessor {
    alerts: Vec<(String, AlertLevel)>,
    seen: Mutex<Vec<Vec<String>>>,
}

impl MockAssessor {
    pub fn new(alerts: Vec<(&str, AlertLevel)>) -> Self {
        Self {
            alerts: alerts.into_iter().map(|(p, l)| (p.to_string(), l)).collect(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen_teams(&self) -> Vec<Vec<String>> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl FixtureAssessor for MockAssessor {
    async fn assess_fixture(
        &self,
        reports: &[TeamReport; 2],
    ) -> Result<FixtureAssessment, AgentError> {
        lock(&self.seen).push(reports.iter().map(|r| r.context.team.clone()).collect());
        let context = &reports[0].context;
        Ok(FixtureAssessment {
            fixture: context.fixture.clone(),
            alerts: self
                .alerts
                .iter()
                .map(|(player, level)| PlayerAlert {
                    player_name: player.clone(),
                    fixture: context.fixture.clone(),
                    fixture_datetime: context.fixture_datetime,
                    level: *level,
                    rationale: format!("{player} flagged"),
                })
                .collect(),
            parse_quality: ParseQuality::Strict,
            citations: Vec::new(),
            usage: usage(&crate::shark::shark_agent_name(&context.fixture)),
            timed_out: false,
        })
    }
}

/// Alert generator that replays scripted results per call, keyed by fixture.
///
/// Fixtures without a script yield no alerts.
#[derive(Default)]
pub struct MockGenerator {
    scripts: Mutex<HashMap<String, VecDeque<Result<Vec<PlayerAlert>, AgentError>>>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, fixture: &str, results: Vec<Result<Vec<PlayerAlert>, AgentError>>) -> Self {
        lock(&self.scripts).insert(fixture.to_string(), results.into());
        self
    }

    pub fn calls_for(&self, fixture: &str) -> u32 {
        lock(&self.calls).get(fixture).copied().unwrap_or(0)
    }
}

#[async_trait]
impl AlertGenerator for MockGenerator {
    async fn generate(
        &self,
        fixture: &Fixture,
        _run: &RunContext,
    ) -> Result<Vec<PlayerAlert>, AgentError> {
        *lock(&self.calls).entry(fixture.name.clone()).or_insert(0) += 1;
        lock(&self.scripts)
            .get_mut(&fixture.name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Alert for `player` in `fixture` at [`kickoff`].
pub fn player_alert(player: &str, fixture: &str, level: AlertLevel) -> PlayerAlert {
    PlayerAlert {
        player_name: player.to_string(),
        fixture: fixture.to_string(),
        fixture_datetime: kickoff(),
        level,
        rationale: format!("{player} availability changed"),
    }
}
