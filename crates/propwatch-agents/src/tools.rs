use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use propwatch_models::IdentityMatcher;
use propwatch_store::{RosterSource, StoreError};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::host::ToolDescriptor;

pub const ROSTER_TOOL_NAME: &str = "get_active_roster";

/// A tool the caller executes when the model asks for it.
///
/// Failures are reported inside the returned string so the model can react;
/// a tool never aborts the session.
#[async_trait]
pub trait LocalTool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn execute(&self, arguments: &Value) -> String;
}

/// Named local tools bound for a session. Read-only once built.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn LocalTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, tool: Arc<dyn LocalTool>) -> Self {
        let name = tool.descriptor().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Replacing previously registered tool");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn LocalTool>> {
        self.tools.get(name)
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

const SUGGESTED_SOURCES: [&str; 3] = [
    "transfermarkt.com squad page",
    "us.soccerway.com team page",
    "official club website first-team squad",
];

/// Looks up a team's current squad from the synced roster tables.
///
/// League and team names from the model are resolved against known names,
/// exact (case-insensitive) first, then fuzzily.
pub struct RosterTool {
    source: Arc<dyn RosterSource>,
    matcher: IdentityMatcher,
}

enum Lookup {
    Found {
        league: String,
        team: String,
        players: Vec<propwatch_models::RosterEntry>,
    },
    NotFound {
        reason: &'static str,
        message: String,
    },
}

impl RosterTool {
    pub fn new(source: Arc<dyn RosterSource>, threshold: f64) -> Self {
        Self {
            source,
            matcher: IdentityMatcher::new(threshold),
        }
    }

    fn resolve<'a>(&self, wanted: &str, known: &'a [String]) -> Option<&'a str> {
        if let Some(exact) = known.iter().find(|k| k.eq_ignore_ascii_case(wanted.trim())) {
            return Some(exact);
        }
        self.matcher
            .find_best_match(wanted, known.iter().map(String::as_str))
            .map(|(name, _)| name)
    }

    async fn lookup(&self, team: &str, league: Option<&str>) -> Result<Lookup, StoreError> {
        let leagues = self.source.leagues().await?;
        let candidates: Vec<&str> = match league {
            Some(wanted) => match self.resolve(wanted, &leagues) {
                Some(resolved) => vec![resolved],
                None => {
                    return Ok(Lookup::NotFound {
                        reason: "league_not_found",
                        message: format!(
                            "No roster data for league '{wanted}'. Known leagues: {}",
                            leagues.join(", ")
                        ),
                    })
                }
            },
            None => leagues.iter().map(String::as_str).collect(),
        };

        for league in candidates {
            let teams = self.source.teams_in_league(league).await?;
            let Some(resolved) = self.resolve(team, &teams) else {
                continue;
            };
            let players = self.source.active_roster(league, resolved).await?;
            if players.is_empty() {
                return Ok(Lookup::NotFound {
                    reason: "empty_roster",
                    message: format!("Roster for '{resolved}' in {league} has no players"),
                });
            }
            return Ok(Lookup::Found {
                league: league.to_string(),
                team: resolved.to_string(),
                players,
            });
        }

        Ok(Lookup::NotFound {
            reason: "team_not_found",
            message: format!("No roster data for team '{team}'"),
        })
    }
}

fn not_found_payload(team: &str, league: Option<&str>, reason: &str, message: String) -> Value {
    json!({
        "team": team,
        "league": league,
        "player_count": 0,
        "players": [],
        "roster_not_found": true,
        "reason": reason,
        "message": message,
        "suggested_sources": SUGGESTED_SOURCES,
        "search_suggestions": [
            format!("{team} squad list 2025/26"),
            format!("{team} first team players site:transfermarkt.com"),
        ],
    })
}

#[async_trait]
impl LocalTool for RosterTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: ROSTER_TOOL_NAME.to_string(),
            description: "Get the current active roster for a team. Use this to verify a player \
                          is on the squad before reporting on them."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "team": {"type": "string", "description": "Team name, e.g. 'Arsenal'"},
                    "league": {"type": "string", "description": "League name, e.g. 'Premier League'"}
                },
                "required": ["team"]
            }),
        }
    }

    async fn execute(&self, arguments: &Value) -> String {
        let team = arguments
            .get("team")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        let league = arguments
            .get("league")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|l| !l.is_empty());

        let payload = if team.is_empty() {
            let mut p = not_found_payload(
                team,
                league,
                "invalid_arguments",
                "A 'team' argument is required".to_string(),
            );
            p["error"] = json!("missing team argument");
            p
        } else {
            match self.lookup(team, league).await {
                Ok(Lookup::Found {
                    league,
                    team,
                    players,
                }) => {
                    debug!(team = %team, league = %league, players = players.len(), "Roster found");
                    json!({
                        "team": team,
                        "league": league,
                        "player_count": players.len(),
                        "players": players
                            .iter()
                            .map(|p| json!({"name": p.player_name, "position": p.position}))
                            .collect::<Vec<_>>(),
                    })
                }
                Ok(Lookup::NotFound { reason, message }) => {
                    debug!(team, reason, "Roster not found");
                    not_found_payload(team, league, reason, message)
                }
                Err(e) => {
                    warn!(team, error = %e, "Roster lookup failed");
                    let mut p = not_found_payload(
                        team,
                        league,
                        "lookup_error",
                        "Roster lookup failed; verify the squad from the suggested sources"
                            .to_string(),
                    );
                    p["error"] = json!(e.to_string());
                    p
                }
            }
        };
        payload.to_string()
    }
}
