use serde::{Deserialize, Serialize};

use crate::alert::PlayerAlert;
use crate::fixture::TeamContext;
use crate::usage::AgentUsage;

/// How a model response was turned into a typed value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParseQuality {
    /// The whole response parsed as the expected JSON.
    Strict,
    /// JSON was recovered from surrounding prose or a markdown block.
    Recovered,
    /// Nothing usable; the value carries empty defaults.
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerStatus {
    pub player_name: String,
    #[serde(default)]
    pub injury: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ManagerComment {
    #[serde(default)]
    pub source: String,
    pub comment: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Speculation {
    #[serde(default)]
    pub source: String,
    pub speculation: String,
}

/// Structured research payload returned by the research agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResearchReport {
    /// Narrative summary. Required for the report to be usable.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub full_active_roster: Vec<String>,
    #[serde(default)]
    pub confirmed_out: Vec<PlayerStatus>,
    #[serde(default)]
    pub questionable: Vec<PlayerStatus>,
    #[serde(default)]
    pub returned_to_training: Vec<PlayerStatus>,
    #[serde(default)]
    pub manager_comments: Vec<ManagerComment>,
    #[serde(default)]
    pub speculation: Vec<Speculation>,
}

impl ResearchReport {
    pub fn has_description(&self) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }

    /// Total number of players placed in any category.
    pub fn flagged_players(&self) -> usize {
        self.confirmed_out.len() + self.questionable.len() + self.returned_to_training.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchFindings {
    pub team: String,
    pub fixture: String,
    pub findings: ResearchReport,
    pub citations: Vec<String>,
    pub usage: AgentUsage,
    pub parse_quality: ParseQuality,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamAnalysis {
    pub team: String,
    pub opponent: String,
    pub fixture: String,
    /// Tactical narrative with markup removed.
    pub analysis: String,
    pub citations: Vec<String>,
    pub usage: AgentUsage,
    pub timed_out: bool,
}

impl TeamAnalysis {
    pub fn has_analysis(&self) -> bool {
        !self.analysis.trim().is_empty()
    }
}

/// Everything gathered about one side of a fixture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamReport {
    pub context: TeamContext,
    pub research: ResearchFindings,
    pub analysis: TeamAnalysis,
}

/// Whole-fixture assessment over both teams' reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureAssessment {
    pub fixture: String,
    /// Ordered as returned, at most one entry per player.
    pub alerts: Vec<PlayerAlert>,
    pub parse_quality: ParseQuality,
    pub citations: Vec<String>,
    pub usage: AgentUsage,
    pub timed_out: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_parses_with_missing_lists() {
        let json = r#"{
            "description": "Arsenal have two absentees.",
            "confirmed_out": [{"player_name": "Ben White", "injury": "knee", "sources": ["bbc.co.uk"]}]
        }"#;
        let report: ResearchReport = serde_json::from_str(json).unwrap();
        assert!(report.has_description());
        assert_eq!(report.confirmed_out[0].injury.as_deref(), Some("knee"));
        assert!(report.questionable.is_empty());
        assert_eq!(report.flagged_players(), 1);
    }

    #[test]
    fn blank_description_is_missing() {
        let report = ResearchReport {
            description: Some("   ".into()),
            ..Default::default()
        };
        assert!(!report.has_description());
        assert!(!ResearchReport::default().has_description());
    }
}
