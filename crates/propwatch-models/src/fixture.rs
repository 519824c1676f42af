use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Separator between the two team names in a fixture identifier.
pub const FIXTURE_SEPARATOR: &str = " vs ";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FixtureError {
    #[error("fixture '{0}' is not of the form 'Team A vs Team B'")]
    Malformed(String),

    #[error("could not parse match time '{0}'")]
    MatchTime(String),
}

/// A scheduled match, as listed by the analytics warehouse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fixture {
    /// "Team A vs Team B".
    #[serde(rename = "fixture")]
    pub name: String,
    #[serde(deserialize_with = "deserialize_match_time")]
    pub match_time: NaiveDateTime,
    #[serde(default)]
    pub league: Option<String>,
}

impl Fixture {
    pub fn new(name: impl Into<String>, match_time: NaiveDateTime) -> Self {
        Self {
            name: name.into(),
            match_time,
            league: None,
        }
    }

    pub fn with_league(mut self, league: impl Into<String>) -> Self {
        self.league = Some(league.into());
        self
    }

    /// Split the fixture identifier into (home, away).
    pub fn teams(&self) -> Result<(String, String), FixtureError> {
        split_fixture(&self.name)
    }
}

/// Split "Team A vs Team B" into its two trimmed, non-empty team names.
pub fn split_fixture(fixture: &str) -> Result<(String, String), FixtureError> {
    let mut parts = fixture.split(FIXTURE_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) if !a.trim().is_empty() && !b.trim().is_empty() => {
            Ok((a.trim().to_string(), b.trim().to_string()))
        }
        _ => Err(FixtureError::Malformed(fixture.to_string())),
    }
}

/// Parse a warehouse match time.
///
/// Accepts `2025-12-06T15:00:00`, `2025-12-06 15:00:00` and a bare
/// `2025-12-06`, which is taken as noon.
pub fn parse_match_time(raw: &str) -> Result<NaiveDateTime, FixtureError> {
    let raw = raw.trim();
    let parsed = if raw.contains('T') {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
    } else if raw.contains(' ') {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
    } else {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(|d| {
            d.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default())
        })
    };
    parsed.map_err(|_| FixtureError::MatchTime(raw.to_string()))
}

fn deserialize_match_time<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_match_time(&raw).map_err(serde::de::Error::custom)
}

/// Per-team view of a fixture handed to the research and analyst agents.
///
/// Built twice per fixture run (team and opponent mirrored) and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamContext {
    pub team: String,
    pub opponent: String,
    pub fixture: String,
    pub fixture_datetime: NaiveDateTime,
    pub league: Option<String>,
}

impl TeamContext {
    /// Build the two mirrored contexts for a fixture, home side first.
    pub fn pair_for(fixture: &Fixture) -> Result<[TeamContext; 2], FixtureError> {
        let (home, away) = fixture.teams()?;
        let make = |team: &str, opponent: &str| TeamContext {
            team: team.to_string(),
            opponent: opponent.to_string(),
            fixture: fixture.name.clone(),
            fixture_datetime: fixture.match_time,
            league: fixture.league.clone(),
        };
        Ok([make(&home, &away), make(&away, &home)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kickoff() -> NaiveDateTime {
        parse_match_time("2025-12-13T15:00:00").unwrap()
    }

    #[test]
    fn split_simple_fixture() {
        let (a, b) = split_fixture("Arsenal vs Brentford").unwrap();
        assert_eq!(a, "Arsenal");
        assert_eq!(b, "Brentford");
    }

    #[test]
    fn split_keeps_ampersands_and_spaces() {
        let (a, b) = split_fixture("Liverpool vs Brighton & Hove Albion").unwrap();
        assert_eq!(a, "Liverpool");
        assert_eq!(b, "Brighton & Hove Albion");
    }

    #[test]
    fn split_rejects_malformed() {
        assert!(split_fixture("Arsenal v Brentford").is_err());
        assert!(split_fixture(" vs Brentford").is_err());
        assert!(split_fixture("A vs B vs C").is_err());
    }

    #[test]
    fn match_time_formats() {
        let iso = parse_match_time("2025-12-06T15:00:00").unwrap();
        let spaced = parse_match_time("2025-12-06 15:00:00").unwrap();
        assert_eq!(iso, spaced);

        let date_only = parse_match_time("2025-12-06").unwrap();
        assert_eq!(date_only.format("%H:%M").to_string(), "12:00");

        assert!(parse_match_time("next saturday").is_err());
    }

    #[test]
    fn team_contexts_are_mirrored() {
        let fixture = Fixture::new("Arsenal vs Brentford", kickoff()).with_league("Premier League");
        let [home, away] = TeamContext::pair_for(&fixture).unwrap();

        assert_eq!(home.team, "Arsenal");
        assert_eq!(home.opponent, "Brentford");
        assert_eq!(away.team, "Brentford");
        assert_eq!(away.opponent, "Arsenal");
        assert_eq!(home.fixture, away.fixture);
        assert_eq!(away.league.as_deref(), Some("Premier League"));
    }

    #[test]
    fn fixture_from_warehouse_json() {
        let json = r#"{"fixture": "Arsenal vs Brentford", "match_time": "2025-12-13 15:00:00", "league": "Premier League"}"#;
        let fixture: Fixture = serde_json::from_str(json).unwrap();
        assert_eq!(fixture.name, "Arsenal vs Brentford");
        assert_eq!(fixture.match_time, kickoff());
    }
}
