use std::collections::HashMap;

use chrono::{DateTime, Utc};
use propwatch_models::{AlertCandidate, EnrichedRow, IdentityMatcher, ProjectionRow};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    /// One per input row, in input order.
    pub rows: Vec<EnrichedRow>,
    /// Rows that received an alert.
    pub matched: usize,
    /// Rows left at the default level.
    pub unmatched: usize,
    /// Alerts no row claimed, as (fixture, player).
    pub unattributed: Vec<(String, String)>,
}

/// Attaches alerts to projection rows of the same fixture by player name.
///
/// Each alert is consumed by the first row it matches, so it never lands on
/// two rows. Output depends only on the inputs and their order.
pub struct AlertReconciler {
    matcher: IdentityMatcher,
}

fn fixture_key(fixture: &str) -> String {
    fixture.trim().to_lowercase()
}

impl AlertReconciler {
    pub fn new(threshold: f64) -> Self {
        Self {
            matcher: IdentityMatcher::new(threshold),
        }
    }

    pub fn reconcile(
        &self,
        rows: Vec<ProjectionRow>,
        alerts: &[AlertCandidate],
    ) -> ReconcileReport {
        let mut pools: HashMap<String, Vec<&AlertCandidate>> = HashMap::new();
        for alert in alerts {
            pools.entry(fixture_key(&alert.fixture)).or_default().push(alert);
        }

        let mut matched = 0;
        let mut enriched = Vec::with_capacity(rows.len());
        for row in rows {
            let claimed = pools.get_mut(&fixture_key(&row.fixture)).and_then(|pool| {
                let index = pool
                    .iter()
                    .position(|a| self.matcher.is_match(&a.player_name, &row.player_name))?;
                Some(pool.remove(index))
            });

            let mut out = EnrichedRow::unalerted(row);
            if let Some(alert) = claimed {
                debug!(
                    player = %out.row.player_name,
                    alert_player = %alert.player_name,
                    fixture = %out.row.fixture,
                    level = %alert.level,
                    "Alert attached"
                );
                out.alert_level = alert.level;
                out.alert_description = Some(alert.description.clone());
                matched += 1;
            }
            enriched.push(out);
        }

        let mut unattributed: Vec<(String, String)> = pools
            .into_values()
            .flatten()
            .map(|a| (a.fixture.clone(), a.player_name.clone()))
            .collect();
        unattributed.sort();
        for (fixture, player) in &unattributed {
            warn!(fixture = %fixture, player = %player, "Alert matched no projection row");
        }

        ReconcileReport {
            unmatched: enriched.len() - matched,
            rows: enriched,
            matched,
            unattributed,
        }
    }
}

/// Keep only rows carrying an alert.
pub fn filter_alerted(rows: Vec<EnrichedRow>) -> Vec<EnrichedRow> {
    rows.into_iter().filter(|r| r.alert_level.is_alert()).collect()
}

/// Set `enriched_at` on every row, just before writing.
pub fn stamp(rows: &mut [EnrichedRow], at: DateTime<Utc>) {
    for row in rows {
        row.enriched_at = Some(at);
    }
}
