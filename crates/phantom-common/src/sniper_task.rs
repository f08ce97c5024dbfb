use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hardware configuration a sniper task is bound to, as the raw addon plan
/// codes from the source catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundConfig {
    pub memory: String,
    pub storage: String,
}

/// Matching state of a sniper task.
///
/// `PendingMatch` tasks wait for plan codes that are not yet in the catalog;
/// `Matched` tasks watch a known set of counterpart plan codes. Both end as
/// `Completed` once an order has been queued; the task fires once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    PendingMatch,
    Completed,
}

/// Task-creation mode requested by the operator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SniperMode {
    #[default]
    Matched,
    PendingMatch,
}

/// A configuration-binding sniper task: watch the catalog for plan codes
/// whose memory+storage fingerprint equals the bound configuration, and
/// queue purchase orders when one becomes available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SniperTask {
    pub id: String,

    /// Source plan code whose configuration variant was selected.
    #[serde(rename = "api1_planCode")]
    pub api1_plan_code: String,

    pub bound_config: BoundConfig,

    pub match_status: MatchStatus,

    /// Counterpart plan codes currently being watched (or, for completed
    /// tasks, the codes that were ordered).
    #[serde(default)]
    pub matched_api2: Vec<String>,

    /// Exclusion list for pending-match tasks: plan codes that already
    /// matched at creation time and must not trigger the task.
    #[serde(default)]
    pub known_plancodes: Vec<String>,

    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl SniperTask {
    /// Builds a task from the current catalog matches according to the
    /// requested mode.
    pub fn new(api1_plan_code: String, bound_config: BoundConfig, mode: SniperMode, current_matches: Vec<String>) -> Self {
        let (match_status, matched_api2, known_plancodes) = match mode {
            SniperMode::PendingMatch => (MatchStatus::PendingMatch, Vec::new(), current_matches),
            SniperMode::Matched => {
                if current_matches.is_empty() {
                    (MatchStatus::PendingMatch, Vec::new(), Vec::new())
                } else {
                    (MatchStatus::Matched, current_matches, Vec::new())
                }
            }
        };

        Self {
            id: Uuid::new_v4().to_string(),
            api1_plan_code,
            bound_config,
            match_status,
            matched_api2,
            known_plancodes,
            enabled: true,
            last_check: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BoundConfig {
        BoundConfig {
            memory: "ram-64g-ecc-2400".into(),
            storage: "softraid-2x450nvme".into(),
        }
    }

    #[test]
    fn test_matched_mode_with_matches() {
        let task = SniperTask::new("24rise01".into(), config(), SniperMode::Matched, vec!["24sk40".into()]);
        assert_eq!(task.match_status, MatchStatus::Matched);
        assert_eq!(task.matched_api2, vec!["24sk40".to_string()]);
        assert!(task.known_plancodes.is_empty());
    }

    #[test]
    fn test_matched_mode_without_matches_degrades_to_pending() {
        let task = SniperTask::new("24rise01".into(), config(), SniperMode::Matched, vec![]);
        assert_eq!(task.match_status, MatchStatus::PendingMatch);
    }

    #[test]
    fn test_pending_mode_records_exclusions() {
        let task = SniperTask::new(
            "24rise01".into(),
            config(),
            SniperMode::PendingMatch,
            vec!["24sk40".into(), "24sk50".into()],
        );
        assert_eq!(task.match_status, MatchStatus::PendingMatch);
        assert!(task.matched_api2.is_empty());
        assert_eq!(task.known_plancodes.len(), 2);
    }

    #[test]
    fn test_wire_field_names() {
        let task = SniperTask::new("24rise01".into(), config(), SniperMode::Matched, vec![]);
        let value = serde_json::to_value(&task).unwrap();
        assert!(value.get("api1_planCode").is_some());
        assert!(value.get("match_status").is_some());
        assert_eq!(value["match_status"], "pending_match");
    }
}
