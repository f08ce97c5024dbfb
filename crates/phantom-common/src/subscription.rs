use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How many availability changes are kept per subscription.
pub const SUBSCRIPTION_HISTORY_CAP: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Available,
    Unavailable,
}

/// One observed availability transition for a monitored plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityChange {
    pub timestamp: DateTime<Utc>,
    pub datacenter: String,
    /// Raw availability string reported by the upstream API.
    pub status: String,
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_status: Option<String>,
}

/// A monitored plan code. Keyed by `plan_code`; adding the same plan again
/// updates the existing subscription in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub plan_code: String,

    /// Datacenters to watch; empty means every datacenter the plan reports.
    #[serde(default)]
    pub datacenters: Vec<String>,

    #[serde(default = "default_true")]
    pub notify_available: bool,

    #[serde(default)]
    pub notify_unavailable: bool,

    /// Availability per datacenter at the last check, used to detect edges.
    #[serde(default)]
    pub last_status: HashMap<String, String>,

    pub created_at: DateTime<Utc>,

    /// Most recent changes, newest last, capped at
    /// [`SUBSCRIPTION_HISTORY_CAP`].
    #[serde(default)]
    pub history: Vec<AvailabilityChange>,
}

fn default_true() -> bool {
    true
}

impl Subscription {
    pub fn new(plan_code: String, datacenters: Vec<String>, notify_available: bool, notify_unavailable: bool) -> Self {
        Self {
            plan_code,
            datacenters,
            notify_available,
            notify_unavailable,
            last_status: HashMap::new(),
            created_at: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Appends a change, dropping the oldest entries beyond the cap.
    pub fn push_history(&mut self, change: AvailabilityChange) {
        self.history.push(change);
        if self.history.len() > SUBSCRIPTION_HISTORY_CAP {
            let excess = self.history.len() - SUBSCRIPTION_HISTORY_CAP;
            self.history.drain(..excess);
        }
    }

    /// Whether `datacenter` is within this subscription's watch list.
    pub fn watches(&self, datacenter: &str) -> bool {
        self.datacenters.is_empty() || self.datacenters.iter().any(|dc| dc == datacenter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(dc: &str) -> AvailabilityChange {
        AvailabilityChange {
            timestamp: Utc::now(),
            datacenter: dc.to_string(),
            status: "1H-high".to_string(),
            change_type: ChangeType::Available,
            old_status: None,
        }
    }

    #[test]
    fn test_history_cap() {
        let mut sub = Subscription::new("24rise01".into(), vec![], true, false);
        for i in 0..120 {
            sub.push_history(change(&format!("dc{i}")));
        }
        assert_eq!(sub.history.len(), SUBSCRIPTION_HISTORY_CAP);
        // oldest entries were dropped
        assert_eq!(sub.history[0].datacenter, "dc20");
    }

    #[test]
    fn test_watch_list() {
        let all = Subscription::new("p".into(), vec![], true, false);
        assert!(all.watches("gra"));

        let some = Subscription::new("p".into(), vec!["gra".into(), "rbx".into()], true, false);
        assert!(some.watches("rbx"));
        assert!(!some.watches("bhs"));
    }
}
