use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use phantom_common::{AvailabilityChange, ChangeType, ServerPlan, Subscription};
use phantom_ovh::OvhClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::state::SharedState;

pub const MIN_CHECK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// Persisted monitor state: the subscription list, the plan codes already
/// seen in the catalog, and the configured check interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorDocument {
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub known_servers: Vec<String>,
    #[serde(default = "default_interval")]
    pub check_interval: u64,
}

fn default_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

impl Default for MonitorDocument {
    fn default() -> Self {
        Self {
            subscriptions: Vec::new(),
            known_servers: Vec::new(),
            check_interval: DEFAULT_CHECK_INTERVAL_SECS,
        }
    }
}

/// Availability watcher. Holds the subscription list and drives the
/// periodic checks; started and stopped through the API.
pub struct Monitor {
    subscriptions: RwLock<Vec<Subscription>>,
    known_servers: RwLock<HashSet<String>>,
    running: AtomicBool,
    check_interval: AtomicU64,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            known_servers: RwLock::new(HashSet::new()),
            running: AtomicBool::new(false),
            check_interval: AtomicU64::new(DEFAULT_CHECK_INTERVAL_SECS),
        }
    }

    pub async fn restore(&self, doc: MonitorDocument) {
        *self.subscriptions.write().await = doc.subscriptions;
        *self.known_servers.write().await = doc.known_servers.into_iter().collect();
        self.check_interval
            .store(doc.check_interval.max(MIN_CHECK_INTERVAL_SECS), Ordering::Relaxed);
    }

    pub async fn document(&self) -> MonitorDocument {
        let mut known: Vec<String> = self.known_servers.read().await.iter().cloned().collect();
        known.sort();
        MonitorDocument {
            subscriptions: self.subscriptions.read().await.clone(),
            known_servers: known,
            check_interval: self.check_interval(),
        }
    }

    /// Adds or updates a subscription. Returns true when a new one was
    /// created, false when an existing one was reconfigured.
    pub async fn add_subscription(
        &self,
        plan_code: &str,
        datacenters: Vec<String>,
        notify_available: bool,
        notify_unavailable: bool,
    ) -> bool {
        let mut subs = self.subscriptions.write().await;
        if let Some(existing) = subs.iter_mut().find(|s| s.plan_code == plan_code) {
            existing.datacenters = datacenters;
            existing.notify_available = notify_available;
            existing.notify_unavailable = notify_unavailable;
            return false;
        }
        subs.push(Subscription::new(
            plan_code.to_string(),
            datacenters,
            notify_available,
            notify_unavailable,
        ));
        true
    }

    pub async fn remove_subscription(&self, plan_code: &str) -> bool {
        let mut subs = self.subscriptions.write().await;
        let before = subs.len();
        subs.retain(|s| s.plan_code != plan_code);
        subs.len() < before
    }

    pub async fn clear_subscriptions(&self) -> usize {
        let mut subs = self.subscriptions.write().await;
        let count = subs.len();
        subs.clear();
        count
    }

    pub async fn subscriptions_snapshot(&self) -> Vec<Subscription> {
        self.subscriptions.read().await.clone()
    }

    pub async fn history_of(&self, plan_code: &str) -> Option<Vec<AvailabilityChange>> {
        self.subscriptions
            .read()
            .await
            .iter()
            .find(|s| s.plan_code == plan_code)
            .map(|s| s.history.clone())
    }

    /// Records a completed check: appends the detected changes and replaces
    /// the per-datacenter status snapshot.
    pub async fn apply_check(
        &self,
        plan_code: &str,
        current: HashMap<String, String>,
        changes: Vec<AvailabilityChange>,
    ) {
        let mut subs = self.subscriptions.write().await;
        if let Some(sub) = subs.iter_mut().find(|s| s.plan_code == plan_code) {
            for change in changes {
                sub.push_history(change);
            }
            sub.last_status = current;
        }
    }

    /// Diffs a fresh plan list against the known set; returns the plans that
    /// appeared since the last observation. The first observation only seeds
    /// the set.
    pub async fn observe_plans(&self, plans: &[ServerPlan]) -> Vec<ServerPlan> {
        let current: HashSet<String> = plans.iter().map(|p| p.plan_code.clone()).collect();
        let mut known = self.known_servers.write().await;
        if known.is_empty() {
            *known = current;
            return Vec::new();
        }
        let new_codes: HashSet<&String> = current.difference(&known).collect();
        let fresh = plans
            .iter()
            .filter(|p| new_codes.contains(&p.plan_code))
            .cloned()
            .collect();
        *known = current;
        fresh
    }

    pub fn start(&self) -> bool {
        !self.running.swap(true, Ordering::SeqCst)
    }

    pub fn stop(&self) -> bool {
        self.running.swap(false, Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn check_interval(&self) -> u64 {
        self.check_interval.load(Ordering::Relaxed)
    }

    pub fn set_check_interval(&self, interval: u64) -> bool {
        if interval < MIN_CHECK_INTERVAL_SECS {
            return false;
        }
        self.check_interval.store(interval, Ordering::Relaxed);
        true
    }

    pub async fn status(&self) -> Value {
        let subs = self.subscriptions.read().await;
        json!({
            "running": self.is_running(),
            "subscriptions_count": subs.len(),
            "known_servers_count": self.known_servers.read().await.len(),
            "check_interval": self.check_interval(),
            "subscriptions": &*subs,
        })
    }
}

/// Availability-edge detection for one datacenter.
///
/// A first observation counts as a restock when the plan is orderable, so a
/// fresh subscription to an in-stock plan alerts right away.
pub fn detect_change(
    old: Option<&str>,
    new: &str,
    notify_available: bool,
    notify_unavailable: bool,
) -> Option<ChangeType> {
    match old {
        None if new != "unavailable" => notify_available.then_some(ChangeType::Available),
        Some("unavailable") if new != "unavailable" => notify_available.then_some(ChangeType::Available),
        Some(prev) if prev != "unavailable" && new == "unavailable" => {
            notify_unavailable.then_some(ChangeType::Unavailable)
        }
        _ => None,
    }
}

/// Computes the changes one availability snapshot implies for a
/// subscription, honoring its datacenter watch list.
pub fn diff_subscription(sub: &Subscription, current: &HashMap<String, String>) -> Vec<AvailabilityChange> {
    let mut changes = Vec::new();
    for (dc, status) in current {
        if !sub.watches(dc) {
            continue;
        }
        let old = sub.last_status.get(dc).map(String::as_str);
        if let Some(change_type) = detect_change(old, status, sub.notify_available, sub.notify_unavailable) {
            changes.push(AvailabilityChange {
                timestamp: Utc::now(),
                datacenter: dc.clone(),
                status: status.clone(),
                change_type,
                old_status: old.map(str::to_string),
            });
        }
    }
    changes
}

/// Flattens the availability response into a per-datacenter status map,
/// normalizing empty statuses to `unknown`.
pub async fn availability_map(client: &OvhClient, plan_code: &str) -> Result<HashMap<String, String>, phantom_ovh::OvhError> {
    let entries = client.datacenter_availabilities(plan_code, &[]).await?;
    let mut map = HashMap::new();
    for entry in entries {
        for dc in entry.datacenters {
            let status = if dc.availability.is_empty() {
                "unknown".to_string()
            } else {
                dc.availability
            };
            map.insert(dc.datacenter, status);
        }
    }
    Ok(map)
}

fn alert_text(plan_code: &str, change: &AvailabilityChange) -> String {
    let time = change.timestamp.format("%Y-%m-%d %H:%M:%S");
    match change.change_type {
        ChangeType::Available => format!(
            "Server restocked\nPlan: {plan_code}\nDatacenter: {}\nStatus: {}\nTime: {time}",
            change.datacenter, change.status
        ),
        ChangeType::Unavailable => format!(
            "Server out of stock\nPlan: {plan_code}\nDatacenter: {}\nTime: {time}",
            change.datacenter
        ),
    }
}

async fn run_cycle(state: &SharedState) {
    let subs = state.monitor.subscriptions_snapshot().await;
    if subs.is_empty() {
        state.logs.debug("monitor", "no subscriptions, skipping check").await;
        return;
    }

    let settings = state.settings.read().await.clone();
    let client = match state.ovh(&settings) {
        Ok(client) => client,
        Err(e) => {
            state.logs.warning("monitor", format!("availability check skipped: {e}")).await;
            return;
        }
    };

    state
        .logs
        .info("monitor", format!("checking {} subscriptions", subs.len()))
        .await;

    for sub in subs {
        if !state.monitor.is_running() {
            break;
        }

        let current = match availability_map(&client, &sub.plan_code).await {
            Ok(map) => map,
            Err(e) => {
                state
                    .logs
                    .warning("monitor", format!("failed to check {}: {e}", sub.plan_code))
                    .await;
                continue;
            }
        };

        let changes = diff_subscription(&sub, &current);
        for change in &changes {
            state
                .logs
                .info(
                    "monitor",
                    format!(
                        "{}@{} changed to {} (was {})",
                        sub.plan_code,
                        change.datacenter,
                        change.status,
                        change.old_status.as_deref().unwrap_or("unseen")
                    ),
                )
                .await;
            let sent = state.notifier.send(&settings, &alert_text(&sub.plan_code, change)).await;
            if !sent {
                state
                    .logs
                    .warning("monitor", format!("alert delivery failed for {}", sub.plan_code))
                    .await;
            }
        }

        state.monitor.apply_check(&sub.plan_code, current, changes).await;

        // spacing between upstream queries
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    state.save_monitor().await;
}

/// Long-lived monitor task. The loop idles while the monitor is stopped and
/// re-checks the running flag every second so a stop request takes effect
/// promptly even mid-interval.
pub async fn monitor_loop(state: Arc<SharedState>) {
    state.logs.info("monitor", "monitor task started").await;
    loop {
        if !state.monitor.is_running() {
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }

        run_cycle(&state).await;

        let interval = state.monitor.check_interval();
        for _ in 0..interval {
            if !state.monitor.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_alerts_when_in_stock() {
        assert_eq!(detect_change(None, "1H-high", true, false), Some(ChangeType::Available));
        assert_eq!(detect_change(None, "unavailable", true, false), None);
        assert_eq!(detect_change(None, "1H-high", false, false), None);
    }

    #[test]
    fn test_restock_edge() {
        assert_eq!(
            detect_change(Some("unavailable"), "72H", true, false),
            Some(ChangeType::Available)
        );
        assert_eq!(detect_change(Some("72H"), "1H-high", true, true), None);
    }

    #[test]
    fn test_out_of_stock_edge_needs_opt_in() {
        assert_eq!(detect_change(Some("1H-high"), "unavailable", true, false), None);
        assert_eq!(
            detect_change(Some("1H-high"), "unavailable", true, true),
            Some(ChangeType::Unavailable)
        );
        assert_eq!(detect_change(Some("unavailable"), "unavailable", true, true), None);
    }

    #[test]
    fn test_diff_honors_watch_list() {
        let mut sub = Subscription::new("24rise01".into(), vec!["gra".into()], true, true);
        sub.last_status.insert("gra".into(), "unavailable".into());
        sub.last_status.insert("rbx".into(), "unavailable".into());

        let mut current = HashMap::new();
        current.insert("gra".to_string(), "1H-high".to_string());
        current.insert("rbx".to_string(), "1H-high".to_string());

        let changes = diff_subscription(&sub, &current);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].datacenter, "gra");
        assert_eq!(changes[0].old_status.as_deref(), Some("unavailable"));
    }

    #[tokio::test]
    async fn test_add_subscription_upserts() {
        let monitor = Monitor::new();
        assert!(monitor.add_subscription("p1", vec![], true, false).await);
        assert!(!monitor.add_subscription("p1", vec!["gra".into()], false, true).await);

        let subs = monitor.subscriptions_snapshot().await;
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].datacenters, vec!["gra".to_string()]);
        assert!(!subs[0].notify_available);
        assert!(subs[0].notify_unavailable);
    }

    #[tokio::test]
    async fn test_interval_floor() {
        let monitor = Monitor::new();
        assert!(!monitor.set_check_interval(30));
        assert_eq!(monitor.check_interval(), DEFAULT_CHECK_INTERVAL_SECS);
        assert!(monitor.set_check_interval(120));
        assert_eq!(monitor.check_interval(), 120);
    }

    #[tokio::test]
    async fn test_observe_plans_seeds_then_diffs() {
        let monitor = Monitor::new();
        let plan = |code: &str| ServerPlan {
            plan_code: code.to_string(),
            name: code.to_string(),
            description: String::new(),
            cpu: "N/A".into(),
            memory: "N/A".into(),
            storage: "N/A".into(),
            bandwidth: "N/A".into(),
            vrack_bandwidth: "N/A".into(),
            datacenters: vec![],
            default_options: vec![],
            available_options: vec![],
        };

        let first = monitor.observe_plans(&[plan("a"), plan("b")]).await;
        assert!(first.is_empty(), "first observation only seeds");

        let second = monitor.observe_plans(&[plan("a"), plan("b"), plan("c")]).await;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].plan_code, "c");
    }

    #[tokio::test]
    async fn test_start_stop() {
        let monitor = Monitor::new();
        assert!(monitor.start());
        assert!(!monitor.start(), "second start reports already running");
        assert!(monitor.is_running());
        assert!(monitor.stop());
        assert!(!monitor.stop());
    }
}
