use std::sync::Arc;

use dashmap::DashSet;
use phantom_common::{PurchaseRecord, PurchaseStatus, QueueItem, ServerPlan, Settings, SniperTask, Stats};
use phantom_ovh::{OvhClient, OvhError, SharedTransport};
use phantom_store::{load_json, save_json, Store};
use tokio::sync::RwLock;

use crate::logs::LogStore;
use crate::monitor::{Monitor, MonitorDocument};
use crate::notify::Notifier;
use crate::now_epoch;

/// Server-list cache lifetime.
pub const PLAN_CACHE_DURATION_SECS: u64 = 2 * 60 * 60;

pub mod collections {
    pub const CONFIG: &str = "config";
    pub const QUEUE: &str = "queue";
    pub const HISTORY: &str = "history";
    pub const SERVERS: &str = "servers";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    pub const SNIPER_TASKS: &str = "config_sniper_tasks";
    pub const LOGS: &str = "logs";
}

/// In-memory mirror of the server list with its fetch timestamp. The plan
/// data survives restarts via the `servers` collection, but the timestamp
/// does not, so a restarted process re-fetches on the next refresh request.
#[derive(Debug, Default)]
pub struct PlanCache {
    pub plans: Vec<ServerPlan>,
    pub fetched_at: Option<u64>,
}

impl PlanCache {
    pub fn age(&self, now: u64) -> Option<u64> {
        self.fetched_at.map(|t| now.saturating_sub(t))
    }

    pub fn is_valid(&self, now: u64) -> bool {
        self.age(now).is_some_and(|age| age < PLAN_CACHE_DURATION_SECS)
    }

    pub fn replace(&mut self, plans: Vec<ServerPlan>, now: u64) {
        self.plans = plans;
        self.fetched_at = Some(now);
    }

    pub fn clear(&mut self) {
        self.plans.clear();
        self.fetched_at = None;
    }
}

/// Everything the API handlers and the background loops share.
pub struct SharedState {
    pub settings: RwLock<Settings>,
    pub queue: RwLock<Vec<QueueItem>>,
    pub history: RwLock<Vec<PurchaseRecord>>,
    pub plan_cache: RwLock<PlanCache>,
    pub sniper_tasks: RwLock<Vec<SniperTask>>,

    /// Queue item ids deleted through the API. The processor consults this
    /// before every attempt so a deletion cancels work that a tick already
    /// snapshotted.
    pub deleted_queue_ids: DashSet<String>,

    pub monitor: Monitor,
    pub logs: LogStore,
    pub notifier: Notifier,
    pub store: Arc<dyn Store>,
    pub transport: SharedTransport,
}

impl SharedState {
    /// Loads every persisted collection and assembles the shared state.
    pub async fn load(store: Arc<dyn Store>, http: reqwest::Client) -> Arc<Self> {
        let mut settings: Settings = load_json(store.as_ref(), collections::CONFIG).await;
        settings.derive_iam();

        let queue: Vec<QueueItem> = load_json(store.as_ref(), collections::QUEUE).await;
        let history: Vec<PurchaseRecord> = load_json(store.as_ref(), collections::HISTORY).await;
        let plans: Vec<ServerPlan> = load_json(store.as_ref(), collections::SERVERS).await;
        let sniper_tasks: Vec<SniperTask> = load_json(store.as_ref(), collections::SNIPER_TASKS).await;
        let monitor_doc: MonitorDocument = load_json(store.as_ref(), collections::SUBSCRIPTIONS).await;
        let log_entries = load_json(store.as_ref(), collections::LOGS).await;

        let monitor = Monitor::new();
        monitor.restore(monitor_doc).await;

        let logs = LogStore::new(store.clone());
        logs.restore(log_entries).await;

        let state = Arc::new(Self {
            settings: RwLock::new(settings),
            queue: RwLock::new(queue),
            history: RwLock::new(history),
            plan_cache: RwLock::new(PlanCache {
                plans,
                fetched_at: None,
            }),
            sniper_tasks: RwLock::new(sniper_tasks),
            deleted_queue_ids: DashSet::new(),
            monitor,
            logs,
            notifier: Notifier::new(http.clone()),
            store,
            transport: SharedTransport::new(http),
        });

        let queue_len = state.queue.read().await.len();
        let task_len = state.sniper_tasks.read().await.len();
        state
            .logs
            .info(
                "system",
                format!("state restored: {queue_len} queue items, {task_len} sniper tasks"),
            )
            .await;

        state
    }

    /// A signed client for the given settings. Fails when credentials are
    /// missing or the endpoint alias is unknown.
    pub fn ovh(&self, settings: &Settings) -> Result<OvhClient, OvhError> {
        if !settings.has_ovh_credentials() {
            return Err(OvhError::MissingCredentials);
        }
        OvhClient::new(
            self.transport.clone(),
            &settings.endpoint,
            &settings.app_key,
            &settings.app_secret,
            &settings.consumer_key,
        )
    }

    pub async fn ovh_client(&self) -> Result<OvhClient, OvhError> {
        let settings = self.settings.read().await.clone();
        self.ovh(&settings)
    }

    pub async fn save_settings(&self) {
        let settings = self.settings.read().await.clone();
        self.persist(collections::CONFIG, &settings).await;
    }

    pub async fn save_queue(&self) {
        let queue = self.queue.read().await.clone();
        self.persist(collections::QUEUE, &queue).await;
    }

    pub async fn save_history(&self) {
        let history = self.history.read().await.clone();
        self.persist(collections::HISTORY, &history).await;
    }

    pub async fn save_plans(&self) {
        let plans = self.plan_cache.read().await.plans.clone();
        self.persist(collections::SERVERS, &plans).await;
    }

    pub async fn save_sniper_tasks(&self) {
        let tasks = self.sniper_tasks.read().await.clone();
        self.persist(collections::SNIPER_TASKS, &tasks).await;
    }

    pub async fn save_monitor(&self) {
        let doc = self.monitor.document().await;
        self.persist(collections::SUBSCRIPTIONS, &doc).await;
    }

    async fn persist<T: serde::Serialize>(&self, name: &str, value: &T) {
        if let Err(e) = save_json(self.store.as_ref(), name, value).await {
            tracing::error!(collection = name, error = %e, "failed to persist collection");
        }
    }

    /// Headline numbers for the dashboard, derived from current state.
    pub async fn stats(&self) -> Stats {
        let queue = self.queue.read().await;
        let history = self.history.read().await;
        let cache = self.plan_cache.read().await;

        Stats {
            active_queues: queue.iter().filter(|q| q.status.is_active()).count() as u64,
            total_servers: cache.plans.len() as u64,
            available_servers: cache.plans.iter().filter(|p| p.has_stock()).count() as u64,
            purchase_success: history.iter().filter(|h| h.status == PurchaseStatus::Success).count() as u64,
            purchase_failed: history.iter().filter(|h| h.status == PurchaseStatus::Failed).count() as u64,
        }
    }

    /// Replaces the plan cache with a freshly loaded list, stamps the fetch
    /// time, persists, and reports plans never seen before to the monitor.
    pub async fn install_plans(&self, plans: Vec<ServerPlan>) -> Vec<ServerPlan> {
        let fresh = self.monitor.observe_plans(&plans).await;
        self.plan_cache.write().await.replace(plans, now_epoch());
        self.save_plans().await;
        self.save_monitor().await;
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phantom_common::QueueStatus;
    use phantom_store::MemoryStore;

    async fn state() -> Arc<SharedState> {
        SharedState::load(Arc::new(MemoryStore::new()), reqwest::Client::new()).await
    }

    #[tokio::test]
    async fn test_plan_cache_expiry() {
        let mut cache = PlanCache::default();
        assert!(!cache.is_valid(1000));

        cache.replace(Vec::new(), 1000);
        assert!(cache.is_valid(1000 + PLAN_CACHE_DURATION_SECS - 1));
        assert!(!cache.is_valid(1000 + PLAN_CACHE_DURATION_SECS));

        cache.clear();
        assert!(cache.fetched_at.is_none());
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let state = state().await;
        {
            let mut queue = state.queue.write().await;
            let mut running = QueueItem::new("a".into(), "gra".into(), vec![], 60);
            running.status = QueueStatus::Running;
            let mut done = QueueItem::new("b".into(), "gra".into(), vec![], 60);
            done.status = QueueStatus::Completed;
            queue.push(running);
            queue.push(done);
        }
        {
            let mut history = state.history.write().await;
            let mut ok = PurchaseRecord::new("t1", "a", "gra", vec![]);
            ok.status = PurchaseStatus::Success;
            history.push(ok);
            history.push(PurchaseRecord::new("t2", "b", "gra", vec![]));
        }

        let stats = state.stats().await;
        assert_eq!(stats.active_queues, 1);
        assert_eq!(stats.purchase_success, 1);
        assert_eq!(stats.purchase_failed, 1);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let state = state().await;
        assert!(matches!(state.ovh_client().await, Err(OvhError::MissingCredentials)));
    }

    #[tokio::test]
    async fn test_state_round_trips_through_store() {
        let store = Arc::new(MemoryStore::new());
        let state = SharedState::load(store.clone(), reqwest::Client::new()).await;
        {
            let mut queue = state.queue.write().await;
            queue.push(QueueItem::new("24rise01".into(), "gra".into(), vec![], 60));
        }
        state.save_queue().await;

        let reloaded = SharedState::load(store, reqwest::Client::new()).await;
        let queue = reloaded.queue.read().await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].plan_code, "24rise01");
    }
}
