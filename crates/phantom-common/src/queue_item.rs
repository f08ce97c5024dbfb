use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lower bound for a queue item's retry interval, in seconds.
/// Anything below this would hammer the upstream availability API.
pub const MIN_RETRY_INTERVAL_SECS: u64 = 30;
/// Upper bound for a queue item's retry interval, in seconds.
pub const MAX_RETRY_INTERVAL_SECS: u64 = 3600;

/// Lifecycle state of a purchase-queue item. Transitions are driven by the
/// queue processor; the API only requests them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl QueueStatus {
    /// Items in these states count toward the "active queues" statistic.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Paused)
    }
}

/// A persisted purchase-attempt job with its retry policy.
///
/// Stored as one element of the `queue` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,

    /// OVH product SKU being sniped.
    pub plan_code: String,

    /// Facility code (e.g. `gra`, `rbx`, `bhs`) the order targets.
    pub datacenter: String,

    /// Addon plan codes to attach to the order (memory, storage, ...).
    #[serde(default)]
    pub options: Vec<String>,

    pub status: QueueStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Seconds between purchase attempts.
    pub retry_interval: u64,

    /// Number of attempts made so far.
    #[serde(default)]
    pub retry_count: u64,

    /// Attempt limit. None means retry until the item is paused or deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u64>,

    /// Epoch seconds of the last attempt; 0 means never attempted, which
    /// makes the item due immediately.
    #[serde(default)]
    pub last_check_time: u64,

    /// Set when a config-sniper task created this item, so the sniper can
    /// dedupe its own orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_sniper_task_id: Option<String>,

    /// Marks items enqueued through the quick-order path (no availability
    /// pre-check at enqueue time).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_order: Option<bool>,
}

impl QueueItem {
    /// New items start running immediately; the first processor tick picks
    /// them up because `last_check_time` is 0.
    pub fn new(plan_code: String, datacenter: String, options: Vec<String>, retry_interval: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            plan_code,
            datacenter,
            options,
            status: QueueStatus::Running,
            created_at: now,
            updated_at: now,
            retry_interval,
            retry_count: 0,
            max_retries: None,
            last_check_time: 0,
            config_sniper_task_id: None,
            quick_order: None,
        }
    }

    /// Whether the item is due for a purchase attempt at `now` (epoch secs).
    pub fn is_due(&self, now: u64) -> bool {
        self.last_check_time == 0 || now.saturating_sub(self.last_check_time) >= self.retry_interval
    }
}

/// Validates a user-supplied retry interval against the allowed range.
pub fn retry_interval_in_range(interval: u64) -> bool {
    (MIN_RETRY_INTERVAL_SECS..=MAX_RETRY_INTERVAL_SECS).contains(&interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_is_due() {
        let item = QueueItem::new("24rise01".into(), "gra".into(), vec![], 60);
        assert_eq!(item.status, QueueStatus::Running);
        assert!(item.is_due(0));
        assert!(item.is_due(1_000_000));
    }

    #[test]
    fn test_due_respects_interval() {
        let mut item = QueueItem::new("24rise01".into(), "gra".into(), vec![], 60);
        item.last_check_time = 1000;
        assert!(!item.is_due(1030));
        assert!(item.is_due(1060));
        assert!(item.is_due(2000));
    }

    #[test]
    fn test_retry_interval_bounds() {
        assert!(!retry_interval_in_range(29));
        assert!(retry_interval_in_range(30));
        assert!(retry_interval_in_range(3600));
        assert!(!retry_interval_in_range(3601));
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&QueueStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
        let status: QueueStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(status, QueueStatus::Paused);
    }

    #[test]
    fn test_item_serializes_camel_case() {
        let item = QueueItem::new("24rise01".into(), "rbx".into(), vec![], 30);
        let value = serde_json::to_value(&item).unwrap();
        assert!(value.get("planCode").is_some());
        assert!(value.get("retryInterval").is_some());
        assert!(value.get("lastCheckTime").is_some());
        // unset optional markers stay off the wire
        assert!(value.get("configSniperTaskId").is_none());
        assert!(value.get("quickOrder").is_none());
    }
}
