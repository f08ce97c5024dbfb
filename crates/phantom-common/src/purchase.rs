use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Success,
    Failed,
}

/// Outcome of the latest purchase attempt for a queue task.
///
/// One record per task id: successive attempts overwrite the previous
/// outcome rather than appending a new row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub id: String,

    /// Queue item this record belongs to.
    pub task_id: String,

    pub plan_code: String,
    pub datacenter: String,

    #[serde(default)]
    pub options: Vec<String>,

    pub status: PurchaseStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub purchase_time: DateTime<Utc>,

    /// Attempt count at the time the record was written.
    pub attempt_count: u64,
}

impl PurchaseRecord {
    pub fn new(task_id: &str, plan_code: &str, datacenter: &str, options: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            plan_code: plan_code.to_string(),
            datacenter: datacenter.to_string(),
            options,
            status: PurchaseStatus::Failed,
            order_id: None,
            order_url: None,
            error_message: None,
            purchase_time: Utc::now(),
            attempt_count: 0,
        }
    }
}
