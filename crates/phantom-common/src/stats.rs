use serde::{Deserialize, Serialize};

/// Dashboard headline numbers, recomputed from the queue, the purchase
/// history and the cached plan list on every read.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Queue items that are pending, running or paused.
    pub active_queues: u64,
    pub total_servers: u64,
    /// Plans with stock in at least one datacenter.
    pub available_servers: u64,
    pub purchase_success: u64,
    pub purchase_failed: u64,
}
