use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use phantom_common::{QueueItem, QueueStatus};
use phantom_ovh::OvhError;

use crate::now_epoch;
use crate::purchase::{self, PurchaseOutcome};
use crate::state::SharedState;

/// Purchase-queue processor. Ticks every second; each running item gets an
/// attempt when its retry interval has elapsed (or immediately when it has
/// never been tried).
pub async fn queue_loop(state: Arc<SharedState>) {
    state.logs.info("queue", "queue processor started").await;
    loop {
        process_due_items(&state).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// One processor tick over a queue snapshot. Deleted ids are re-checked at
/// every step because the API can remove items while a tick is in flight.
pub async fn process_due_items(state: &SharedState) {
    let snapshot = state.queue.read().await.clone();
    if snapshot.is_empty() {
        return;
    }

    for item in snapshot {
        if state.deleted_queue_ids.contains(&item.id) {
            continue;
        }
        if item.status != QueueStatus::Running {
            continue;
        }
        if !item.is_due(now_epoch()) {
            continue;
        }

        // Stamp the attempt first so a crash mid-purchase cannot produce a
        // rapid retry storm.
        let Some(item) = begin_attempt(state, &item.id).await else {
            continue;
        };
        state.save_queue().await;

        let first_attempt = item.retry_count == 1;
        state
            .logs
            .info(
                "queue",
                if first_attempt {
                    format!("first attempt for task {}: {} in {}", item.id, item.plan_code, item.datacenter)
                } else {
                    format!(
                        "retry {} for task {}: {} in {}",
                        item.retry_count, item.id, item.plan_code, item.datacenter
                    )
                },
            )
            .await;

        run_attempt(state, &item).await;
        state.save_queue().await;
    }
}

/// Bumps the retry bookkeeping of an item if it still exists. Returns the
/// updated copy, or None when the item vanished (then also recorded as
/// deleted so later ticks skip it).
async fn begin_attempt(state: &SharedState, id: &str) -> Option<QueueItem> {
    let mut queue = state.queue.write().await;
    match queue.iter_mut().find(|q| q.id == id) {
        Some(entry) => {
            entry.retry_count += 1;
            entry.last_check_time = now_epoch();
            entry.updated_at = Utc::now();
            Some(entry.clone())
        }
        None => {
            state.deleted_queue_ids.insert(id.to_string());
            None
        }
    }
}

async fn run_attempt(state: &SharedState, item: &QueueItem) {
    let settings = state.settings.read().await.clone();
    let client = match state.ovh(&settings) {
        Ok(client) => client,
        Err(e) => {
            state
                .logs
                .error("queue", format!("cannot attempt task {}: {e}", item.id))
                .await;
            purchase::record_failure(state, item, &e.to_string()).await;
            finish_failed_attempt(state, item, &e.to_string()).await;
            return;
        }
    };

    match purchase::attempt_purchase(state, &client, &settings, item).await {
        Ok(PurchaseOutcome::Ordered { order_id, order_url }) => {
            purchase::record_success(state, &settings, item, &order_id, &order_url).await;
            set_status(state, &item.id, QueueStatus::Completed).await;
            state
                .logs
                .info(
                    "queue",
                    format!(
                        "task {} completed after {} attempt(s): {} in {}",
                        item.id, item.retry_count, item.plan_code, item.datacenter
                    ),
                )
                .await;
        }
        Ok(PurchaseOutcome::OutOfStock) => {
            state
                .logs
                .info(
                    "queue",
                    format!(
                        "task {} found no stock (attempt {}), retrying in {}s",
                        item.id, item.retry_count, item.retry_interval
                    ),
                )
                .await;
            finish_failed_attempt(state, item, "out of stock").await;
        }
        Err(e @ OvhError::Api { .. }) => {
            state
                .logs
                .error("queue", format!("task {} order flow failed: {e}", item.id))
                .await;
            purchase::record_failure(state, item, &e.to_string()).await;
            finish_failed_attempt(state, item, &e.to_string()).await;
        }
        Err(e) => {
            state
                .logs
                .error("queue", format!("task {} hit a transport failure: {e}", item.id))
                .await;
            purchase::record_failure(state, item, &e.to_string()).await;
            finish_failed_attempt(state, item, &e.to_string()).await;
        }
    }
}

/// Applies the retry limit after an unsuccessful attempt.
async fn finish_failed_attempt(state: &SharedState, item: &QueueItem, reason: &str) {
    let Some(max) = item.max_retries else { return };
    if item.retry_count >= max {
        set_status(state, &item.id, QueueStatus::Failed).await;
        state
            .logs
            .warning(
                "queue",
                format!("task {} gave up after {} attempts: {reason}", item.id, item.retry_count),
            )
            .await;
    }
}

async fn set_status(state: &SharedState, id: &str, status: QueueStatus) {
    let mut queue = state.queue.write().await;
    if let Some(entry) = queue.iter_mut().find(|q| q.id == id) {
        entry.status = status;
        entry.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phantom_store::MemoryStore;

    async fn state() -> Arc<SharedState> {
        SharedState::load(Arc::new(MemoryStore::new()), reqwest::Client::new()).await
    }

    #[tokio::test]
    async fn test_begin_attempt_bumps_bookkeeping() {
        let state = state().await;
        let item = QueueItem::new("24rise01".into(), "gra".into(), vec![], 60);
        let id = item.id.clone();
        state.queue.write().await.push(item);

        let updated = begin_attempt(&state, &id).await.unwrap();
        assert_eq!(updated.retry_count, 1);
        assert!(updated.last_check_time > 0);
    }

    #[tokio::test]
    async fn test_begin_attempt_on_missing_item_marks_deleted() {
        let state = state().await;
        assert!(begin_attempt(&state, "gone").await.is_none());
        assert!(state.deleted_queue_ids.contains("gone"));
    }

    #[tokio::test]
    async fn test_deleted_item_is_never_attempted() {
        let state = state().await;
        let item = QueueItem::new("24rise01".into(), "gra".into(), vec![], 60);
        let id = item.id.clone();
        state.queue.write().await.push(item);
        state.deleted_queue_ids.insert(id.clone());

        process_due_items(&state).await;

        // no attempt bookkeeping happened
        let queue = state.queue.read().await;
        assert_eq!(queue[0].retry_count, 0);
        assert_eq!(queue[0].last_check_time, 0);
    }

    #[tokio::test]
    async fn test_paused_item_is_skipped() {
        let state = state().await;
        let mut item = QueueItem::new("24rise01".into(), "gra".into(), vec![], 60);
        item.status = QueueStatus::Paused;
        state.queue.write().await.push(item);

        process_due_items(&state).await;

        let queue = state.queue.read().await;
        assert_eq!(queue[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_attempt_without_credentials_records_failure() {
        let state = state().await;
        let item = QueueItem::new("24rise01".into(), "gra".into(), vec![], 60);
        let id = item.id.clone();
        state.queue.write().await.push(item);

        process_due_items(&state).await;

        let queue = state.queue.read().await;
        assert_eq!(queue[0].retry_count, 1, "attempt was made and stamped");
        assert_eq!(queue[0].status, QueueStatus::Running, "unlimited retries keep it running");
        drop(queue);

        let history = state.history.read().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].task_id, id);
    }

    #[tokio::test]
    async fn test_retry_limit_fails_task() {
        let state = state().await;
        let mut item = QueueItem::new("24rise01".into(), "gra".into(), vec![], 60);
        item.max_retries = Some(1);
        state.queue.write().await.push(item);

        // no credentials configured, so the single allowed attempt fails
        process_due_items(&state).await;

        let queue = state.queue.read().await;
        assert_eq!(queue[0].status, QueueStatus::Failed);
    }
}
