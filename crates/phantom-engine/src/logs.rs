use std::sync::Arc;

use phantom_common::{LogEntry, LogLevel};
use phantom_store::{save_json, Store};
use tokio::sync::Mutex;

/// Operator log ring size.
const LOG_CAP: usize = 1000;
/// Entries are persisted every N appends; ERROR entries flush immediately.
const FLUSH_THRESHOLD: usize = 10;

const COLLECTION: &str = "logs";

struct Inner {
    entries: Vec<LogEntry>,
    pending: usize,
}

/// Dashboard-visible log buffer: bounded ring, batched persistence, and a
/// mirrored `tracing` event per entry.
pub struct LogStore {
    inner: Mutex<Inner>,
    store: Arc<dyn Store>,
}

impl LogStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                pending: 0,
            }),
            store,
        }
    }

    /// Seeds the ring from a persisted snapshot at startup.
    pub async fn restore(&self, entries: Vec<LogEntry>) {
        let mut inner = self.inner.lock().await;
        inner.entries = entries;
        let len = inner.entries.len();
        if len > LOG_CAP {
            inner.entries.drain(..len - LOG_CAP);
        }
    }

    pub async fn log(&self, level: LogLevel, source: &str, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Error => tracing::error!(source, "{message}"),
            LogLevel::Warning => tracing::warn!(source, "{message}"),
            LogLevel::Info => tracing::info!(source, "{message}"),
            LogLevel::Debug => tracing::debug!(source, "{message}"),
        }

        let to_persist = {
            let mut inner = self.inner.lock().await;
            inner.entries.push(LogEntry::new(level, message, source));
            let len = inner.entries.len();
            if len > LOG_CAP {
                inner.entries.drain(..len - LOG_CAP);
            }
            inner.pending += 1;
            if inner.pending >= FLUSH_THRESHOLD || level == LogLevel::Error {
                inner.pending = 0;
                Some(inner.entries.clone())
            } else {
                None
            }
        };

        if let Some(entries) = to_persist {
            self.persist(&entries).await;
        }
    }

    pub async fn info(&self, source: &str, message: impl Into<String>) {
        self.log(LogLevel::Info, source, message).await;
    }

    pub async fn warning(&self, source: &str, message: impl Into<String>) {
        self.log(LogLevel::Warning, source, message).await;
    }

    pub async fn error(&self, source: &str, message: impl Into<String>) {
        self.log(LogLevel::Error, source, message).await;
    }

    pub async fn debug(&self, source: &str, message: impl Into<String>) {
        self.log(LogLevel::Debug, source, message).await;
    }

    /// Writes any buffered entries out regardless of the batch threshold.
    pub async fn flush(&self) {
        let entries = {
            let mut inner = self.inner.lock().await;
            inner.pending = 0;
            inner.entries.clone()
        };
        self.persist(&entries).await;
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.pending = 0;
        drop(inner);
        self.persist(&Vec::new()).await;
    }

    pub async fn snapshot(&self) -> Vec<LogEntry> {
        self.inner.lock().await.entries.clone()
    }

    async fn persist(&self, entries: &Vec<LogEntry>) {
        if let Err(e) = save_json(self.store.as_ref(), COLLECTION, entries).await {
            tracing::error!(error = %e, "failed to persist operator logs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phantom_store::MemoryStore;

    fn log_store() -> (LogStore, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (LogStore::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_batched_persistence() {
        let (logs, store) = log_store();

        for i in 0..FLUSH_THRESHOLD - 1 {
            logs.info("test", format!("line {i}")).await;
        }
        assert!(!store.exists(COLLECTION).await, "below threshold, nothing persisted");

        logs.info("test", "line that crosses the threshold").await;
        assert!(store.exists(COLLECTION).await);
    }

    #[tokio::test]
    async fn test_error_flushes_immediately() {
        let (logs, store) = log_store();
        logs.error("test", "boom").await;
        assert!(store.exists(COLLECTION).await);
    }

    #[tokio::test]
    async fn test_ring_cap() {
        let (logs, _store) = log_store();
        for i in 0..LOG_CAP + 50 {
            logs.info("test", format!("line {i}")).await;
        }
        let snapshot = logs.snapshot().await;
        assert_eq!(snapshot.len(), LOG_CAP);
        assert_eq!(snapshot[0].message, "line 50");
    }

    #[tokio::test]
    async fn test_clear() {
        let (logs, _store) = log_store();
        logs.info("test", "line").await;
        logs.clear().await;
        assert!(logs.snapshot().await.is_empty());
    }
}
