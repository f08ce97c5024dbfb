use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;

use crate::types::Store;

/// In-memory store for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().await.get(name).cloned())
    }

    async fn write(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        self.inner.write().await.insert(name.to_string(), bytes);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.inner.write().await.remove(name);
        Ok(())
    }

    async fn exists(&self, name: &str) -> bool {
        self.inner.read().await.contains_key(name)
    }
}
