use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};

/// Named-document persistence seam. Documents are JSON blobs keyed by a
/// collection name (`queue`, `config`, `history`, ...).
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>>;
    async fn write(&self, name: &str, bytes: Vec<u8>) -> Result<()>;
    async fn remove(&self, name: &str) -> Result<()>;
    async fn exists(&self, name: &str) -> bool;
}

/// Loads a collection, tolerating absence and corruption: a missing,
/// empty or unparsable document yields the type's default so a damaged
/// file never prevents startup.
pub async fn load_json<T>(store: &dyn Store, name: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let bytes = match store.read(name).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return T::default(),
        Err(e) => {
            tracing::warn!(collection = name, error = %e, "failed to read collection, using default");
            return T::default();
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        tracing::warn!(collection = name, "collection document is empty, using default");
        return T::default();
    }

    match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(collection = name, error = %e, "collection document is malformed, using default");
            T::default()
        }
    }
}

pub async fn save_json<T: Serialize>(store: &dyn Store, name: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.write(name, bytes).await
}
