use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::types::Store;

/// JSON-file store rooted at a data directory: one `<name>.json` per
/// collection. Writes go through a temp file and rename so a crash mid-write
/// leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait::async_trait]
impl Store for FileStore {
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    async fn write(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(name);
        let tmp = self.dir.join(format!(".{name}.json.tmp"));
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
        }
    }

    async fn exists(&self, name: &str) -> bool {
        tokio::fs::try_exists(self.path_for(name)).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{load_json, save_json};

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        save_json(&store, "queue", &vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert!(store.exists("queue").await);

        let loaded: Vec<String> = load_json(&store, "queue").await;
        assert_eq!(loaded, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_collection_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        let loaded: Vec<String> = load_json(&store, "absent").await;
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_collection_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        store.write("queue", b"{not json".to_vec()).await.unwrap();
        let loaded: Vec<String> = load_json(&store, "queue").await;
        assert!(loaded.is_empty());

        store.write("queue", b"   ".to_vec()).await.unwrap();
        let loaded: Vec<String> = load_json(&store, "queue").await;
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        store.write("servers", b"[]".to_vec()).await.unwrap();
        store.remove("servers").await.unwrap();
        store.remove("servers").await.unwrap();
        assert!(!store.exists("servers").await);
    }
}
