use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::{validate_key, Capability, Entry, KeyValueStore};
use crate::errors::StoreError;

const EXTENSION: &str = ".json";

/// One file per key: `<root>/<key>.json` holds the raw value.
///
/// Writes are plain `write` calls with no locking or temp-file rename, so a
/// crash mid-write can truncate an entry and concurrent writers race.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// The directory is created lazily on first access.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path { &self.root }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}{EXTENSION}")))
    }

    async fn ensure_root(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).await.map_err(StoreError::backend)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>, StoreError> {
        let path = self.path_for(key)?;
        self.ensure_root().await?;
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(Entry::new(key, value))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::backend(e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        self.ensure_root().await?;
        fs::write(&path, value).await.map_err(StoreError::backend)?;
        debug!(key, path = %path.display(), bytes = value.len(), "file set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        self.ensure_root().await?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "file delete");
                Ok(())
            }
            // already gone
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::backend(e)),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        self.ensure_root().await?;
        let mut dir = fs::read_dir(&self.root).await.map_err(StoreError::backend)?;
        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(StoreError::backend)? {
            if !entry.file_type().await.map_err(StoreError::backend)?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(key) = name.strip_suffix(EXTENSION) {
                if !key.is_empty() {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(capability, Capability::ListKeys)
    }

    fn backend_name(&self) -> &'static str { "file" }
}
