use std::{collections::HashMap, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio::{
    fs,
    sync::{broadcast, RwLock},
};
use tracing::{debug, warn};

use super::{Capability, ChangeCallback, Entry, KeyValueStore, Subscription};
use crate::errors::StoreError;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Change {
    key: String,
    value: Option<String>,
}

/// In-process key/value map scoped to one client.
///
/// Optionally mirrors the whole map to a JSON file after every mutation, the
/// way a browser keeps local storage across reloads. Clones share state, so a
/// write through one handle reaches subscribers of another.
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
    file_path: Option<PathBuf>,
    changes: broadcast::Sender<Change>,
}

impl Default for LocalStore {
    fn default() -> Self { Self::new() }
}

impl LocalStore {
    /// Purely in-memory store; contents are lost when the process exits.
    pub fn new() -> Self {
        Self::with_map(HashMap::new(), None)
    }

    /// Initialize the store from a path. Creates the file with an empty map if missing.
    pub async fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let file_path = path.into();
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(StoreError::backend)?;
            }
        }

        let map: HashMap<String, String> = match fs::read(&file_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %file_path.display(), error = %e, "local store file unreadable, starting empty");
                HashMap::new()
            }),
            Err(_) => {
                let empty: HashMap<String, String> = HashMap::new();
                fs::write(&file_path, serde_json::to_vec(&empty)?)
                    .await
                    .map_err(StoreError::backend)?;
                empty
            }
        };

        Ok(Self::with_map(map, Some(file_path)))
    }

    fn with_map(map: HashMap<String, String>, file_path: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { inner: Arc::new(RwLock::new(map)), file_path, changes }
    }

    async fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.file_path else { return Ok(()) };
        let map = self.inner.read().await;
        let data = serde_json::to_vec(&*map)?;
        drop(map);
        fs::write(path, data).await.map_err(StoreError::backend)?;
        Ok(())
    }

    /// Persist after a mutation; on failure put `previous` back so memory
    /// never holds a value the file does not.
    async fn commit(&self, key: &str, previous: Option<String>) -> Result<(), StoreError> {
        if let Err(e) = self.save().await {
            let mut map = self.inner.write().await;
            match previous {
                Some(v) => map.insert(key.to_string(), v),
                None => map.remove(key),
            };
            warn!(key, error = %e, "local store save failed, change rolled back");
            return Err(e);
        }
        Ok(())
    }

    fn notify(&self, key: &str, value: Option<String>) {
        // no receivers is fine
        let _ = self.changes.send(Change { key: key.to_string(), value });
    }
}

#[async_trait]
impl KeyValueStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>, StoreError> {
        let map = self.inner.read().await;
        Ok(map.get(key).map(|v| Entry::new(key, v.clone())))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        let previous = map.insert(key.to_string(), value.to_string());
        drop(map);
        self.commit(key, previous).await?;
        debug!(key, bytes = value.len(), "local set");
        self.notify(key, Some(value.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        let previous = map.remove(key);
        drop(map);
        if previous.is_none() {
            return Ok(());
        }
        self.commit(key, previous).await?;
        debug!(key, "local delete");
        self.notify(key, None);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let map = self.inner.read().await;
        Ok(map.keys().cloned().collect())
    }

    async fn subscribe(
        &self,
        key: &str,
        on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError> {
        // Subscribe before reading so no change slips between the two.
        let mut rx = self.changes.subscribe();
        let initial = self.get(key).await?;
        let inner = Arc::clone(&self.inner);
        let watched = key.to_string();

        let task = tokio::spawn(async move {
            on_change(initial);
            loop {
                match rx.recv().await {
                    Ok(change) if change.key == watched => {
                        on_change(change.value.map(|v| Entry::new(watched.as_str(), v)));
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(key = %watched, missed, "subscriber lagged, resyncing");
                        let current = inner.read().await.get(&watched).cloned();
                        on_change(current.map(|v| Entry::new(watched.as_str(), v)));
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(Subscription::new(key, task))
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(capability, Capability::ListKeys | Capability::Subscribe)
    }

    fn backend_name(&self) -> &'static str { "local" }
}
