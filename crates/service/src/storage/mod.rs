//! Key/value storage contract and its backends.
//!
//! Every backend stores opaque string values under flat string keys and
//! exposes the same mandatory `get`/`set`/`delete` operations. `list_keys`
//! and `subscribe` are optional: backends that lack them fail fast with
//! [`StoreError::Unsupported`].

pub mod file;
pub mod http;
pub mod local;
pub mod realtime;

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use configs::{BackendKind, StorageConfig};
use tokio::task::JoinHandle;
use tracing::info;

use crate::errors::StoreError;

pub use file::FileStore;
pub use http::HttpStore;
pub use local::LocalStore;
pub use realtime::RealtimeStore;

/// A single key/value record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Optional operations a backend may or may not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ListKeys,
    Subscribe,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::ListKeys => f.write_str("listKeys"),
            Capability::Subscribe => f.write_str("subscribe"),
        }
    }
}

/// Invoked with the current entry, or `None` once the key is absent.
pub type ChangeCallback = Arc<dyn Fn(Option<Entry>) + Send + Sync>;

/// Handle to a live subscription. Dropping it or calling
/// [`Subscription::unsubscribe`] stops further callbacks.
pub struct Subscription {
    key: String,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(key: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self { key: key.into(), task: Some(task) }
    }

    pub fn key(&self) -> &str { &self.key }

    /// `false` once unsubscribed or after the backend ended the stream.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}

/// String-keyed store of opaque values. Last write wins; there is no
/// locking or versioning across clients.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key. Absence is `Ok(None)`, never an error.
    async fn get(&self, key: &str) -> Result<Option<Entry>, StoreError>;

    /// Create or fully overwrite a key.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// All keys, in backend-defined order.
    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        Err(StoreError::unsupported(self.backend_name(), Capability::ListKeys))
    }

    /// Push updates for one key: the callback fires once with the current
    /// value, then after every change. A subscriber may see its own writes.
    async fn subscribe(
        &self,
        _key: &str,
        _on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError> {
        Err(StoreError::unsupported(self.backend_name(), Capability::Subscribe))
    }

    /// Check if a key exists
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    fn supports(&self, _capability: Capability) -> bool { false }

    /// Name of this backend (for logging/debug)
    fn backend_name(&self) -> &'static str;
}

/// Reject keys that cannot be mapped safely onto a file name or URL segment.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("key must not be empty".into()));
    }
    if key == "." || key == ".." || key.contains(&['/', '\\', '\0'][..]) {
        return Err(StoreError::InvalidKey(format!("`{key}` is not a valid key")));
    }
    Ok(())
}

/// Build the backend selected by configuration. Called once at startup; the
/// resulting handle is passed to whichever component needs persistence.
pub async fn open_store(cfg: &StorageConfig) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    let timeout = Duration::from_secs(cfg.request_timeout_secs);
    let store: Arc<dyn KeyValueStore> = match cfg.backend {
        BackendKind::Local => match &cfg.local_file {
            Some(path) => Arc::new(LocalStore::open(path).await?),
            None => Arc::new(LocalStore::new()),
        },
        BackendKind::File => match &cfg.endpoint {
            Some(endpoint) => Arc::new(HttpStore::new(endpoint, timeout)?),
            None => Arc::new(FileStore::new(&cfg.root)),
        },
        BackendKind::Realtime => Arc::new(RealtimeStore::new(
            &cfg.realtime.database_url,
            cfg.realtime.auth_token.clone(),
            timeout,
        )?),
    };
    info!(backend = store.backend_name(), "storage backend ready");
    Ok(store)
}
