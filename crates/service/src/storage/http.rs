use std::time::Duration;

use async_trait::async_trait;
use common::types::{ErrorBody, KeysBody, SuccessBody, ValueBody};
use reqwest::{Client, Response, StatusCode, Url};
use tracing::debug;

use super::{validate_key, Capability, Entry, KeyValueStore};
use crate::errors::StoreError;

/// Client for the file-backed storage HTTP API (`GET/POST/DELETE /storage/:key`).
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base: Url,
}

impl HttpStore {
    /// `base_url` points at the collection, e.g. `http://localhost:3001/storage`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(StoreError::backend)?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, StoreError> {
        let base = Url::parse(base_url)
            .map_err(|e| StoreError::Backend(format!("invalid storage endpoint `{base_url}`: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Backend(format!("invalid storage endpoint `{base_url}`")));
        }
        Ok(Self { client, base })
    }

    fn key_url(&self, key: &str) -> Result<Url, StoreError> {
        validate_key(key)?;
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Backend("storage endpoint cannot take a path".into()))?
            .pop_if_empty()
            .push(key);
        Ok(url)
    }
}

/// Turn a non-2xx response into a backend error, keeping the server's `error` text.
async fn error_from(resp: Response) -> StoreError {
    let status = resp.status();
    let msg = match resp.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
    };
    StoreError::Backend(format!("HTTP {}: {}", status.as_u16(), msg))
}

#[async_trait]
impl KeyValueStore for HttpStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>, StoreError> {
        let url = self.key_url(key)?;
        let resp = self.client.get(url).send().await.map_err(StoreError::backend)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        let body: ValueBody = resp.json().await.map_err(StoreError::backend)?;
        Ok(Some(Entry::new(key, body.value)))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let url = self.key_url(key)?;
        let resp = self
            .client
            .post(url)
            .json(&ValueBody { value: value.to_string() })
            .send()
            .await
            .map_err(StoreError::backend)?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        debug!(key, bytes = value.len(), "http set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let url = self.key_url(key)?;
        let resp = self.client.delete(url).send().await.map_err(StoreError::backend)?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        let body: SuccessBody = resp.json().await.map_err(StoreError::backend)?;
        if !body.success {
            return Err(StoreError::Backend("server reported delete failure".into()));
        }
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let resp = self
            .client
            .get(self.base.clone())
            .send()
            .await
            .map_err(StoreError::backend)?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        let body: KeysBody = resp.json().await.map_err(StoreError::backend)?;
        Ok(body.keys)
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(capability, Capability::ListKeys)
    }

    fn backend_name(&self) -> &'static str { "http" }
}
