//! Adapter over a hosted, path-addressed real-time database (Firebase
//! Realtime Database REST protocol).
//!
//! - `GET/PUT/DELETE {base}/{key}.json` read, overwrite and remove a node.
//! - Values are written as JSON strings; nodes written by other clients as
//!   arbitrary JSON are read back as their serialized text.
//! - `subscribe` holds a `text/event-stream` request open on the node and
//!   reconnects with capped exponential backoff until the handle is dropped.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Capability, ChangeCallback, Entry, KeyValueStore, Subscription};
use crate::errors::StoreError;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RealtimeStore {
    client: Client,
    base: Url,
    auth_token: Option<String>,
    request_timeout: Duration,
}

impl RealtimeStore {
    pub fn new(
        database_url: &str,
        auth_token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, StoreError> {
        // No client-wide timeout: it would cut the long-lived event streams.
        let client = Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(StoreError::backend)?;
        let base = Url::parse(database_url)
            .map_err(|e| StoreError::Backend(format!("invalid database url `{database_url}`: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Backend(format!("invalid database url `{database_url}`")));
        }
        Ok(Self {
            client,
            base,
            auth_token: auth_token.filter(|t| !t.is_empty()),
            request_timeout,
        })
    }

    /// `{base}/{seg}/.../{last}.json[?auth=token]`. Path-like keys address
    /// nested nodes.
    fn node_url(&self, key: &str) -> Result<Url, StoreError> {
        validate_path(key)?;
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::Backend("database url cannot take a path".into()))?;
            segments.pop_if_empty();
            let mut parts = key.split('/').peekable();
            while let Some(part) = parts.next() {
                if parts.peek().is_some() {
                    segments.push(part);
                } else {
                    segments.push(&format!("{part}.json"));
                }
            }
        }
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }

    async fn read_node(&self, url: Url) -> Result<Value, StoreError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(StoreError::backend)?;
        let resp = check_status(resp).await?;
        resp.json::<Value>().await.map_err(StoreError::backend)
    }
}

/// Keys may contain `/` to address nested nodes, but no empty segments and
/// none of the characters the database reserves.
fn validate_path(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.split('/').any(|s| s.is_empty()) {
        return Err(StoreError::InvalidKey(format!("`{key}` is not a valid node path")));
    }
    if key.contains(&['.', '#', '$', '[', ']', '\0'][..]) {
        return Err(StoreError::InvalidKey(format!("`{key}` contains a reserved character")));
    }
    Ok(())
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let msg = match resp.json::<Value>().await {
        Ok(body) => body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
    };
    Err(StoreError::Backend(format!("HTTP {}: {}", status.as_u16(), msg)))
}

/// JSON node → stored value. `null` means absent; strings are unwrapped;
/// anything else is kept as its JSON text.
fn decode_node(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl KeyValueStore for RealtimeStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>, StoreError> {
        let url = self.node_url(key)?;
        let node = self.read_node(url).await?;
        Ok(decode_node(node).map(|v| Entry::new(key, v)))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let url = self.node_url(key)?;
        let resp = self
            .client
            .put(url)
            .timeout(self.request_timeout)
            .json(&Value::String(value.to_string()))
            .send()
            .await
            .map_err(StoreError::backend)?;
        check_status(resp).await?;
        debug!(key, bytes = value.len(), "realtime set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let url = self.node_url(key)?;
        let resp = self
            .client
            .delete(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(StoreError::backend)?;
        check_status(resp).await?;
        debug!(key, "realtime delete");
        Ok(())
    }

    async fn subscribe(
        &self,
        key: &str,
        on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError> {
        let url = self.node_url(key)?;
        let listener = Listener {
            store: self.clone(),
            key: key.to_string(),
            url,
            on_change,
        };
        let task = tokio::spawn(listener.run());
        Ok(Subscription::new(key, task))
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(capability, Capability::Subscribe)
    }

    fn backend_name(&self) -> &'static str { "realtime" }
}

// ── Event stream listener ───────────────────────────────────

/// Payload of `put` / `patch` events.
#[derive(Debug, Deserialize)]
struct NodeEvent {
    path: String,
    #[serde(default)]
    data: Value,
}

enum Flow {
    Continue,
    Stop,
}

struct Listener {
    store: RealtimeStore,
    key: String,
    url: Url,
    on_change: ChangeCallback,
}

impl Listener {
    async fn run(self) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let req = self
                .store
                .client
                .get(self.url.clone())
                .header("Accept", "text/event-stream");

            match req.send().await {
                Ok(response) if response.status().is_success() => {
                    backoff = INITIAL_BACKOFF;
                    info!(key = %self.key, "connected to realtime event stream");

                    let mut stream = response.bytes_stream();
                    let mut decoder = SseDecoder::default();

                    while let Some(chunk) = stream.next().await {
                        let chunk = match chunk {
                            Ok(c) => c,
                            Err(e) => {
                                warn!(key = %self.key, error = %e, "event stream error");
                                break;
                            }
                        };
                        for event in decoder.push(&chunk) {
                            if let Flow::Stop = self.handle(event).await {
                                return;
                            }
                        }
                    }
                    warn!(key = %self.key, "event stream ended, reconnecting");
                }
                Ok(response) => {
                    warn!(key = %self.key, status = %response.status(), ?backoff, "event stream refused");
                }
                Err(e) => {
                    warn!(key = %self.key, error = %e, ?backoff, "event stream connection failed");
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn handle(&self, event: SseEvent) -> Flow {
        match event.event.as_str() {
            "put" | "patch" => {
                let node: NodeEvent = match serde_json::from_str(&event.data) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(key = %self.key, error = %e, "malformed event payload");
                        return Flow::Continue;
                    }
                };
                if event.event == "put" && node.path == "/" {
                    self.emit(decode_node(node.data));
                } else {
                    // a child changed: re-read the whole value
                    match self.store.get(&self.key).await {
                        Ok(entry) => (self.on_change)(entry),
                        Err(e) => warn!(key = %self.key, error = %e, "re-read after partial update failed"),
                    }
                }
                Flow::Continue
            }
            "keep-alive" => Flow::Continue,
            "cancel" | "auth_revoked" => {
                warn!(key = %self.key, reason = %event.event, data = %event.data, "event stream closed by server");
                Flow::Stop
            }
            other => {
                debug!(key = %self.key, event = other, "ignoring event");
                Flow::Continue
            }
        }
    }

    fn emit(&self, value: Option<String>) {
        (self.on_change)(value.map(|v| Entry::new(self.key.as_str(), v)));
    }
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct SseEvent {
    event: String,
    data: String,
}

/// Incremental `text/event-stream` decoder. Bytes are buffered until a full
/// line is available, so chunks may split lines or UTF-8 sequences.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    event: String,
    data: Vec<String>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.trim_end_matches('\r');

            if line.is_empty() {
                // blank line dispatches the pending event
                if !self.event.is_empty() || !self.data.is_empty() {
                    let event = if self.event.is_empty() { "message".to_string() } else { std::mem::take(&mut self.event) };
                    out.push(SseEvent { event, data: self.data.join("\n") });
                    self.data.clear();
                }
            } else if line.starts_with(':') {
                // comment
            } else {
                let (field, value) = match line.split_once(':') {
                    Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
                    None => (line, ""),
                };
                match field {
                    "event" => self.event = value.to_string(),
                    "data" => self.data.push(value.to_string()),
                    _ => {}
                }
            }
        }
        out
    }
}
