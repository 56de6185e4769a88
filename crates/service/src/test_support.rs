#![cfg(test)]
use std::{
    convert::Infallible,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use serde_json::{json, Map, Value};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc, RwLock},
};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::storage::{Capability, ChangeCallback, KeyValueStore};

/// Unique, not yet created directory under the system temp dir.
pub fn temp_dir(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("wb_{}_{}", prefix, Uuid::new_v4()))
}

/// Unique file path under the system temp dir.
pub fn temp_path(prefix: &str, ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!("wb_{}_{}.{}", prefix, Uuid::new_v4(), ext))
}

/// Callback forwarding each notification's value into a channel.
pub fn collect_changes() -> (ChangeCallback, mpsc::UnboundedReceiver<Option<String>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: ChangeCallback = Arc::new(move |entry| {
        let _ = tx.send(entry.map(|e| e.value));
    });
    (callback, rx)
}

/// Behaviour every backend must show, run against a fresh, empty store.
pub async fn assert_store_contract(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    // unset key is absent
    assert!(store.get("never-set").await?.is_none());
    assert!(!store.exists("never-set").await?);

    // round trip, byte for byte
    let payload = "{\"id\":\"sess1\",\"question\":\"Qu'en pensez-vous ? ✨\"}\n";
    store.set("sess1", payload).await?;
    let entry = store.get("sess1").await?.expect("value present after set");
    assert_eq!(entry.key, "sess1");
    assert_eq!(entry.value, payload);

    // empty string is a value, not absence
    store.set("empty", "").await?;
    assert_eq!(store.get("empty").await?.map(|e| e.value), Some(String::new()));

    // last write wins
    store.set("k", "v1").await?;
    store.set("k", "v2").await?;
    assert_eq!(store.get("k").await?.map(|e| e.value).as_deref(), Some("v2"));

    // delete then get is absent; delete is idempotent
    store.delete("k").await?;
    assert!(store.get("k").await?.is_none());
    store.delete("k").await?;
    store.delete("missing-key").await?;
    assert!(store.get("missing-key").await?.is_none());

    if store.supports(Capability::ListKeys) {
        store.delete("sess1").await?;
        store.delete("empty").await?;
        store.set("a", "x").await?;
        store.set("b", "y").await?;
        let mut keys = store.list_keys().await?;
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    } else {
        assert!(matches!(
            store.list_keys().await,
            Err(StoreError::Unsupported { capability: Capability::ListKeys, .. })
        ));
    }
    Ok(())
}

// ── Fake real-time database ─────────────────────────────────

#[derive(Clone)]
struct FakeDb {
    root: Arc<RwLock<Value>>,
    writes: broadcast::Sender<String>,
}

fn segments(path: &str) -> Vec<String> {
    path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn node_at<'a>(root: &'a Value, segs: &[String]) -> &'a Value {
    let mut cur = root;
    for s in segs {
        match cur.get(s) {
            Some(next) => cur = next,
            None => return &Value::Null,
        }
    }
    cur
}

fn write_at(root: &mut Value, segs: &[String], value: Value) {
    if segs.is_empty() {
        *root = value;
        return;
    }
    if !root.is_object() {
        *root = Value::Object(Map::new());
    }
    let map = root.as_object_mut().expect("object");
    if segs.len() == 1 {
        if value.is_null() {
            map.remove(&segs[0]);
        } else {
            map.insert(segs[0].clone(), value);
        }
        return;
    }
    let child = map.entry(segs[0].clone()).or_insert(Value::Null);
    write_at(child, &segs[1..], value);
    if child.as_object().map(|m| m.is_empty()).unwrap_or(false) {
        map.remove(&segs[0]);
    }
}

fn node_path(raw: &str) -> Vec<String> {
    segments(raw.strip_suffix(".json").unwrap_or(raw))
}

async fn fake_get(
    State(db): State<FakeDb>,
    Path(raw): Path<String>,
    headers: HeaderMap,
) -> Response {
    let watched = node_path(&raw);
    let wants_stream = headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false);

    if !wants_stream {
        let root = db.root.read().await;
        return Json(node_at(&root, &watched).clone()).into_response();
    }

    let mut rx = db.writes.subscribe();
    let initial = node_at(&*db.root.read().await, &watched).clone();
    let root = Arc::clone(&db.root);

    let stream = async_stream::stream! {
        yield Ok::<_, Infallible>(Event::default()
            .event("put")
            .data(json!({"path": "/", "data": initial}).to_string()));
        while let Ok(written) = rx.recv().await {
            let written = segments(&written);
            if written.starts_with(&watched) && written.len() > watched.len() {
                let rel = format!("/{}", written[watched.len()..].join("/"));
                let data = node_at(&*root.read().await, &written).clone();
                yield Ok(Event::default().event("put").data(json!({"path": rel, "data": data}).to_string()));
            } else if watched.starts_with(&written) {
                let data = node_at(&*root.read().await, &watched).clone();
                yield Ok(Event::default().event("put").data(json!({"path": "/", "data": data}).to_string()));
            }
        }
    };
    Sse::new(stream).into_response()
}

async fn fake_put(
    State(db): State<FakeDb>,
    Path(raw): Path<String>,
    Json(value): Json<Value>,
) -> Json<Value> {
    let segs = node_path(&raw);
    write_at(&mut *db.root.write().await, &segs, value.clone());
    let _ = db.writes.send(segs.join("/"));
    Json(value)
}

async fn fake_delete(State(db): State<FakeDb>, Path(raw): Path<String>) -> StatusCode {
    let segs = node_path(&raw);
    write_at(&mut *db.root.write().await, &segs, Value::Null);
    let _ = db.writes.send(segs.join("/"));
    StatusCode::OK
}

/// Start an in-process stand-in for the real-time database REST API and
/// return its base URL.
pub async fn spawn_fake_realtime() -> Result<String, anyhow::Error> {
    let (writes, _) = broadcast::channel(64);
    let db = FakeDb { root: Arc::new(RwLock::new(Value::Null)), writes };
    let app = Router::new()
        .route("/*path", get(fake_get).put(fake_put).delete(fake_delete))
        .with_state(db);

    let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("fake realtime server error: {}", e);
        }
    });
    Ok(format!("http://{}", addr))
}
