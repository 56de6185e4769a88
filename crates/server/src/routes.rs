use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use common::types::Health;
use service::KeyValueStore;

use crate::metrics;

pub mod config;
pub mod storage;

/// Shared by every handler: the backend behind `/storage` and the root it
/// was opened on, reported by `/config/storage-path`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeyValueStore>,
    pub storage_root: String,
}

impl AppState {
    pub fn new(store: Arc<dyn KeyValueStore>, storage_root: impl Into<String>) -> Self {
        Self { store, storage_root: storage_root.into() }
    }
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn metrics_text() -> impl IntoResponse {
    metrics::encode_metrics()
}

/// Build the full application router: storage API, config, health and metrics.
pub fn build_router(state: AppState, cors: CorsLayer, body_limit: usize) -> Router {
    let storage_routes = Router::new()
        .route("/storage", get(storage::list_keys))
        .route(
            "/storage/:key",
            get(storage::get_value).post(storage::set_value).delete(storage::delete_value),
        )
        .layer(DefaultBodyLimit::max(body_limit));

    let config_routes = Router::new().route(
        "/config/storage-path",
        get(config::get_storage_path).post(config::set_storage_path),
    );

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .merge(storage_routes)
        .merge(config_routes)
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}
