use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use common::types::{KeysBody, SuccessBody, ValueBody};
use tracing::debug;

use super::AppState;
use crate::errors::ApiError;
use crate::metrics;

pub async fn list_keys(State(state): State<AppState>) -> Result<Json<KeysBody>, ApiError> {
    metrics::record("list");
    let keys = state.store.list_keys().await?;
    Ok(Json(KeysBody { keys }))
}

pub async fn get_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ValueBody>, ApiError> {
    metrics::record("get");
    match state.store.get(&key).await? {
        Some(entry) => Ok(Json(ValueBody { value: entry.value })),
        None => {
            debug!(key = %key, "key not found");
            Err(ApiError::KeyNotFound)
        }
    }
}

pub async fn set_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Result<Json<ValueBody>, JsonRejection>,
) -> Result<Json<SuccessBody>, ApiError> {
    metrics::record("set");
    let Json(body) = body?;
    state.store.set(&key, &body.value).await?;
    debug!(key = %key, bytes = body.value.len(), "value stored");
    Ok(Json(SuccessBody::ok()))
}

/// Succeeds for absent keys too.
pub async fn delete_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<SuccessBody>, ApiError> {
    metrics::record("delete");
    state.store.delete(&key).await?;
    Ok(Json(SuccessBody::ok()))
}
