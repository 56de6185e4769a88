use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use common::types::StoragePathBody;
use serde::Serialize;

use super::AppState;
use crate::errors::ApiError;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StoragePathNotice {
    pub message: String,
    pub current_path: String,
}

pub async fn get_storage_path(State(state): State<AppState>) -> Json<StoragePathBody> {
    Json(StoragePathBody { path: Some(state.storage_root.clone()) })
}

/// The root is fixed for the process lifetime; this only tells the caller how
/// to change it.
pub async fn set_storage_path(
    State(state): State<AppState>,
    body: Result<Json<StoragePathBody>, JsonRejection>,
) -> Result<Json<StoragePathNotice>, ApiError> {
    // an unreadable body counts as no path
    let path = body.ok().and_then(|Json(b)| b.path);
    let requested = path.as_deref().map(str::trim).unwrap_or_default();
    if requested.is_empty() {
        return Err(ApiError::BadRequest("Path is required".into()));
    }
    Ok(Json(StoragePathNotice {
        message: format!(
            "To change the storage path, restart the server with STORAGE_PATH=\"{}\"",
            requested
        ),
        current_path: state.storage_root.clone(),
    }))
}
