use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::types::ErrorBody;
use service::StoreError;
use thiserror::Error;
use tracing::{error, warn};

use crate::metrics;

/// Error half of every storage handler. Always rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Key not found")]
    KeyNotFound,
    #[error("{0}")]
    BadRequest(String),
    /// Body missing, not JSON, or without a string `value`.
    #[error("{}", .0.body_text())]
    BadBody(#[from] JsonRejection),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::KeyNotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::BadBody(r) if r.status() == StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::InvalidKey(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::Unsupported { .. }) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::KeyNotFound => ErrorBody::key_not_found(),
            // the backend message goes out as-is, clients show it
            ApiError::Store(StoreError::Backend(msg)) => ErrorBody::new(msg.clone()),
            other => ErrorBody::new(other.to_string()),
        };
        if status.is_server_error() {
            metrics::STORAGE_ERRORS_TOTAL.inc();
            error!(status = status.as_u16(), error = %body.error, "storage request failed");
        } else if status != StatusCode::NOT_FOUND {
            warn!(status = status.as_u16(), error = %body.error, "storage request rejected");
        }
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("storage directory unavailable: {0}")]
    StorageDir(String),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use service::Capability;

    #[test]
    fn store_errors_map_to_statuses() {
        assert_eq!(ApiError::KeyNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(StoreError::InvalidKey("..".into())).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(StoreError::unsupported("realtime", Capability::ListKeys)).status(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            ApiError::from(StoreError::Backend("EACCES".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
