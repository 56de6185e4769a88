use thiserror::Error;

use crate::storage::Capability;

/// Failures of a key/value backend. A missing key is not an error: `get`
/// reports it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("{backend} backend does not support {capability}")]
    Unsupported {
        backend: &'static str,
        capability: Capability,
    },
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self { Self::Backend(err.to_string()) }

    pub fn unsupported(backend: &'static str, capability: Capability) -> Self {
        Self::Unsupported { backend, capability }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self { Self::Serialization(e.to_string()) }
}

/// Errors of the whiteboard application layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("classifier error: {0}")]
    Classifier(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
