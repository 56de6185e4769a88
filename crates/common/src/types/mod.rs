use serde::{Deserialize, Serialize};

/// Message returned for a missing key; clients match on it verbatim.
pub const KEY_NOT_FOUND: &str = "Key not found";

#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    pub status: &'static str,
}

/// `{ "value": "..." }`: GET response and POST request body of `/storage/:key`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ValueBody {
    pub value: String,
}

/// `{ "keys": [...] }`: response of `GET /storage`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct KeysBody {
    pub keys: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SuccessBody {
    pub success: bool,
}

impl SuccessBody {
    pub fn ok() -> Self { Self { success: true } }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(msg: impl Into<String>) -> Self { Self { error: msg.into() } }
    pub fn key_not_found() -> Self { Self::new(KEY_NOT_FOUND) }
}

/// `{ "path": "..." }`: current storage root, also the body accepted by
/// `POST /config/storage-path` (where `path` may be missing).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StoragePathBody {
    #[serde(default)]
    pub path: Option<String>,
}
