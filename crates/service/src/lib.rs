//! Storage and application services for the whiteboard.
//! - `storage`: the key/value contract and its local, file, HTTP and real-time backends.
//! - `whiteboard`: session and contribution records built on top of any backend.
//! - Errors are split between backend failures (`StoreError`) and
//!   application-level failures (`ServiceError`).

pub mod errors;
pub mod storage;
pub mod whiteboard;
#[cfg(test)]
pub mod test_support;

pub use errors::{ServiceError, StoreError};
pub use storage::{open_store, Capability, Entry, KeyValueStore, Subscription};
