//! Shared building blocks for the whiteboard workspace:
//! wire types of the storage HTTP API, logging setup and startup helpers.

pub mod types;
pub mod utils;
pub mod env;
