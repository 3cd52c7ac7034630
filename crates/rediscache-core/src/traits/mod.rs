//! Core traits defined in `rediscache-core` and implemented by other crates.

pub mod store;

pub use store::{KeyValueStore, StoreConnector};
