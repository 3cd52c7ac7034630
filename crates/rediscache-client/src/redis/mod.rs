//! Redis store backend.

pub mod connector;
pub mod store;

pub use connector::RedisConnector;
pub use store::RedisStore;
