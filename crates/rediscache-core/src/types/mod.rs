//! Shared value types used across RedisCache crates.

pub mod client_name;
pub mod connection;

pub use client_name::ClientName;
pub use connection::{ConnectionOptions, ProtocolVersion, RetryPolicy};
