//! # rediscache-core
//!
//! Core crate for RedisCache. Contains the store traits, configuration
//! schemas, validated client names, store lifecycle events, and the
//! unified error system.
//!
//! This crate has **no** internal dependencies on other RedisCache crates
//! and no dependency on a concrete store client library.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
