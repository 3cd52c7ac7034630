//! # rediscache-client
//!
//! Named, lazily connected cache clients. Supports two store backends:
//!
//! - **redis**: Redis-backed store using the [redis](https://crates.io/crates/redis) crate
//! - **memory**: In-process store using [moka](https://crates.io/crates/moka)
//!
//! Clients are declared up front in a [`CacheRegistry`], realized on first
//! use by a [`CacheClientFactory`], and connect at most once per name.

pub mod client;
pub mod factory;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;
pub mod registration;
pub mod registry;

pub use client::{CacheClient, DEFAULT_TTL_MINUTES, ReadOutcome, Subscriber};
pub use factory::CacheClientFactory;
pub use registration::{ClientRegistration, RegistrationState};
pub use registry::CacheRegistry;
