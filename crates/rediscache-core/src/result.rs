//! Convenience result type alias for RedisCache.

use crate::error::AppError;

/// A specialized `Result` type for RedisCache operations.
pub type AppResult<T> = Result<T, AppError>;
