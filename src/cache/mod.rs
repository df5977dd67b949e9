//! External key-value cache.
//!
//! The cache is a secondary, best-effort index of in-memory session and room
//! state that other services read. It is never authoritative: nothing in this
//! process reads it back.
//!
//! - [`CacheStore`]: storage backend trait ([`RedisStore`], [`MemoryStore`])
//! - [`keys`]: key scheme
//! - [`records`]: field encoding for hash records
//! - [`CacheSync`]: the write protocol used by sessions and rooms

pub mod keys;
mod memory;
pub mod records;
mod redis_store;
mod sync;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use sync::CacheSync;

use async_trait::async_trait;
use thiserror::Error;

/// Cache backend errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("invalid key pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// A key-value store holding string and hash records.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Set a string key.
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Replace a hash record with exactly `fields`.
    ///
    /// Fields from a previous write that are absent from `fields` must not
    /// survive.
    async fn replace_hash(
        &self,
        key: &str,
        fields: &[(&'static str, String)],
    ) -> Result<(), CacheError>;

    /// Delete keys. Missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;

    /// Delete every key matching a glob pattern, returning how many went.
    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError>;
}
