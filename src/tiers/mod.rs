//! Storage tiers.
//!
//! The cache hierarchy has two layers: a bounded in-process memory tier
//! ([`MemoryTier`]) and a shared persistent tier behind the
//! [`PersistentTier`] trait. The engine orchestrates promotion and
//! write-through between them; each tier owns its own locking, so memory
//! lookups never contend with network calls.

mod memory;
mod redis;

pub use memory::MemoryTier;
pub use redis::RedisTier;

use crate::error::BackendError;
use async_trait::async_trait;
use std::time::Duration;

/// Async seam over the shared persistent store.
///
/// Implementations must distinguish "key absent" (`Ok(None)`) from
/// "store unreachable" ([`BackendError::Unavailable`]); the engine treats
/// the two very differently.
#[async_trait]
pub trait PersistentTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, BackendError>;

    async fn exists(&self, key: &str) -> Result<bool, BackendError>;

    /// Bulk invalidation by glob-style pattern; returns the number of keys
    /// removed. Must iterate with a cursor rather than a single blocking
    /// keyspace walk.
    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, BackendError>;

    /// Liveness probe. Never errors; an unreachable store is `false`.
    async fn ping(&self) -> bool;

    /// Release pooled connections. Default is a no-op.
    async fn close(&self) {}

    fn name(&self) -> &'static str;
}

/// No-op persistent tier for memory-only configurations.
#[derive(Debug, Default)]
pub struct NullTier;

impl NullTier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PersistentTier for NullTier {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), BackendError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<bool, BackendError> {
        Ok(false)
    }

    async fn exists(&self, _key: &str) -> Result<bool, BackendError> {
        Ok(false)
    }

    async fn delete_by_pattern(&self, _pattern: &str) -> Result<u64, BackendError> {
        Ok(0)
    }

    async fn ping(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "null"
    }
}
