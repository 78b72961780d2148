//! Tier orchestration.

use super::envelope;
use crate::callbacks::{CacheCallback, CacheEvent, CacheEventKind, CallbackHub};
use crate::compression::CompressionCodec;
use crate::error::BackendError;
use crate::key::{CacheKey, KeyStrategy, KEY_PREFIX};
use crate::security::SecurityLayer;
use crate::tiers::{MemoryTier, PersistentTier};
use crate::{Error, ErrorContext, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Point-in-time counters exposed via [`CacheEngine::stats`].
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub set_count: u64,
    pub delete_count: u64,
    pub error_count: u64,
    pub memory_entries: usize,
    pub memory_usage_estimate: usize,
    pub backend_connected: bool,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
}

pub(crate) struct EngineParts {
    pub key_strategy: Arc<dyn KeyStrategy>,
    pub memory: Option<MemoryTier>,
    pub persistent: Arc<dyn PersistentTier>,
    pub codec: CompressionCodec,
    pub security: Option<SecurityLayer>,
    pub default_ttl: Duration,
    pub operation_ttls: HashMap<String, Duration>,
    pub compression_threshold: usize,
    pub max_entry_size: usize,
    pub fail_on_backend_unavailable: bool,
}

/// The cache engine: orchestrates the memory and persistent tiers.
///
/// Read path: memory, then persistent (with promotion back into memory),
/// then miss. Write path: serialize, compress at or above the threshold,
/// encrypt when configured, write through both tiers. A persistent-tier
/// outage degrades to memory-only operation and is reported only through
/// the `error` callback channel, never as a caller-visible failure, unless
/// `fail_on_backend_unavailable` was set.
///
/// The memory tier is authoritative for reads that hit it; the engine does
/// not re-validate against the persistent tier within a TTL window. Callers
/// must not depend on immediate cross-tier invalidation visibility.
pub struct CacheEngine {
    key_strategy: Arc<dyn KeyStrategy>,
    memory: Option<MemoryTier>,
    persistent: Arc<dyn PersistentTier>,
    codec: CompressionCodec,
    security: Option<SecurityLayer>,
    hub: CallbackHub,
    stats: AtomicStats,
    backend_connected: AtomicBool,
    default_ttl: Duration,
    operation_ttls: HashMap<String, Duration>,
    compression_threshold: usize,
    max_entry_size: usize,
    fail_on_backend_unavailable: bool,
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine").finish_non_exhaustive()
    }
}

impl CacheEngine {
    pub(crate) fn from_parts(parts: EngineParts) -> Self {
        Self {
            key_strategy: parts.key_strategy,
            memory: parts.memory,
            persistent: parts.persistent,
            codec: parts.codec,
            security: parts.security,
            hub: CallbackHub::new(),
            stats: AtomicStats::new(),
            backend_connected: AtomicBool::new(false),
            default_ttl: parts.default_ttl,
            operation_ttls: parts.operation_ttls,
            compression_threshold: parts.compression_threshold,
            max_entry_size: parts.max_entry_size,
            fail_on_backend_unavailable: parts.fail_on_backend_unavailable,
        }
    }

    /// Derive a cache key via the injected strategy.
    pub fn generate_key(
        &self,
        operation: &str,
        content: &str,
        options: &BTreeMap<String, serde_json::Value>,
    ) -> Result<CacheKey> {
        self.key_strategy.generate(operation, content, options)
    }

    /// Register an observer for one event kind.
    pub fn register_callback(&self, kind: CacheEventKind, handler: CacheCallback) {
        self.hub.register(kind, handler);
    }

    /// Fetch and deserialize. A value that no longer deserializes (schema
    /// drift) is treated as a miss, not an error.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        match self.get_bytes(key).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "cached value failed to deserialize; treating as miss");
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Serialize and store with the resolved TTL
    /// (explicit argument > operation override > default).
    pub async fn set<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set_bytes(key, bytes, ttl).await
    }

    /// Raw read path: memory tier, then persistent tier with promotion.
    pub async fn get_bytes(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        if let Some(memory) = &self.memory {
            if let Some(bytes) = memory.get(key.as_str()) {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                self.hub.emit(&CacheEvent::Hit {
                    key: key.clone(),
                    value: Arc::new(bytes.clone()),
                });
                tracing::debug!(key = %key, tier = "memory", "cache hit");
                return Ok(Some(bytes));
            }
        }

        match self.persistent.get(key.as_str()).await {
            Ok(Some(raw)) => {
                self.backend_connected.store(true, Ordering::Relaxed);
                match self.open_envelope(&raw) {
                    Ok(bytes) => {
                        if let Some(memory) = &self.memory {
                            let ttl = self.resolve_ttl(key.operation(), None);
                            memory.set(key.as_str(), bytes.clone(), ttl);
                        }
                        self.stats.hits.fetch_add(1, Ordering::Relaxed);
                        self.hub.emit(&CacheEvent::Hit {
                            key: key.clone(),
                            value: Arc::new(bytes.clone()),
                        });
                        tracing::debug!(key = %key, tier = "persistent", "cache hit (promoted)");
                        Ok(Some(bytes))
                    }
                    Err(e) => {
                        // Fail closed: untrustworthy data is a hard miss.
                        tracing::error!(
                            key = %key,
                            error = %e,
                            "stored payload could not be recovered; possible key rotation or tampering"
                        );
                        self.stats.errors.fetch_add(1, Ordering::Relaxed);
                        self.stats.misses.fetch_add(1, Ordering::Relaxed);
                        self.hub.emit(&CacheEvent::Error {
                            key: key.clone(),
                            detail: e.to_string(),
                        });
                        Ok(None)
                    }
                }
            }
            Ok(None) => {
                self.backend_connected.store(true, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                self.hub.emit(&CacheEvent::Miss { key: key.clone() });
                tracing::debug!(key = %key, "cache miss");
                Ok(None)
            }
            Err(err) => {
                self.report_backend_error(key, err)?;
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Raw write path: write through the persistent tier (degrading on
    /// outage) and always the memory tier.
    pub async fn set_bytes(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let ttl = self.resolve_ttl_checked(key.operation(), ttl)?;

        if value.len() > self.max_entry_size {
            tracing::debug!(
                key = %key,
                size = value.len(),
                limit = self.max_entry_size,
                "value exceeds max entry size; skipping cache"
            );
            return Ok(());
        }

        let framed = self.seal_envelope(&value)?;
        match self.persistent.set(key.as_str(), &framed, ttl).await {
            Ok(()) => self.backend_connected.store(true, Ordering::Relaxed),
            Err(err) => self.report_backend_error(key, err)?,
        }

        if let Some(memory) = &self.memory {
            memory.set(key.as_str(), value.clone(), ttl);
        }

        self.stats.sets.fetch_add(1, Ordering::Relaxed);
        self.hub.emit(&CacheEvent::Set {
            key: key.clone(),
            value: Arc::new(value),
        });
        Ok(())
    }

    /// Delete from both tiers; absence in either is not an error.
    pub async fn delete(&self, key: &CacheKey) -> Result<()> {
        if let Some(memory) = &self.memory {
            memory.delete(key.as_str());
        }
        match self.persistent.delete(key.as_str()).await {
            Ok(_) => self.backend_connected.store(true, Ordering::Relaxed),
            Err(err) => self.report_backend_error(key, err)?,
        }
        self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        self.hub.emit(&CacheEvent::Delete { key: key.clone() });
        Ok(())
    }

    /// Presence probe without touching hit/miss counters. Memory tier is
    /// authoritative when it has the key; a backend outage reads as absent.
    pub async fn exists(&self, key: &CacheKey) -> Result<bool> {
        if let Some(memory) = &self.memory {
            if memory.get(key.as_str()).is_some() {
                return Ok(true);
            }
        }
        match self.persistent.exists(key.as_str()).await {
            Ok(found) => {
                self.backend_connected.store(true, Ordering::Relaxed);
                Ok(found)
            }
            Err(err) => {
                self.report_backend_error(key, err)?;
                Ok(false)
            }
        }
    }

    /// Drop every cache entry in both tiers.
    pub async fn clear(&self) -> Result<()> {
        if let Some(memory) = &self.memory {
            memory.clear();
        }
        let pattern = format!("{}:*", KEY_PREFIX);
        match self.persistent.delete_by_pattern(&pattern).await {
            Ok(count) => {
                self.backend_connected.store(true, Ordering::Relaxed);
                tracing::debug!(count, "cleared persistent tier");
                Ok(())
            }
            Err(err) => {
                let key = CacheKey::new(pattern, "*");
                self.report_backend_error(&key, err)
            }
        }
    }

    /// Bulk invalidation of every entry belonging to one logical operation.
    /// Returns the number of keys removed from the persistent tier.
    pub async fn invalidate_operation(&self, operation: &str) -> Result<u64> {
        if operation.is_empty() || operation.contains(':') || operation.contains('*') {
            return Err(Error::validation_with_context(
                "invalid operation name for invalidation",
                ErrorContext::new()
                    .with_field_path("key.operation")
                    .with_source("cache_engine"),
            ));
        }
        let prefix = format!("{}:{}:", KEY_PREFIX, operation);
        if let Some(memory) = &self.memory {
            memory.delete_by_prefix(&prefix);
        }
        let pattern = format!("{}*", prefix);
        match self.persistent.delete_by_pattern(&pattern).await {
            Ok(count) => {
                self.backend_connected.store(true, Ordering::Relaxed);
                tracing::debug!(operation, count, "invalidated operation entries");
                Ok(count)
            }
            Err(err) => {
                let key = CacheKey::new(pattern, operation);
                self.report_backend_error(&key, err)?;
                Ok(0)
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.stats.hits.load(Ordering::Relaxed),
            miss_count: self.stats.misses.load(Ordering::Relaxed),
            set_count: self.stats.sets.load(Ordering::Relaxed),
            delete_count: self.stats.deletes.load(Ordering::Relaxed),
            error_count: self.stats.errors.load(Ordering::Relaxed),
            memory_entries: self.memory.as_ref().map(MemoryTier::len).unwrap_or(0),
            memory_usage_estimate: self
                .memory
                .as_ref()
                .map(MemoryTier::usage_bytes)
                .unwrap_or(0),
            backend_connected: self.backend_connected.load(Ordering::Relaxed),
        }
    }

    /// Probe the persistent tier and refresh `stats().backend_connected`.
    pub async fn ping_backend(&self) -> bool {
        let alive = self.persistent.ping().await;
        self.backend_connected.store(alive, Ordering::Relaxed);
        alive
    }

    /// Release the persistent-tier connection. The engine is not usable
    /// afterwards beyond memory-tier reads already promoted.
    pub async fn close(&self) {
        self.persistent.close().await;
        self.backend_connected.store(false, Ordering::Relaxed);
    }

    fn resolve_ttl(&self, operation: &str, explicit: Option<Duration>) -> Duration {
        explicit
            .or_else(|| self.operation_ttls.get(operation).copied())
            .unwrap_or(self.default_ttl)
    }

    fn resolve_ttl_checked(&self, operation: &str, explicit: Option<Duration>) -> Result<Duration> {
        if let Some(ttl) = explicit {
            if ttl.is_zero() {
                return Err(Error::validation_with_context(
                    "ttl must be positive",
                    ErrorContext::new()
                        .with_field_path("set.ttl")
                        .with_source("cache_engine"),
                ));
            }
        }
        Ok(self.resolve_ttl(operation, explicit))
    }

    /// Serialize-order transforms: compress above the threshold, then
    /// encrypt when a security layer is configured, then frame.
    fn seal_envelope(&self, value: &[u8]) -> Result<Vec<u8>> {
        let compress = value.len() >= self.compression_threshold;
        let mut body = if compress {
            self.codec.compress(value)?
        } else {
            value.to_vec()
        };
        let encrypted = match &self.security {
            Some(layer) => {
                body = layer.encrypt(&body)?;
                true
            }
            None => false,
        };
        Ok(envelope::encode(&body, compress, encrypted))
    }

    /// Reverse of [`Self::seal_envelope`].
    fn open_envelope(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let envelope = envelope::decode(raw)?;
        let mut body = envelope.body;
        if envelope.encrypted {
            let layer = self.security.as_ref().ok_or_else(|| {
                Error::decryption("stored payload is encrypted but no key is configured")
            })?;
            body = layer.decrypt(&body)?;
        }
        if envelope.compressed {
            body = self.codec.decompress(&body)?;
        }
        Ok(body)
    }

    /// Record a backend failure: bump counters, flip connectivity, notify
    /// observers. Propagates only when `fail_on_backend_unavailable` is set.
    fn report_backend_error(&self, key: &CacheKey, err: BackendError) -> Result<()> {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        if err.is_unavailable() {
            self.backend_connected.store(false, Ordering::Relaxed);
        }
        tracing::warn!(
            key = %key,
            backend = self.persistent.name(),
            error = %err,
            "persistent tier call failed; degrading to memory-only"
        );
        self.hub.emit(&CacheEvent::Error {
            key: key.clone(),
            detail: err.to_string(),
        });
        if self.fail_on_backend_unavailable {
            return Err(Error::Backend(err));
        }
        Ok(())
    }
}
