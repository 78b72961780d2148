//! Configuration and engine factory.
//!
//! [`CacheConfig`] is a typed struct with named fields plus a single
//! `additional_options` string map as a forward-compatibility escape hatch;
//! nothing in the engine merges untyped dictionaries. Configuration is
//! immutable once the engine is built; reconfiguration means building a new
//! engine.
//!
//! [`CacheEngineBuilder`] wires the codec, security layer, tiers and
//! callbacks into a [`CacheEngine`](crate::engine::CacheEngine). `build()`
//! accepts an injected persistent tier (tests, custom stores) or
//! constructs the Redis client from `persistent_tier_url`; with neither it
//! falls back to the no-op tier for memory-only operation.

use crate::callbacks::{CacheCallback, CacheEventKind};
use crate::compression::CompressionCodec;
use crate::engine::{CacheEngine, EngineParts};
use crate::key::{KeyStrategy, TieredKeyGenerator};
use crate::security::{self, DeploymentContext, SecurityConfig, SecurityLayer};
use crate::tiers::{MemoryTier, NullTier, PersistentTier, RedisTier};
use crate::{Error, ErrorContext, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Declarative cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Connection string for the backing store. Required in production.
    pub persistent_tier_url: Option<String>,
    pub deployment_context: DeploymentContext,
    pub default_ttl: Duration,
    /// Per-operation TTL overrides (operation name -> TTL).
    pub operation_ttls: HashMap<String, Duration>,
    pub memory_tier_enabled: bool,
    pub memory_tier_max_entries: usize,
    /// Cap on memory residency of entries with long persistent TTLs.
    pub memory_tier_max_ttl: Option<Duration>,
    pub compression_threshold_bytes: usize,
    pub compression_level: u32,
    /// Values above this size skip the cache entirely.
    pub max_entry_size_bytes: usize,
    /// Bound on every persistent-tier network call.
    pub backend_timeout: Duration,
    pub security: SecurityConfig,
    /// When set, construction and backend failures raise instead of
    /// degrading to memory-only operation.
    pub fail_on_backend_unavailable: bool,
    /// Narrow escape hatch for forward-compatible overrides.
    pub additional_options: BTreeMap<String, String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            persistent_tier_url: None,
            deployment_context: DeploymentContext::Development,
            default_ttl: Duration::from_secs(3600),
            operation_ttls: HashMap::new(),
            memory_tier_enabled: true,
            memory_tier_max_entries: 1000,
            memory_tier_max_ttl: Some(Duration::from_secs(3600)),
            compression_threshold_bytes: 1024,
            compression_level: 6,
            max_entry_size_bytes: 10 * 1024 * 1024,
            backend_timeout: Duration::from_secs(5),
            security: SecurityConfig::default(),
            fail_on_backend_unavailable: false,
            additional_options: BTreeMap::new(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Development preset: local backend, relaxed security checks.
    pub fn development() -> Self {
        Self {
            persistent_tier_url: Some("redis://localhost:6379".to_string()),
            ..Self::default()
        }
    }

    /// Testing preset: memory-only, short TTLs.
    pub fn testing() -> Self {
        Self {
            deployment_context: DeploymentContext::Testing,
            default_ttl: Duration::from_secs(60),
            memory_tier_max_entries: 100,
            ..Self::default()
        }
    }

    /// Production preset: the backend URL is mandatory and security
    /// validation is strict at build time.
    pub fn production(url: impl Into<String>) -> Self {
        Self {
            persistent_tier_url: Some(url.into()),
            deployment_context: DeploymentContext::Production,
            security: SecurityConfig::new()
                .with_require_transport_encryption(true)
                .with_encrypt_at_rest(true),
            ..Self::default()
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_operation_ttl(mut self, operation: impl Into<String>, ttl: Duration) -> Self {
        self.operation_ttls.insert(operation.into(), ttl);
        self
    }

    pub fn with_memory_tier(mut self, enabled: bool, max_entries: usize) -> Self {
        self.memory_tier_enabled = enabled;
        self.memory_tier_max_entries = max_entries;
        self
    }

    pub fn with_compression(mut self, threshold_bytes: usize, level: u32) -> Self {
        self.compression_threshold_bytes = threshold_bytes;
        self.compression_level = level;
        self
    }

    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    pub fn with_fail_on_backend_unavailable(mut self, fail: bool) -> Self {
        self.fail_on_backend_unavailable = fail;
        self
    }

    pub fn with_additional_option(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.additional_options.insert(key.into(), value.into());
        self
    }

    /// Structural validation; security policy is checked separately at
    /// build time against the deployment context.
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl.is_zero() {
            return Err(Error::configuration_with_context(
                "default_ttl must be positive",
                ErrorContext::new()
                    .with_field_path("config.default_ttl")
                    .with_source("cache_config"),
            ));
        }
        if let Some((operation, _)) = self
            .operation_ttls
            .iter()
            .find(|(_, ttl)| ttl.is_zero())
        {
            return Err(Error::configuration_with_context(
                "operation TTL must be positive",
                ErrorContext::new()
                    .with_field_path(format!("config.operation_ttls.{}", operation))
                    .with_source("cache_config"),
            ));
        }
        if self.memory_tier_enabled && self.memory_tier_max_entries == 0 {
            return Err(Error::configuration_with_context(
                "memory tier enabled with zero capacity",
                ErrorContext::new()
                    .with_field_path("config.memory_tier_max_entries")
                    .with_source("cache_config"),
            ));
        }
        if self.backend_timeout.is_zero() {
            return Err(Error::configuration_with_context(
                "backend_timeout must be positive",
                ErrorContext::new()
                    .with_field_path("config.backend_timeout")
                    .with_source("cache_config"),
            ));
        }
        if self.deployment_context == DeploymentContext::Production
            && self.persistent_tier_url.is_none()
        {
            return Err(Error::configuration_with_context(
                "persistent_tier_url is required in production",
                ErrorContext::new()
                    .with_field_path("config.persistent_tier_url")
                    .with_source("cache_config"),
            ));
        }
        Ok(())
    }
}

/// Factory wiring a [`CacheEngine`] from a [`CacheConfig`].
pub struct CacheEngineBuilder {
    config: CacheConfig,
    key_strategy: Option<Arc<dyn KeyStrategy>>,
    persistent: Option<Arc<dyn PersistentTier>>,
    callbacks: Vec<(CacheEventKind, CacheCallback)>,
}

impl CacheEngineBuilder {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            key_strategy: None,
            persistent: None,
            callbacks: Vec::new(),
        }
    }

    /// Override the key strategy (defaults to [`TieredKeyGenerator`]).
    pub fn key_strategy(mut self, strategy: Arc<dyn KeyStrategy>) -> Self {
        self.key_strategy = Some(strategy);
        self
    }

    /// Inject a persistent tier instead of building one from the URL
    /// (custom stores, test doubles).
    pub fn persistent_tier(mut self, tier: Arc<dyn PersistentTier>) -> Self {
        self.persistent = Some(tier);
        self
    }

    /// Pre-register an event observer.
    pub fn callback(mut self, kind: CacheEventKind, handler: CacheCallback) -> Self {
        self.callbacks.push((kind, handler));
        self
    }

    /// Validate configuration and security posture, then assemble the
    /// engine. With `fail_on_backend_unavailable` the backend is pinged
    /// once and an unreachable store fails construction.
    pub async fn build(self) -> Result<CacheEngine> {
        self.config.validate()?;
        security::validate(
            &self.config.security,
            self.config.deployment_context,
            self.config.persistent_tier_url.as_deref(),
        )?;

        let codec = CompressionCodec::new(self.config.compression_level)?;
        let security_layer = if self.config.security.encrypt_at_rest {
            Some(SecurityLayer::from_config(&self.config.security)?)
        } else {
            None
        };

        let persistent: Arc<dyn PersistentTier> = match self.persistent {
            Some(tier) => tier,
            None => match self.config.persistent_tier_url.as_deref() {
                Some(url) => Arc::new(RedisTier::new(url, self.config.backend_timeout)?),
                None => Arc::new(NullTier::new()),
            },
        };

        let memory = if self.config.memory_tier_enabled {
            Some(MemoryTier::with_max_ttl(
                self.config.memory_tier_max_entries,
                self.config.memory_tier_max_ttl,
            ))
        } else {
            None
        };

        let engine = CacheEngine::from_parts(EngineParts {
            key_strategy: self
                .key_strategy
                .unwrap_or_else(|| Arc::new(TieredKeyGenerator::default())),
            memory,
            persistent: persistent.clone(),
            codec,
            security: security_layer,
            default_ttl: self.config.default_ttl,
            operation_ttls: self.config.operation_ttls.clone(),
            compression_threshold: self.config.compression_threshold_bytes,
            max_entry_size: self.config.max_entry_size_bytes,
            fail_on_backend_unavailable: self.config.fail_on_backend_unavailable,
        });

        for (kind, handler) in self.callbacks {
            engine.register_callback(kind, handler);
        }

        if self.config.fail_on_backend_unavailable && !engine.ping_backend().await {
            return Err(Error::Backend(crate::error::BackendError::unavailable(
                format!("backend {} did not answer ping", persistent.name()),
            )));
        }

        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_ttls_rejected() {
        let config = CacheConfig::new().with_default_ttl(Duration::ZERO);
        assert!(config.validate().is_err());
        let config = CacheConfig::new().with_operation_ttl("summarize", Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_capacity_memory_tier_rejected() {
        let config = CacheConfig::new().with_memory_tier(true, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn production_requires_backend_url() {
        let mut config = CacheConfig::testing();
        config.deployment_context = DeploymentContext::Production;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn production_preset_without_key_fails_closed() {
        let config = CacheConfig::production("rediss://cache.internal:6380");
        let err = CacheEngineBuilder::new(config).build().await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[tokio::test]
    async fn testing_preset_builds_memory_only_engine() {
        let engine = CacheEngineBuilder::new(CacheConfig::testing())
            .build()
            .await
            .unwrap();
        let key = engine
            .generate_key("op", "content", &BTreeMap::new())
            .unwrap();
        engine.set(&key, &"value".to_string(), None).await.unwrap();
        let got: Option<String> = engine.get(&key).await.unwrap();
        assert_eq!(got.as_deref(), Some("value"));
    }

    #[tokio::test]
    async fn invalid_compression_level_fails_at_build() {
        let config = CacheConfig::testing().with_compression(1024, 42);
        let err = CacheEngineBuilder::new(config).build().await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
