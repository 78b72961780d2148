//! # ai-cache-rust
//!
//! Multi-tiered response cache for AI inference workloads: a fast
//! in-process tier backed by a shared persistent tier, with transparent
//! compression, optional at-rest encryption, and graceful degradation when
//! the backend is unreachable.
//!
//! ## Overview
//!
//! Given a request fingerprint, the cache returns a previously computed
//! result if one exists and is still valid, otherwise it signals a miss so
//! the caller can run the expensive inference call and store the result.
//! A backend outage is invisible to callers beyond increased latency and a
//! dropped `stats().backend_connected` flag: reads degrade to misses,
//! writes degrade to memory-only.
//!
//! ## Core Philosophy
//!
//! - **Composition over inheritance**: one [`CacheEngine`] parameterized by
//!   a [`KeyStrategy`]; workload-specific behavior is an injected strategy,
//!   not a subclass
//! - **Explicit construction**: engines are built once from a
//!   [`CacheConfig`] and passed by handle; no process-wide singleton
//! - **Fail closed on data, fail open on availability**: corrupted or
//!   undecryptable payloads are hard misses; an unreachable backend never
//!   raises on the hot path unless explicitly configured to
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_cache_rust::{CacheConfig, CacheEngineBuilder};
//! use std::collections::BTreeMap;
//!
//! #[tokio::main]
//! async fn main() -> ai_cache_rust::Result<()> {
//!     let config = CacheConfig::development()
//!         .with_operation_ttl("summarize", std::time::Duration::from_secs(7200));
//!     let cache = CacheEngineBuilder::new(config).build().await?;
//!
//!     let key = cache.generate_key("summarize", "long document text", &BTreeMap::new())?;
//!     if let Some(cached) = cache.get::<String>(&key).await? {
//!         println!("hit: {cached}");
//!     } else {
//!         let result = "expensive inference result".to_string();
//!         cache.set(&key, &result, None).await?;
//!     }
//!
//!     cache.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`engine`] | Tier orchestration, TTL policy, stats, degradation |
//! | [`key`] | Deterministic, size-tiered cache key generation |
//! | [`tiers`] | Memory tier (LRU + TTL) and persistent tier client |
//! | [`compression`] | Threshold-driven zlib payload compression |
//! | [`security`] | Deployment-context validation and at-rest encryption |
//! | [`callbacks`] | Typed cache events and observer registration |
//! | [`config`] | Typed configuration, presets, and the engine factory |

pub mod callbacks;
pub mod compression;
pub mod config;
pub mod engine;
pub mod key;
pub mod security;
pub mod tiers;

// Re-export main types for convenience
pub use callbacks::{CacheCallback, CacheEvent, CacheEventKind};
pub use config::{CacheConfig, CacheEngineBuilder};
pub use engine::{CacheEngine, CacheStats};
pub use key::{CacheKey, KeyStrategy, TieredKeyGenerator};
pub use security::{DeploymentContext, SecurityConfig};
pub use tiers::{MemoryTier, NullTier, PersistentTier, RedisTier};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{BackendError, Error, ErrorContext};
