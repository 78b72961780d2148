//! Cache engine.
//!
//! [`CacheEngine`] orchestrates the two storage tiers and owns the policy
//! the tiers stay agnostic of: TTL resolution, the compression threshold,
//! at-rest encryption, write-through, promotion, and graceful degradation
//! when the persistent tier is unreachable.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheEngine`] | get/set/delete/clear orchestration across tiers |
//! | [`CacheStats`] | Hit/miss counters, memory usage, backend connectivity |
//!
//! Engines are built through
//! [`CacheEngineBuilder`](crate::config::CacheEngineBuilder) and passed by
//! handle to consumers; there is no ambient global instance. Call
//! [`CacheEngine::close`] at shutdown to release the backend connection.

mod core;
mod envelope;

pub use core::{CacheEngine, CacheStats};

pub(crate) use core::EngineParts;
