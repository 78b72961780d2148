//! Cache key generation.
//!
//! Maps `(operation, content, options)` to a stable cache key string. Keys
//! are deterministic (no randomness, no time dependency) and size-tiered:
//! short content is embedded inline for debuggability, longer content is
//! replaced by a SHA-256 digest so raw payload text never leaks into the
//! keyspace of the persistent tier.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheKey`] | Generated key plus the logical operation it belongs to |
//! | [`KeyStrategy`] | Trait seam for pluggable key generation policies |
//! | [`TieredKeyGenerator`] | Size-tiered inline/hashed/streaming-hashed strategy |
//!
//! ## Key Layout
//!
//! ```text
//! ai_cache:<operation>:<tier segment>:o<options digest>
//!
//! tier segment, by content length:
//!   < small threshold     txt-<sanitized>-<hash8>
//!   < large threshold     sha256-<hash>-len<n>
//!   >= large threshold    xlarge-<hash>
//! ```
//!
//! Option maps are canonicalized through a `BTreeMap` before hashing, so
//! insertion order never changes the key.

mod cache_key;
mod generator;

pub use cache_key::CacheKey;
pub use generator::{KeyStrategy, TieredKeyGenerator};

pub(crate) use generator::KEY_PREFIX;
