//! Size-tiered key generation.

use super::CacheKey;
use crate::{Error, ErrorContext, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Fixed key prefix; doubles as the namespace for pattern invalidation.
pub(crate) const KEY_PREFIX: &str = "ai_cache";

/// Segment delimiter. Operation names are validated against it.
const DELIMITER: char = ':';

/// Chunk size for streaming hashes of very large content.
const HASH_CHUNK_BYTES: usize = 8192;

/// Strategy seam for key generation.
///
/// The engine is generic over this trait rather than subclassing a cache
/// type per workload: AI-specific behavior (text tiering, operation TTLs)
/// lives in one [`TieredKeyGenerator`] injected at construction.
pub trait KeyStrategy: Send + Sync {
    fn generate(
        &self,
        operation: &str,
        content: &str,
        options: &BTreeMap<String, serde_json::Value>,
    ) -> Result<CacheKey>;
}

/// Key generator with content-size-tiered embedding.
///
/// - Below `small_threshold` bytes the content is embedded inline
///   (sanitized, with a short digest suffix to rule out sanitization
///   collisions) so keys stay human-debuggable.
/// - Between the thresholds the content is replaced by its SHA-256 digest
///   plus an explicit length marker.
/// - At or above `large_threshold` the content is hashed in fixed-size
///   chunks and tagged with a coarse `xlarge` bucket, so huge payloads are
///   never buffered twice.
#[derive(Debug, Clone)]
pub struct TieredKeyGenerator {
    small_threshold: usize,
    large_threshold: usize,
}

impl TieredKeyGenerator {
    pub fn new(small_threshold: usize, large_threshold: usize) -> Result<Self> {
        if small_threshold == 0 || small_threshold >= large_threshold {
            return Err(Error::validation_with_context(
                "key size tiers must satisfy 0 < small < large",
                ErrorContext::new()
                    .with_field_path("key_generator.thresholds")
                    .with_details(format!(
                        "small={}, large={}",
                        small_threshold, large_threshold
                    ))
                    .with_source("key_generator"),
            ));
        }
        Ok(Self {
            small_threshold,
            large_threshold,
        })
    }

    pub fn small_threshold(&self) -> usize {
        self.small_threshold
    }

    pub fn large_threshold(&self) -> usize {
        self.large_threshold
    }

    fn validate_operation(operation: &str) -> Result<()> {
        if operation.is_empty() {
            return Err(Error::validation_with_context(
                "operation name must not be empty",
                ErrorContext::new()
                    .with_field_path("key.operation")
                    .with_source("key_generator"),
            ));
        }
        if !operation
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(Error::validation_with_context(
                "operation name contains disallowed characters",
                ErrorContext::new()
                    .with_field_path("key.operation")
                    .with_details(format!(
                        "allowed: [A-Za-z0-9_.-], delimiter '{}' is reserved",
                        DELIMITER
                    ))
                    .with_source("key_generator"),
            ));
        }
        Ok(())
    }

    /// Canonical, order-independent digest of the option map.
    ///
    /// `BTreeMap` iteration is sorted by key and serde_json emits entries in
    /// iteration order, so two maps with the same contents always hash the
    /// same regardless of how the caller inserted them.
    fn options_digest(options: &BTreeMap<String, serde_json::Value>) -> String {
        let canonical = serde_json::to_string(options).unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        hex_encode(digest.as_slice())[..16].to_string()
    }

    fn inline_segment(content: &str) -> String {
        let sanitized: String = content
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        // Sanitization is lossy; the digest suffix keeps distinct inputs distinct.
        let digest = Sha256::digest(content.as_bytes());
        format!("txt-{}-{}", sanitized, &hex_encode(digest.as_slice())[..8])
    }

    fn hashed_segment(content: &str) -> String {
        let digest = Sha256::digest(content.as_bytes());
        format!(
            "sha256-{}-len{}",
            hex_encode(digest.as_slice()),
            content.len()
        )
    }

    fn streaming_segment(content: &str) -> String {
        let mut hasher = Sha256::new();
        for chunk in content.as_bytes().chunks(HASH_CHUNK_BYTES) {
            hasher.update(chunk);
        }
        format!("xlarge-{}", hex_encode(hasher.finalize().as_slice()))
    }
}

impl Default for TieredKeyGenerator {
    fn default() -> Self {
        // Defaults hold the invariant checked in new().
        Self {
            small_threshold: 512,
            large_threshold: 32_768,
        }
    }
}

impl KeyStrategy for TieredKeyGenerator {
    fn generate(
        &self,
        operation: &str,
        content: &str,
        options: &BTreeMap<String, serde_json::Value>,
    ) -> Result<CacheKey> {
        Self::validate_operation(operation)?;

        let segment = if content.len() < self.small_threshold {
            Self::inline_segment(content)
        } else if content.len() < self.large_threshold {
            Self::hashed_segment(content)
        } else {
            Self::streaming_segment(content)
        };

        let full = format!(
            "{prefix}{d}{op}{d}{segment}{d}o{opts}",
            prefix = KEY_PREFIX,
            d = DELIMITER,
            op = operation,
            segment = segment,
            opts = Self::options_digest(options),
        );
        Ok(CacheKey::new(full, operation))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
