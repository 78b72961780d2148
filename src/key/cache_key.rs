use serde::{Deserialize, Serialize};

/// A generated cache key.
///
/// Carries the full key string plus the logical operation name it was
/// derived from, so the engine can resolve operation-specific TTLs without
/// re-parsing the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    full: String,
    operation: String,
}

impl CacheKey {
    pub(crate) fn new(full: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            full: full.into(),
            operation: operation.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// Logical operation this key was generated for (e.g. "summarize").
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.full
    }
}
