//! Cache event observers.
//!
//! A closed, typed event enum instead of stringly-typed event names: each
//! [`CacheEvent`] variant carries exactly the payload its observers need.
//! Handlers are registered per event kind and invoked in registration
//! order; a panicking handler is isolated and logged, never aborting the
//! cache operation that fired it. Handlers run inline on the calling task
//! and are expected to be cheap (counters, log lines); long-running
//! observers should hand the event off to their own channel.

use crate::key::CacheKey;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// Typed cache event with per-kind payloads.
///
/// `value` is the serialized payload as stored in the memory tier (before
/// compression and encryption).
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Hit { key: CacheKey, value: Arc<Vec<u8>> },
    Miss { key: CacheKey },
    Set { key: CacheKey, value: Arc<Vec<u8>> },
    Delete { key: CacheKey },
    Error { key: CacheKey, detail: String },
}

impl CacheEvent {
    pub fn kind(&self) -> CacheEventKind {
        match self {
            CacheEvent::Hit { .. } => CacheEventKind::Hit,
            CacheEvent::Miss { .. } => CacheEventKind::Miss,
            CacheEvent::Set { .. } => CacheEventKind::Set,
            CacheEvent::Delete { .. } => CacheEventKind::Delete,
            CacheEvent::Error { .. } => CacheEventKind::Error,
        }
    }

    pub fn key(&self) -> &CacheKey {
        match self {
            CacheEvent::Hit { key, .. }
            | CacheEvent::Miss { key }
            | CacheEvent::Set { key, .. }
            | CacheEvent::Delete { key }
            | CacheEvent::Error { key, .. } => key,
        }
    }
}

/// Event kind used for handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEventKind {
    Hit,
    Miss,
    Set,
    Delete,
    Error,
}

impl CacheEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheEventKind::Hit => "hit",
            CacheEventKind::Miss => "miss",
            CacheEventKind::Set => "set",
            CacheEventKind::Delete => "delete",
            CacheEventKind::Error => "error",
        }
    }
}

/// Shared handler type.
pub type CacheCallback = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Registry dispatching events to observers.
#[derive(Default)]
pub struct CallbackHub {
    handlers: RwLock<HashMap<CacheEventKind, Vec<CacheCallback>>>,
}

impl CallbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind. Multiple handlers per kind
    /// are invoked in registration order.
    pub fn register(&self, kind: CacheEventKind, handler: CacheCallback) {
        self.handlers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .entry(kind)
            .or_default()
            .push(handler);
    }

    pub fn handler_count(&self, kind: CacheEventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Dispatch an event. Handler panics are contained per handler;
    /// remaining handlers still run.
    pub fn emit(&self, event: &CacheEvent) {
        let handlers = self.handlers.read().unwrap_or_else(|p| p.into_inner());
        let Some(list) = handlers.get(&event.kind()) else {
            return;
        };
        for handler in list {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::warn!(
                    event = event.kind().as_str(),
                    key = %event.key(),
                    "cache event handler panicked; continuing"
                );
            }
        }
    }
}
