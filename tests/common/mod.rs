//! Shared test double for the persistent tier.

// Compiled into each integration-test binary; not every binary uses
// every helper.
#![allow(dead_code)]

use ai_cache_rust::error::BackendError;
use ai_cache_rust::tiers::PersistentTier;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Install a fmt subscriber honoring `RUST_LOG`; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory `PersistentTier` with failure injection and call counting.
/// TTLs are recorded but not enforced; expiry behavior is the memory
/// tier's job in these tests.
#[derive(Default)]
pub struct MockTier {
    store: Mutex<HashMap<String, Vec<u8>>>,
    failing: AtomicBool,
    pub get_calls: AtomicUsize,
    pub set_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub pattern_calls: AtomicUsize,
}

impl MockTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn gets(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.lock().unwrap().contains_key(key)
    }

    pub fn stored_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.store.lock().unwrap().get(key).cloned()
    }

    pub fn seed(&self, key: &str, value: Vec<u8>) {
        self.store.lock().unwrap().insert(key.to_string(), value);
    }

    fn check_available(&self) -> Result<(), BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(BackendError::unavailable("injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PersistentTier for MockTier {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.store.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8], _ttl: Duration) -> Result<(), BackendError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.store
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.store.lock().unwrap().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        self.check_available()?;
        Ok(self.store.lock().unwrap().contains_key(key))
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, BackendError> {
        self.pattern_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let prefix = pattern.trim_end_matches('*');
        let mut store = self.store.lock().unwrap();
        let matching: Vec<String> = store
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &matching {
            store.remove(key);
        }
        Ok(matching.len() as u64)
    }

    async fn ping(&self) -> bool {
        !self.failing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
