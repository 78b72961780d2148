//! Resilience contract: a persistent-tier outage degrades to memory-only
//! operation, surfaces only through the error callback channel, and never
//! raises on the hot path unless `fail_on_backend_unavailable` is set.

mod common;

use ai_cache_rust::{
    CacheConfig, CacheEngineBuilder, CacheEvent, CacheEventKind, Error, SecurityConfig,
};
use common::MockTier;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn outage_never_raises_and_fires_error_callbacks() {
    common::init_tracing();
    let mock = Arc::new(MockTier::new());
    mock.set_failing(true);

    let errors = Arc::new(AtomicUsize::new(0));
    let errors_clone = errors.clone();
    let engine = CacheEngineBuilder::new(CacheConfig::testing())
        .persistent_tier(mock.clone())
        .callback(
            CacheEventKind::Error,
            Arc::new(move |event| {
                assert!(matches!(event, CacheEvent::Error { .. }));
                errors_clone.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .build()
        .await
        .unwrap();

    let key = engine
        .generate_key("summarize", "doc", &BTreeMap::new())
        .unwrap();
    let other = engine
        .generate_key("summarize", "another doc", &BTreeMap::new())
        .unwrap();

    // set degrades to a memory-only write, get on an uncached key degrades
    // to a miss, delete still clears the memory tier.
    engine.set(&key, &"v".to_string(), None).await.unwrap();
    let miss: Option<String> = engine.get(&other).await.unwrap();
    assert!(miss.is_none());
    engine.delete(&key).await.unwrap();

    assert_eq!(errors.load(Ordering::SeqCst), 3);
    assert!(!engine.stats().backend_connected);
    assert_eq!(engine.stats().error_count, 3);
}

#[tokio::test]
async fn memory_tier_still_serves_reads_during_outage() {
    let mock = Arc::new(MockTier::new());
    mock.set_failing(true);
    let engine = CacheEngineBuilder::new(CacheConfig::testing())
        .persistent_tier(mock)
        .build()
        .await
        .unwrap();

    let key = engine
        .generate_key("summarize", "doc", &BTreeMap::new())
        .unwrap();
    engine.set(&key, &"survives".to_string(), None).await.unwrap();
    let got: Option<String> = engine.get(&key).await.unwrap();
    assert_eq!(got.as_deref(), Some("survives"));
}

#[tokio::test]
async fn fail_fast_mode_raises_at_construction() {
    let mock = Arc::new(MockTier::new());
    mock.set_failing(true);
    let config = CacheConfig::testing().with_fail_on_backend_unavailable(true);
    let err = CacheEngineBuilder::new(config)
        .persistent_tier(mock)
        .build()
        .await
        .unwrap_err();
    assert!(err.is_backend_unavailable());
}

#[tokio::test]
async fn fail_fast_mode_raises_on_later_outage() {
    let mock = Arc::new(MockTier::new());
    let config = CacheConfig::testing().with_fail_on_backend_unavailable(true);
    let engine = CacheEngineBuilder::new(config)
        .persistent_tier(mock.clone())
        .build()
        .await
        .unwrap();

    let key = engine
        .generate_key("summarize", "doc", &BTreeMap::new())
        .unwrap();
    mock.set_failing(true);
    let err = engine.set(&key, &"v".to_string(), None).await.unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
}

#[tokio::test]
async fn backend_recovery_flips_connectivity_back() {
    let mock = Arc::new(MockTier::new());
    mock.set_failing(true);
    let engine = CacheEngineBuilder::new(CacheConfig::testing())
        .persistent_tier(mock.clone())
        .build()
        .await
        .unwrap();

    let key = engine
        .generate_key("summarize", "doc", &BTreeMap::new())
        .unwrap();
    let _: Option<String> = engine.get(&key).await.unwrap();
    assert!(!engine.stats().backend_connected);

    mock.set_failing(false);
    let _: Option<String> = engine.get(&key).await.unwrap();
    assert!(engine.stats().backend_connected);
}

#[tokio::test]
async fn corrupted_stored_bytes_are_a_hard_miss() {
    let mock = Arc::new(MockTier::new());
    let engine = CacheEngineBuilder::new(CacheConfig::testing())
        .persistent_tier(mock.clone())
        .build()
        .await
        .unwrap();

    let key = engine
        .generate_key("summarize", "doc", &BTreeMap::new())
        .unwrap();
    mock.seed(key.as_str(), b"not an envelope".to_vec());

    let errors = Arc::new(AtomicUsize::new(0));
    let errors_clone = errors.clone();
    engine.register_callback(
        CacheEventKind::Error,
        Arc::new(move |_| {
            errors_clone.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let got: Option<String> = engine.get(&key).await.unwrap();
    assert!(got.is_none());
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn wrong_encryption_key_is_a_hard_miss() {
    let mock = Arc::new(MockTier::new());

    let writer = CacheEngineBuilder::new(CacheConfig::testing().with_security(
        SecurityConfig::new()
            .with_encrypt_at_rest(true)
            .with_encryption_key(vec![1u8; 32]),
    ))
    .persistent_tier(mock.clone())
    .build()
    .await
    .unwrap();
    let key = writer
        .generate_key("summarize", "doc", &BTreeMap::new())
        .unwrap();
    writer.set(&key, &"secret".to_string(), None).await.unwrap();

    // Reader without a memory hit (fresh engine) and a rotated key.
    let reader = CacheEngineBuilder::new(CacheConfig::testing().with_security(
        SecurityConfig::new()
            .with_encrypt_at_rest(true)
            .with_encryption_key(vec![2u8; 32]),
    ))
    .persistent_tier(mock)
    .build()
    .await
    .unwrap();
    let got: Option<String> = reader.get(&key).await.unwrap();
    assert!(got.is_none(), "undecryptable data must never be returned");
}

#[tokio::test]
async fn encrypted_data_without_key_is_a_hard_miss() {
    let mock = Arc::new(MockTier::new());
    let writer = CacheEngineBuilder::new(CacheConfig::testing().with_security(
        SecurityConfig::new()
            .with_encrypt_at_rest(true)
            .with_encryption_key(vec![1u8; 32]),
    ))
    .persistent_tier(mock.clone())
    .build()
    .await
    .unwrap();
    let key = writer
        .generate_key("summarize", "doc", &BTreeMap::new())
        .unwrap();
    writer.set(&key, &"secret".to_string(), None).await.unwrap();

    let reader = CacheEngineBuilder::new(CacheConfig::testing())
        .persistent_tier(mock)
        .build()
        .await
        .unwrap();
    let got: Option<String> = reader.get(&key).await.unwrap();
    assert!(got.is_none());
}
