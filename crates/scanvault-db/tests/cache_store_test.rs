//! Cache expiry and upsert behaviour.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use scanvault_db::{CacheStore, DataService, MemoryRecordStore};

#[tokio::test]
async fn test_entry_expires_after_ttl() {
    let cache = CacheStore::in_memory();
    cache
        .set("k", &json!({"n": 1}), Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(cache.get("k").await.unwrap(), Some(json!({"n": 1})));

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(cache.get("k").await.unwrap(), None);
    // The expired read removed the entry.
    assert!(!cache.invalidate("k").await.unwrap());
}

#[tokio::test]
async fn test_upsert_replaces_expiry() {
    let cache = CacheStore::in_memory();
    cache
        .set("k", &json!("short"), Some(Duration::ZERO))
        .await
        .unwrap();
    cache.set("k", &json!("long"), None).await.unwrap();

    assert_eq!(cache.sweep_expired().await.unwrap(), 0);
    assert_eq!(cache.get("k").await.unwrap(), Some(json!("long")));
}

#[tokio::test]
async fn test_invalidate_reports_presence() {
    let cache = CacheStore::in_memory();
    cache.set("k", &json!(1), None).await.unwrap();
    assert!(cache.invalidate("k").await.unwrap());
    assert!(!cache.invalidate("k").await.unwrap());
}

#[tokio::test]
async fn test_emulated_store_uses_memory_cache() {
    let cache = CacheStore::for_store(Arc::new(MemoryRecordStore::seeded()));
    assert!(!cache.is_persistent());

    let service = DataService::emulated();
    assert!(!service.cache().is_persistent());
    service.cache().set("shared", &json!(true), None).await.unwrap();
    let clone = service.clone();
    assert_eq!(clone.cache().get("shared").await.unwrap(), Some(json!(true)));
}
