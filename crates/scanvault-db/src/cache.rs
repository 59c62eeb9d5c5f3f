//! Key/value cache with optional expiry.
//!
//! Backed by the `cache_entries` table in live mode and by process memory
//! otherwise. Expiry is lazy: an entry whose `expires_at` has passed is
//! treated as absent and removed by the reader; [`CacheStore::sweep_expired`]
//! clears the rest in bulk.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use scanvault_core::{CacheEntry, Error, RecordStore, Result};

const GET_SQL: &str = "SELECT cache_value, \
     (expires_at IS NOT NULL AND expires_at <= now()) AS expired \
     FROM cache_entries WHERE cache_key = $1";

const UPSERT_SQL: &str = "INSERT INTO cache_entries (cache_key, cache_value, expires_at, created_at) \
     VALUES ($1, $2, CASE WHEN $3::float8 IS NULL THEN NULL \
     ELSE now() + make_interval(secs => $3::float8) END, now()) \
     ON CONFLICT (cache_key) DO UPDATE SET \
     cache_value = EXCLUDED.cache_value, \
     expires_at = EXCLUDED.expires_at, \
     created_at = now()";

const DELETE_SQL: &str = "DELETE FROM cache_entries WHERE cache_key = $1";

// A concurrent set may have refreshed the key since it was read as expired.
const DELETE_EXPIRED_SQL: &str = "DELETE FROM cache_entries \
     WHERE cache_key = $1 AND expires_at IS NOT NULL AND expires_at <= now()";

const SWEEP_SQL: &str =
    "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= now()";

enum Backend {
    Memory(RwLock<HashMap<String, CacheEntry>>),
    Database(Arc<dyn RecordStore>),
}

/// Cache handle; clones share the same entries.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Backend>,
}

impl CacheStore {
    /// Cache stored in process memory.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Backend::Memory(RwLock::new(HashMap::new()))),
        }
    }

    /// Cache on top of `store`: the `cache_entries` table when the store is
    /// live, process memory when it is emulated.
    pub fn for_store(store: Arc<dyn RecordStore>) -> Self {
        if store.mode().is_live() {
            Self {
                inner: Arc::new(Backend::Database(store)),
            }
        } else {
            Self::in_memory()
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(*self.inner, Backend::Database(_))
    }

    /// Value for `key`, or `None` when absent or expired.
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw = match &*self.inner {
            Backend::Memory(entries) => {
                let mut entries = entries.write().await;
                let now = Utc::now();
                match entries.get(key).map(|entry| entry.is_expired_at(now)) {
                    Some(true) => {
                        entries.remove(key);
                        debug!(subsystem = "cache", op = "get", key, "Cache entry expired");
                        None
                    }
                    Some(false) => entries.get(key).map(|entry| entry.value.clone()),
                    None => None,
                }
            }
            Backend::Database(store) => {
                let rows = store.query(GET_SQL, &[Value::from(key)]).await?;
                match rows.into_iter().next() {
                    None => None,
                    Some(row) if row.get("expired") == Some(&Value::Bool(true)) => {
                        store.execute(DELETE_EXPIRED_SQL, &[Value::from(key)]).await?;
                        debug!(subsystem = "cache", op = "get", key, "Cache entry expired");
                        None
                    }
                    Some(row) => row.get_text("cache_value"),
                }
            }
        };

        match raw {
            Some(text) => {
                debug!(subsystem = "cache", op = "get", key, "Cache HIT");
                Ok(Some(serde_json::from_str(&text)?))
            }
            None => {
                debug!(subsystem = "cache", op = "get", key, "Cache MISS");
                Ok(None)
            }
        }
    }

    /// Typed [`CacheStore::get`].
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace `key`. `ttl` of `None` never expires.
    pub async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        let serialized = serde_json::to_string(value)?;

        match &*self.inner {
            Backend::Memory(entries) => {
                let now = Utc::now();
                let expires_at = match ttl {
                    Some(ttl) => Some(
                        now + chrono::Duration::from_std(ttl).map_err(|e| {
                            Error::InvalidInput(format!("ttl out of range: {}", e))
                        })?,
                    ),
                    None => None,
                };
                entries.write().await.insert(
                    key.to_string(),
                    CacheEntry {
                        key: key.to_string(),
                        value: serialized,
                        expires_at,
                        created_at: now,
                    },
                );
            }
            Backend::Database(store) => {
                let ttl_secs = ttl
                    .map(|ttl| Value::from(ttl.as_secs_f64()))
                    .unwrap_or(Value::Null);
                store
                    .execute(
                        UPSERT_SQL,
                        &[Value::from(key), Value::from(serialized), ttl_secs],
                    )
                    .await?;
            }
        }

        debug!(
            subsystem = "cache",
            op = "set",
            key,
            ttl_secs = ttl.map(|t| t.as_secs()),
            "Cache SET"
        );
        Ok(())
    }

    /// Typed [`CacheStore::set`].
    pub async fn set_as<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, &value, ttl).await
    }

    /// Remove `key`; returns whether an entry existed.
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let removed = match &*self.inner {
            Backend::Memory(entries) => entries.write().await.remove(key).is_some(),
            Backend::Database(store) => store.execute(DELETE_SQL, &[Value::from(key)]).await? > 0,
        };
        debug!(subsystem = "cache", op = "invalidate", key, removed, "Cache INVALIDATE");
        Ok(removed)
    }

    /// Delete every expired entry; returns how many were removed.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let removed = match &*self.inner {
            Backend::Memory(entries) => {
                let now = Utc::now();
                let mut entries = entries.write().await;
                let before = entries.len();
                entries.retain(|_, entry| !entry.is_expired_at(now));
                (before - entries.len()) as u64
            }
            Backend::Database(store) => store.execute(SWEEP_SQL, &[]).await?,
        };

        if removed > 0 {
            info!(
                subsystem = "cache",
                op = "sweep",
                result_count = removed,
                "Expired cache entries removed"
            );
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scanvault_core::{OrderBy, Predicate, Record, StoreMode};
    use serde_json::json;
    use std::sync::Mutex;

    /// Live-mode store that reports every key as expired and records
    /// executed statements.
    #[derive(Default)]
    struct ExpiredRows {
        executed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RecordStore for ExpiredRows {
        fn mode(&self) -> StoreMode {
            StoreMode::Live
        }

        async fn query(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Record>> {
            Ok(vec![Record::new()
                .with("cache_value", "1")
                .with("expired", true)])
        }

        async fn execute(&self, sql: &str, _params: &[Value]) -> Result<u64> {
            self.executed.lock().unwrap().push(sql.to_string());
            Ok(1)
        }

        async fn insert(&self, _table: &str, data: Record) -> Result<Record> {
            Ok(data)
        }

        async fn update(
            &self,
            _table: &str,
            _data: Record,
            _predicate: &Predicate,
        ) -> Result<Option<Record>> {
            Ok(None)
        }

        async fn select(
            &self,
            _table: &str,
            _predicate: Option<&Predicate>,
            _order_by: Option<&OrderBy>,
            _limit: Option<i64>,
        ) -> Result<Vec<Record>> {
            Ok(Vec::new())
        }

        async fn delete(
            &self,
            _table: &str,
            _predicate: Option<&Predicate>,
        ) -> Result<Vec<Record>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_expired_read_only_deletes_still_expired_rows() {
        let store = Arc::new(ExpiredRows::default());
        let cache = CacheStore::for_store(Arc::clone(&store) as Arc<dyn RecordStore>);

        assert_eq!(cache.get("k").await.unwrap(), None);

        let executed = store.executed.lock().unwrap();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].contains("expires_at <= now()"));
    }

    #[tokio::test]
    async fn test_set_get_roundtrip_and_overwrite() {
        let cache = CacheStore::in_memory();
        cache.set("k", &json!({"n": 1}), None).await.unwrap();
        cache.set("k", &json!({"n": 2}), None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!({"n": 2})));
    }

    #[tokio::test]
    async fn test_zero_ttl_is_immediately_absent() {
        let cache = CacheStore::in_memory();
        cache
            .set("gone", &json!(true), Some(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(cache.get("gone").await.unwrap(), None);
        assert!(!cache.invalidate("gone").await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let cache = CacheStore::in_memory();
        cache.set("stale", &json!(1), Some(Duration::ZERO)).await.unwrap();
        cache.set("fresh", &json!(2), Some(Duration::from_secs(3600))).await.unwrap();
        cache.set("forever", &json!(3), None).await.unwrap();

        assert_eq!(cache.sweep_expired().await.unwrap(), 1);
        assert_eq!(cache.get("fresh").await.unwrap(), Some(json!(2)));
        assert_eq!(cache.get("forever").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let cache = CacheStore::in_memory();
        cache
            .set_as("ids", &vec![1_i64, 2, 3], Some(Duration::from_secs(60)))
            .await
            .unwrap();
        let ids: Option<Vec<i64>> = cache.get_as("ids").await.unwrap();
        assert_eq!(ids, Some(vec![1, 2, 3]));
        assert!(!cache.is_persistent());
    }
}
