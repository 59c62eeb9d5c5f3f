//! Federated search against the emulated store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use scanvault_db::{
    CacheStore, EntityType, Error, MatchType, MemoryRecordStore, OrderBy, Predicate, Record,
    RecordStore, Result, StoreMode,
};
use scanvault_search::{FederatedSearchEngine, SearchIndexManager};

fn record(value: Value) -> Record {
    Record::from_json(value).unwrap()
}

async fn insert(store: &dyn RecordStore, table: &str, value: Value) -> Record {
    store.insert(table, record(value)).await.unwrap()
}

/// Two users, each with one project, plus files and conflicts under them.
async fn seeded_store() -> Arc<MemoryRecordStore> {
    let store = Arc::new(MemoryRecordStore::seeded());
    insert(&*store, "users", json!({"email": "one@example.com"})).await;
    insert(&*store, "users", json!({"email": "two@example.com"})).await;

    insert(
        &*store,
        "projects",
        json!({"name": "auth-service", "path": "/srv/auth-service", "description": "login and tokens", "user_id": 1}),
    )
    .await;
    insert(
        &*store,
        "projects",
        json!({"name": "billing", "path": "/srv/billing", "description": "invoices", "user_id": 1}),
    )
    .await;
    insert(
        &*store,
        "projects",
        json!({"name": "gateway", "path": "/srv/gateway", "description": "edge proxy with auth checks", "user_id": 2}),
    )
    .await;

    insert(
        &*store,
        "files",
        json!({"name": "session.rs", "path": "src/auth/session.rs", "summary": "session store", "project_id": 1}),
    )
    .await;
    insert(
        &*store,
        "files",
        json!({"name": "invoice.rs", "path": "src/invoice.rs", "summary": "pdf rendering", "project_id": 2}),
    )
    .await;
    insert(
        &*store,
        "conflicts",
        json!({"title": "Duplicate auth middleware", "file_path": "src/middleware.rs", "description": "registered twice", "project_id": 3}),
    )
    .await;
    store
}

/// Fails reads of one table and delegates everything else.
///
/// `remaining_failures` of `None` fails forever; `Some(n)` fails the next
/// `n` reads and then recovers.
struct FailingTable {
    inner: Arc<MemoryRecordStore>,
    table: &'static str,
    remaining_failures: Option<AtomicUsize>,
}

impl FailingTable {
    fn always(inner: Arc<MemoryRecordStore>, table: &'static str) -> Self {
        Self {
            inner,
            table,
            remaining_failures: None,
        }
    }

    fn transient(inner: Arc<MemoryRecordStore>, table: &'static str, failures: usize) -> Self {
        Self {
            inner,
            table,
            remaining_failures: Some(AtomicUsize::new(failures)),
        }
    }

    fn should_fail(&self, table: &str) -> bool {
        if table != self.table {
            return false;
        }
        match &self.remaining_failures {
            None => true,
            Some(remaining) => remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok(),
        }
    }
}

#[async_trait]
impl RecordStore for FailingTable {
    fn mode(&self) -> StoreMode {
        self.inner.mode()
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        self.inner.query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.inner.execute(sql, params).await
    }

    async fn insert(&self, table: &str, data: Record) -> Result<Record> {
        self.inner.insert(table, data).await
    }

    async fn update(
        &self,
        table: &str,
        data: Record,
        predicate: &Predicate,
    ) -> Result<Option<Record>> {
        self.inner.update(table, data, predicate).await
    }

    async fn select(
        &self,
        table: &str,
        predicate: Option<&Predicate>,
        order_by: Option<&OrderBy>,
        limit: Option<i64>,
    ) -> Result<Vec<Record>> {
        if self.should_fail(table) {
            return Err(Error::Query(format!("relation \"{}\" does not exist", table)));
        }
        self.inner.select(table, predicate, order_by, limit).await
    }

    async fn delete(&self, table: &str, predicate: Option<&Predicate>) -> Result<Vec<Record>> {
        self.inner.delete(table, predicate).await
    }
}

#[tokio::test]
async fn test_auth_service_scenario() {
    let store = seeded_store().await;
    let engine = FederatedSearchEngine::new(store);

    let response = engine.global_search("auth", None, None).await.unwrap();

    let project = response
        .results
        .iter()
        .find(|r| r.entity_type == EntityType::Project && r.title == "auth-service")
        .expect("auth-service in results");
    assert_eq!(project.match_type, MatchType::ExactName);
    assert!(project.rank > 0.0);
    assert!(response.results.iter().all(|r| r.title != "billing"));
    assert!(response.results.iter().all(|r| r.title != "invoice.rs"));
}

#[tokio::test]
async fn test_global_results_are_ordered_and_grouped() {
    let store = seeded_store().await;
    let engine = FederatedSearchEngine::new(store);

    let response = engine.global_search("auth", None, None).await.unwrap();
    assert!(response.results.len() >= 3);

    for pair in response.results.windows(2) {
        assert!(pair[0].rank >= pair[1].rank);
    }

    let regrouped: usize = response.grouped.values().map(Vec::len).sum();
    assert_eq!(regrouped, response.results.len());
    for (entity, group) in &response.grouped {
        let expected: Vec<&str> = response
            .results
            .iter()
            .filter(|r| r.entity_type == *entity)
            .map(|r| r.entity_id.as_str())
            .collect();
        let actual: Vec<&str> = group.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(actual, expected);
    }
}

#[tokio::test]
async fn test_global_limit_truncates_union() {
    let store = seeded_store().await;
    let engine = FederatedSearchEngine::new(store);

    let response = engine.global_search("auth", None, Some(2)).await.unwrap();
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].title, "auth-service");
}

#[tokio::test]
async fn test_scope_excludes_other_owners() {
    let store = seeded_store().await;
    let engine = FederatedSearchEngine::new(store);

    let response = engine.global_search("auth", Some("1"), None).await.unwrap();

    assert!(response.results.iter().any(|r| r.title == "auth-service"));
    assert!(response.results.iter().any(|r| r.title == "session.rs"));
    // Owned by the second user.
    assert!(response.results.iter().all(|r| r.title != "gateway"));
    assert!(response
        .results
        .iter()
        .all(|r| r.title != "Duplicate auth middleware"));
}

#[tokio::test]
async fn test_failing_entity_is_isolated() {
    let store = seeded_store().await;
    let failing: Arc<dyn RecordStore> = Arc::new(FailingTable::always(store, "files"));
    let engine = FederatedSearchEngine::new(failing);

    match engine
        .search_entity(EntityType::File, "auth", None, None, 0)
        .await
    {
        Err(Error::SearchUnavailable { entity, .. }) => assert_eq!(entity, "file"),
        other => panic!("expected SearchUnavailable, got {:?}", other),
    }

    let response = engine.global_search("auth", None, None).await.unwrap();
    assert!(response.results.iter().any(|r| r.title == "auth-service"));
    assert!(response
        .results
        .iter()
        .all(|r| r.entity_type != EntityType::File));
    assert!(!response.grouped.contains_key(&EntityType::File));
}

#[tokio::test]
async fn test_blank_query_returns_nothing() {
    let store = seeded_store().await;
    let engine = FederatedSearchEngine::new(store);

    let response = engine.global_search("   ", None, None).await.unwrap();
    assert!(response.results.is_empty());
    assert!(response.grouped.is_empty());

    let projects = engine
        .search_entity(EntityType::Project, "", None, None, 0)
        .await
        .unwrap();
    assert!(projects.is_empty());
}

#[tokio::test]
async fn test_equal_rank_prefers_recent() {
    let store = Arc::new(MemoryRecordStore::seeded());
    insert(
        &*store,
        "projects",
        json!({"name": "parser-old", "user_id": 1, "updated_at": "2026-01-01T00:00:00Z"}),
    )
    .await;
    insert(
        &*store,
        "projects",
        json!({"name": "parser-new", "user_id": 1, "updated_at": "2026-06-01T00:00:00Z"}),
    )
    .await;
    let engine = FederatedSearchEngine::new(store);

    let results = engine
        .search_entity(EntityType::Project, "parser", None, None, 0)
        .await
        .unwrap();
    let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["parser-new", "parser-old"]);

    let second_page = engine
        .search_entity(EntityType::Project, "parser", None, Some(1), 1)
        .await
        .unwrap();
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].title, "parser-old");
}

#[tokio::test]
async fn test_global_search_is_memoized() {
    let store = seeded_store().await;
    let engine = FederatedSearchEngine::new(Arc::clone(&store) as Arc<dyn RecordStore>)
        .with_cache(CacheStore::in_memory());

    let first = engine.global_search("billing", None, None).await.unwrap();
    assert_eq!(first.results.len(), 1);

    insert(
        &*store,
        "projects",
        json!({"name": "billing-v2", "user_id": 1}),
    )
    .await;

    let cached = engine.global_search("  Billing ", None, None).await.unwrap();
    assert_eq!(cached, first);

    let fresh = engine.global_search("billing", None, Some(10)).await.unwrap();
    assert_eq!(fresh.results.len(), 2);
}

#[tokio::test]
async fn test_degraded_search_is_not_memoized() {
    let store = seeded_store().await;
    let flaky: Arc<dyn RecordStore> = Arc::new(FailingTable::transient(store, "files", 1));
    let engine = FederatedSearchEngine::new(flaky).with_cache(CacheStore::in_memory());

    let degraded = engine.global_search("auth", None, None).await.unwrap();
    assert!(degraded
        .results
        .iter()
        .all(|r| r.entity_type != EntityType::File));

    let recovered = engine.global_search("auth", None, None).await.unwrap();
    assert!(recovered
        .results
        .iter()
        .any(|r| r.entity_type == EntityType::File && r.title == "session.rs"));
}

#[tokio::test]
async fn test_index_provisioning_is_skipped_when_emulated() {
    let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::seeded());
    let manager = SearchIndexManager::new(store);

    let indexes = manager.create_indexes().await;
    let functions = manager.create_functions().await;

    assert!(indexes.skipped && functions.skipped);
    assert_eq!(indexes.created + functions.created, 0);
}
