//! Live PostgreSQL behaviour. Requires a database at `DATABASE_URL`
//! (or the default test URL); run with `cargo test -- --ignored`.

use serde_json::json;

use scanvault_db::test_fixtures::TestDatabase;
use scanvault_db::{Error, Predicate, Record, StoreMode};

/// Picks up `DATABASE_URL` from a local `.env` before connecting.
async fn test_database() -> TestDatabase {
    dotenvy::dotenv().ok();
    TestDatabase::new().await
}

fn record(value: serde_json::Value) -> Record {
    Record::from_json(value).unwrap()
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_live_insert_select_update_delete() {
    dotenvy::dotenv().ok();
    let test_db = TestDatabase::migrated().await;
    let service = &test_db.service;
    assert_eq!(service.mode(), StoreMode::Live);

    let (user, project) = test_db.seed_project("dev@example.com", "auth-service").await;
    let user_id = user.id().cloned().unwrap();
    assert!(project.get_text("created_at").is_some());
    assert!(!project.contains("search_vector"));

    let updated = service
        .store()
        .update(
            "projects",
            record(json!({"description": "token issuing", "language": "rust"})),
            &Predicate::raw(
                "id = $1 AND name = $2",
                vec![project.id().cloned().unwrap(), json!("auth-service")],
            ),
        )
        .await
        .unwrap()
        .expect("project updated");
    assert_eq!(updated.get("language"), Some(&json!("rust")));

    service
        .store()
        .delete("users", Some(&Predicate::eq("id", user_id)))
        .await
        .unwrap();
    let remaining = service.store().select("projects", None, None, None).await.unwrap();
    assert!(remaining.is_empty());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_live_insert_then_select_by_id_returns_same_record() {
    dotenvy::dotenv().ok();
    let test_db = TestDatabase::migrated().await;
    let store = test_db.service.store();

    let inserted = store
        .insert(
            "users",
            record(json!({"email": "roundtrip@example.com", "display_name": "Round Trip"})),
        )
        .await
        .unwrap();
    let id = inserted.id().cloned().expect("generated id");

    let selected = store
        .select(
            "users",
            Some(&Predicate::raw("id = $1", vec![id])),
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0], inserted);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_live_status_does_not_create_ledger() {
    let test_db = test_database().await;

    let status = test_db.service.migration_runner().status().await.unwrap();
    assert_eq!(status.applied, 0);
    assert_eq!(status.pending, status.total);

    let rows = test_db
        .service
        .store()
        .query(
            "SELECT to_regclass('schema_migrations') IS NOT NULL AS present",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(rows[0].get("present"), Some(&json!(false)));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_live_migrations_idempotent_and_health() {
    let test_db = test_database().await;
    let runner = test_db.service.migration_runner();

    assert!(!runner.run().await.unwrap().is_empty());
    assert!(runner.run().await.unwrap().is_empty());

    let report = test_db.service.health().await;
    assert!(report.connected);
    assert!(report.version.is_some());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_live_transaction_rolls_back_on_error() {
    let test_db = test_database().await;
    test_db.service.migration_runner().run().await.unwrap();

    let result: scanvault_db::Result<()> = test_db
        .service
        .transactions()
        .run(|tx| {
            Box::pin(async move {
                sqlx::query("INSERT INTO users (email) VALUES ($1)")
                    .bind("rollback@example.com")
                    .execute(&mut **tx)
                    .await?;
                Err(Error::InvalidInput("abort".to_string()))
            })
        })
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    let users = test_db
        .service
        .store()
        .select("users", None, None, None)
        .await
        .unwrap();
    assert!(users.is_empty());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_live_cache_expiry() {
    let test_db = test_database().await;
    test_db.service.migration_runner().run().await.unwrap();
    let cache = test_db.service.cache();
    assert!(cache.is_persistent());

    cache
        .set("k", &json!({"n": 1}), Some(std::time::Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(cache.get("k").await.unwrap(), Some(json!({"n": 1})));
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    assert_eq!(cache.get("k").await.unwrap(), None);

    test_db.cleanup().await;
}
