//! # scanvault-db
//!
//! Data-access layer for scanvault.
//!
//! This crate provides:
//! - Connection pool management and startup mode selection
//! - A live PostgreSQL record store and an in-memory emulated store behind
//!   one [`RecordStore`] interface
//! - Transactions scoped to the configured schema
//! - Ledger-tracked schema migrations
//! - A key/value cache with expiry
//!
//! ## Example
//!
//! ```rust,ignore
//! use scanvault_db::{DataService, Predicate, Record, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> scanvault_db::Result<()> {
//!     let service = DataService::initialize(StoreConfig::from_env()?).await;
//!     service.migration_runner().run().await?;
//!
//!     let project = service
//!         .store()
//!         .insert("projects", Record::new().with("name", "auth-service"))
//!         .await?;
//!     let found = service
//!         .store()
//!         .select("projects", Some(&Predicate::eq("name", "auth-service")), None, None)
//!         .await?;
//!     assert_eq!(found[0].id(), project.id());
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
pub mod cache;
pub mod config;
pub mod connection;
pub mod emulated;
pub mod executor;
pub mod identifiers;
pub mod migrations;
pub mod pool;
pub mod sql;
pub mod transaction;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

use std::sync::Arc;

use tracing::info;

// Re-export core types
pub use scanvault_core::*;

pub use cache::CacheStore;
pub use config::StoreConfig;
pub use connection::ConnectionManager;
pub use emulated::MemoryRecordStore;
pub use executor::PgRecordStore;
pub use identifiers::{quote_ident, validate_identifier, validate_schema_name};
pub use migrations::{builtin_migrations, Migration, MigrationBody, MigrationRunner, SqlMigration};
pub use pool::{create_pool_with_config, log_pool_metrics, PoolConfig};
pub use sql::{shift_placeholders, SqlStatement};
pub use transaction::TransactionCoordinator;

/// The data service: one connection manager, one store, one cache.
///
/// Constructed once at startup with [`DataService::initialize`] and passed by
/// reference; clones share the same pool and state.
#[derive(Clone)]
pub struct DataService {
    connection: ConnectionManager,
    store: Arc<dyn RecordStore>,
    cache: CacheStore,
    transactions: TransactionCoordinator,
}

impl DataService {
    /// Probe the backend and build the matching store.
    ///
    /// Never fails: when the backend is unreachable, or a live store cannot
    /// be built over the pool, the pool is closed and the service runs on an
    /// emulated store seeded with every known table.
    pub async fn initialize(config: StoreConfig) -> Self {
        let connection = ConnectionManager::initialize(&config).await;
        match Self::from_connection(connection.clone()) {
            Ok(service) => service,
            Err(e) => {
                let connection = connection.fall_back(&e).await;
                Self::assemble(
                    connection,
                    Arc::new(MemoryRecordStore::seeded()),
                    TransactionCoordinator::unavailable(),
                )
            }
        }
    }

    /// Build the service over an already-initialized connection manager.
    ///
    /// An emulated manager yields an emulated service. A live manager whose
    /// pool cannot back a store is an error; the caller owns the pool.
    pub fn from_connection(connection: ConnectionManager) -> Result<Self> {
        let (store, transactions): (Arc<dyn RecordStore>, TransactionCoordinator) =
            match connection.pool().cloned() {
                Some(pool) => {
                    let store = PgRecordStore::with_waiting(
                        pool.clone(),
                        connection.schema(),
                        connection.waiting(),
                    )?;
                    let transactions = TransactionCoordinator::new(pool, connection.schema())?;
                    (Arc::new(store), transactions)
                }
                None => (
                    Arc::new(MemoryRecordStore::seeded()),
                    TransactionCoordinator::unavailable(),
                ),
            };
        Ok(Self::assemble(connection, store, transactions))
    }

    fn assemble(
        connection: ConnectionManager,
        store: Arc<dyn RecordStore>,
        transactions: TransactionCoordinator,
    ) -> Self {
        let cache = CacheStore::for_store(Arc::clone(&store));

        info!(
            subsystem = "database",
            component = "service",
            store_mode = %store.mode(),
            schema = connection.schema(),
            "Data service initialized"
        );

        Self {
            connection,
            store,
            cache,
            transactions,
        }
    }

    /// Service over a fresh emulated store, without any connection attempt.
    pub fn emulated() -> Self {
        Self::with_store(Arc::new(MemoryRecordStore::seeded()))
    }

    /// Service over a caller-provided store. Transactions are unavailable.
    pub fn with_store(store: Arc<dyn RecordStore>) -> Self {
        let cache = CacheStore::for_store(Arc::clone(&store));
        Self {
            connection: ConnectionManager::detached(defaults::DATABASE_SCHEMA),
            store,
            cache,
            transactions: TransactionCoordinator::unavailable(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.store.mode().is_live()
    }

    pub fn mode(&self) -> StoreMode {
        self.store.mode()
    }

    pub fn schema(&self) -> &str {
        self.connection.schema()
    }

    /// The query/mutation interface.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Transactions; only usable in live mode.
    pub fn transactions(&self) -> &TransactionCoordinator {
        &self.transactions
    }

    /// Runner for the built-in migrations over this service's store.
    pub fn migration_runner(&self) -> MigrationRunner {
        MigrationRunner::builtin(Arc::clone(&self.store))
    }

    pub async fn health(&self) -> HealthReport {
        self.connection.health().await
    }

    /// Close the pool. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.connection.shutdown().await;
        info!(
            subsystem = "database",
            component = "service",
            op = "shutdown",
            "Data service stopped"
        );
    }
}
