//! Core traits for scanvault abstractions.
//!
//! The storage interface is a single trait with two implementations, a
//! live PostgreSQL adapter and an in-memory adapter, selected once when the
//! service is constructed.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::{Record, StoreMode};
use crate::query::{OrderBy, Predicate};

/// Query and mutation interface with identical signatures in both modes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Which backend this store executes against.
    fn mode(&self) -> StoreMode;

    /// Run a row-returning statement.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>>;

    /// Run a statement that returns no rows (DDL, bulk maintenance).
    /// Returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Insert a record and return it with generated columns filled in.
    async fn insert(&self, table: &str, data: Record) -> Result<Record>;

    /// Update matching records with `data`; returns the first updated record.
    async fn update(&self, table: &str, data: Record, predicate: &Predicate)
        -> Result<Option<Record>>;

    /// Select records, optionally filtered, ordered and limited.
    async fn select(
        &self,
        table: &str,
        predicate: Option<&Predicate>,
        order_by: Option<&OrderBy>,
        limit: Option<i64>,
    ) -> Result<Vec<Record>>;

    /// Delete matching records and return them.
    async fn delete(&self, table: &str, predicate: Option<&Predicate>) -> Result<Vec<Record>>;
}
