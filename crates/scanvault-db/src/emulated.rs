//! In-process record store used when no backend is reachable.
//!
//! Understands exactly one predicate shape: a single equality on one column.
//! An empty condition list matches every row, as it does live. Anything
//! richer is not evaluated. `select` then returns every row, `update`
//! returns `None` and `delete` removes nothing. Raw statements are accepted
//! and ignored.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use scanvault_core::defaults::{CASCADES, KNOWN_TABLES};
use scanvault_core::{
    parse_timestamp, timestamp_now, value_as_text, Error, OrderBy, Predicate, Record,
    RecordStore, Result, SortDirection, StoreMode,
};

use crate::identifiers::validate_identifier;

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Record>>,
    next_ids: HashMap<String, i64>,
}

impl Tables {
    fn rows_mut(&mut self, table: &str) -> &mut Vec<Record> {
        self.rows.entry(table.to_string()).or_default()
    }

    fn allocate_id(&mut self, table: &str) -> i64 {
        let next = self.next_ids.entry(table.to_string()).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    /// Keep the counter ahead of caller-supplied integer ids.
    fn observe_id(&mut self, table: &str, id: &Value) {
        if let Some(n) = id.as_i64() {
            let next = self.next_ids.entry(table.to_string()).or_insert(1);
            if n >= *next {
                *next = n + 1;
            }
        }
    }

    /// Remove rows of `table` matching `column = value`, then cascade to
    /// dependent tables.
    fn remove_cascading(&mut self, table: &str, column: &str, value: &Value) -> Vec<Record> {
        let rows = self.rows_mut(table);
        let (removed, kept): (Vec<Record>, Vec<Record>) = std::mem::take(rows)
            .into_iter()
            .partition(|row| column_matches(row, column, value));
        *rows = kept;

        for parent in &removed {
            let Some(parent_id) = parent.id().cloned() else {
                continue;
            };
            for (parent_table, child_table, fk) in CASCADES {
                if *parent_table == table {
                    let children = self.remove_cascading(child_table, fk, &parent_id);
                    if !children.is_empty() {
                        debug!(
                            subsystem = "database",
                            component = "emulated",
                            op = "cascade",
                            db_table = *child_table,
                            result_count = children.len(),
                            "Cascaded delete"
                        );
                    }
                }
            }
        }
        removed
    }
}

/// In-memory record store with per-table sequential ids.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with the known tables present and empty.
    pub fn seeded() -> Self {
        let mut tables = Tables::default();
        for table in KNOWN_TABLES {
            tables.rows.insert(table.to_string(), Vec::new());
        }
        Self {
            tables: Arc::new(RwLock::new(tables)),
        }
    }

    /// Number of rows currently held in `table`.
    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .rows
            .get(table)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Loose equality: a number and a string with the same text are equal.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => value_as_text(a) == value_as_text(b),
    }
}

fn column_matches(row: &Record, column: &str, value: &Value) -> bool {
    row.get(column)
        .map(|v| loosely_equal(v, value))
        .unwrap_or(false)
}

/// Numbers compare numerically, timestamps chronologically, everything else
/// as text. Nulls and missing values sort last in both directions.
fn compare_values(a: Option<&Value>, b: Option<&Value>, direction: SortDirection) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    let ordering = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(a), Some(b)) => {
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            } else if let (Some(x), Some(y)) = (parse_timestamp(a), parse_timestamp(b)) {
                x.cmp(&y)
            } else {
                value_as_text(a).cmp(&value_as_text(b))
            }
        }
    };
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn log_unsupported(op: &str, table: &str, predicate: &Predicate) {
    debug!(
        subsystem = "database",
        component = "emulated",
        op,
        db_table = table,
        predicate = %predicate,
        "Predicate not evaluated in emulated mode"
    );
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Emulated
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<Vec<Record>> {
        debug!(
            subsystem = "database",
            component = "emulated",
            op = "query",
            query = sql,
            "Raw query ignored in emulated mode"
        );
        Ok(Vec::new())
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<u64> {
        debug!(
            subsystem = "database",
            component = "emulated",
            op = "execute",
            query = sql,
            "Raw statement ignored in emulated mode"
        );
        Ok(0)
    }

    async fn insert(&self, table: &str, mut data: Record) -> Result<Record> {
        validate_identifier("Table", table)?;
        let mut tables = self.tables.write().await;

        match data.id().cloned() {
            Some(id) if !id.is_null() => {
                let exists = tables
                    .rows
                    .get(table)
                    .is_some_and(|rows| rows.iter().any(|row| column_matches(row, "id", &id)));
                if exists {
                    return Err(Error::Query(format!(
                        "duplicate key value violates unique constraint on {}.id",
                        table
                    )));
                }
                tables.observe_id(table, &id);
            }
            _ => {
                let id = tables.allocate_id(table);
                data.insert("id", id);
            }
        }

        let now = timestamp_now();
        if !data.contains("created_at") {
            data.insert("created_at", now.clone());
        }
        if !data.contains("updated_at") {
            data.insert("updated_at", now);
        }

        tables.rows_mut(table).push(data.clone());
        Ok(data)
    }

    async fn update(
        &self,
        table: &str,
        data: Record,
        predicate: &Predicate,
    ) -> Result<Option<Record>> {
        validate_identifier("Table", table)?;
        let id = match predicate.single_equality() {
            Some(("id", id)) => id.clone(),
            _ => {
                log_unsupported("update", table, predicate);
                return Ok(None);
            }
        };

        let mut tables = self.tables.write().await;
        let Some(row) = tables
            .rows_mut(table)
            .iter_mut()
            .find(|row| column_matches(row, "id", &id))
        else {
            return Ok(None);
        };

        row.merge(&data);
        if !data.contains("updated_at") {
            row.insert("updated_at", timestamp_now());
        }
        Ok(Some(row.clone()))
    }

    async fn select(
        &self,
        table: &str,
        predicate: Option<&Predicate>,
        order_by: Option<&OrderBy>,
        limit: Option<i64>,
    ) -> Result<Vec<Record>> {
        validate_identifier("Table", table)?;
        let tables = self.tables.read().await;
        let rows = tables.rows.get(table).map(Vec::as_slice).unwrap_or(&[]);
        let predicate = predicate.filter(|p| !p.matches_all());

        let mut selected: Vec<Record> = match predicate {
            None => rows.to_vec(),
            Some(predicate) => match predicate.single_equality() {
                Some((column, value)) => rows
                    .iter()
                    .filter(|row| column_matches(row, column, value))
                    .cloned()
                    .collect(),
                None => {
                    log_unsupported("select", table, predicate);
                    rows.to_vec()
                }
            },
        };

        if let Some(order) = order_by {
            selected.sort_by(|a, b| {
                compare_values(a.get(&order.column), b.get(&order.column), order.direction)
            });
        }

        if let Some(limit) = limit {
            if limit < 0 {
                return Err(Error::InvalidInput(format!(
                    "limit must not be negative, got {}",
                    limit
                )));
            }
            selected.truncate(limit as usize);
        }

        Ok(selected)
    }

    async fn delete(&self, table: &str, predicate: Option<&Predicate>) -> Result<Vec<Record>> {
        validate_identifier("Table", table)?;
        let mut tables = self.tables.write().await;
        let predicate = predicate.filter(|p| !p.matches_all());

        let removed = match predicate {
            None => {
                let ids: Vec<Value> = tables
                    .rows_mut(table)
                    .iter()
                    .filter_map(|row| row.id().cloned())
                    .collect();
                let mut removed = Vec::with_capacity(ids.len());
                for id in ids {
                    removed.extend(tables.remove_cascading(table, "id", &id));
                }
                // Rows without an id are not reachable by cascade; drop them too.
                removed.append(tables.rows_mut(table));
                removed
            }
            Some(predicate) => match predicate.single_equality() {
                Some((column, value)) => tables.remove_cascading(table, column, value),
                None => {
                    warn!(
                        subsystem = "database",
                        component = "emulated",
                        op = "delete",
                        db_table = table,
                        predicate = %predicate,
                        "Delete predicate not supported in emulated mode, nothing removed"
                    );
                    Vec::new()
                }
            },
        };

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_loose_equality() {
        assert!(loosely_equal(&json!(3), &json!("3")));
        assert!(loosely_equal(&json!("auth"), &json!("auth")));
        assert!(!loosely_equal(&json!(3), &json!(4)));
        assert!(!loosely_equal(&Value::Null, &json!("null")));
    }

    #[test]
    fn test_compare_values_nulls_last() {
        assert_eq!(
            compare_values(Some(&json!(1)), None, SortDirection::Asc),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&json!(1)), Some(&Value::Null), SortDirection::Desc),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&json!(2)), Some(&json!(10)), SortDirection::Asc),
            Ordering::Less
        );
        assert_eq!(
            compare_values(
                Some(&json!("2026-01-02T00:00:00Z")),
                Some(&json!("2026-01-01T00:00:00+05:00")),
                SortDirection::Desc
            ),
            Ordering::Less
        );
    }

    #[tokio::test]
    async fn test_caller_supplied_id_advances_counter() {
        let store = MemoryRecordStore::seeded();
        store
            .insert("users", Record::new().with("id", 10).with("email", "a@x.io"))
            .await
            .unwrap();
        let next = store
            .insert("users", Record::new().with("email", "b@x.io"))
            .await
            .unwrap();
        assert_eq!(next.id(), Some(&json!(11)));

        let duplicate = store
            .insert("users", Record::new().with("id", 10).with("email", "c@x.io"))
            .await;
        assert!(matches!(duplicate, Err(Error::Query(_))));
    }
}
