//! Backend-agnostic data model shared by the storage and search crates.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// =============================================================================
// RECORDS
// =============================================================================

/// A single row: column name → JSON value, in insertion order.
///
/// Every stored record carries an `id` and `created_at`; mutable tables also
/// carry `updated_at`. Timestamps are RFC 3339 strings in both execution modes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a record from a JSON object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::InvalidInput(format!(
                "record must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Column value as text, if present and not null.
    pub fn get_text(&self, column: &str) -> Option<String> {
        self.0.get(column).and_then(value_as_text)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(column.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    /// Most recent timestamp of the record: `updated_at`, else `created_at`.
    pub fn recency(&self) -> Option<DateTime<Utc>> {
        self.get("updated_at")
            .and_then(parse_timestamp)
            .or_else(|| self.get("created_at").and_then(parse_timestamp))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Copy every column of `other` into this record, replacing existing values.
    pub fn merge(&mut self, other: &Record) {
        for (column, value) in other.iter() {
            self.0.insert(column.clone(), value.clone());
        }
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Text form of a scalar value; `None` for null.
///
/// Numbers and strings with the same text compare equal under this
/// projection, which is how ids are matched across representations.
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Parse an RFC 3339 timestamp value.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Current time as stored in records.
pub fn timestamp_now() -> Value {
    Value::String(Utc::now().to_rfc3339())
}

// =============================================================================
// EXECUTION MODE
// =============================================================================

/// Which backend a store executes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// Pooled, network-attached PostgreSQL.
    Live,
    /// In-process fallback store.
    Emulated,
}

impl StoreMode {
    pub fn is_live(self) -> bool {
        matches!(self, StoreMode::Live)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StoreMode::Live => "live",
            StoreMode::Emulated => "emulated",
        }
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a health probe.
///
/// Connected probes carry pool statistics; disconnected probes carry only
/// the error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_connections: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_connections: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn disconnected(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            total_connections: None,
            idle_connections: None,
            waiting_count: None,
            server_time: None,
            version: None,
            error: Some(error.into()),
        }
    }
}

// =============================================================================
// MIGRATIONS
// =============================================================================

/// A row of the migration ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationEntry {
    pub id: String,
    pub description: String,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Lifecycle of a single migration.
///
/// `Pending → Applying → Applied`, or `Applying → Failed` which aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Pending,
    Applying,
    Applied,
    Failed,
}

/// Status of one migration in the static list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationInfo {
    pub id: String,
    pub description: String,
    pub state: MigrationState,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Read-only summary of the migration ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub total: usize,
    pub applied: usize,
    pub pending: usize,
    pub migrations: Vec<MigrationInfo>,
}

// =============================================================================
// CACHE
// =============================================================================

/// A cached value with optional expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Serialized JSON.
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// An entry whose expiry is at or before `now` is treated as absent.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }
}

// =============================================================================
// SEARCH
// =============================================================================

/// Searchable record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Project,
    Scan,
    File,
    Conflict,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Project,
        EntityType::Scan,
        EntityType::File,
        EntityType::Conflict,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Project => "project",
            EntityType::Scan => "scan",
            EntityType::File => "file",
            EntityType::Conflict => "conflict",
        }
    }

    /// Backing table name.
    pub fn table(self) -> &'static str {
        match self {
            EntityType::Project => "projects",
            EntityType::Scan => "scans",
            EntityType::File => "files",
            EntityType::Conflict => "conflicts",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    /// Accepts both the singular entity name and the table name.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" | "projects" => Ok(EntityType::Project),
            "scan" | "scans" => Ok(EntityType::Scan),
            "file" | "files" => Ok(EntityType::File),
            "conflict" | "conflicts" => Ok(EntityType::Conflict),
            other => Err(Error::InvalidInput(format!("unknown entity type: {}", other))),
        }
    }
}

/// How a search result matched the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    ExactName,
    ExactPath,
    ExactDescription,
    Semantic,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::ExactName => "exact_name",
            MatchType::ExactPath => "exact_path",
            MatchType::ExactDescription => "exact_description",
            MatchType::Semantic => "semantic",
        }
    }
}

impl FromStr for MatchType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact_name" => Ok(MatchType::ExactName),
            "exact_path" => Ok(MatchType::ExactPath),
            "exact_description" => Ok(MatchType::ExactDescription),
            "semantic" => Ok(MatchType::Semantic),
            other => Err(Error::InvalidInput(format!("unknown match type: {}", other))),
        }
    }
}

/// A ranked search hit. Produced per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub title: String,
    pub description: String,
    pub metadata: Value,
    /// Relevance in `[0, ∞)`; higher is more relevant.
    pub rank: f32,
    pub match_type: MatchType,
    /// Recency used to break rank ties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Sort results by rank descending, then recency descending.
///
/// The sort is stable, so fully tied results keep their input order.
pub fn sort_by_relevance(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.rank
            .partial_cmp(&a.rank)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
}

/// Union of all entity searches plus the same results grouped by entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalSearchResponse {
    pub results: Vec<SearchResult>,
    pub grouped: BTreeMap<EntityType, Vec<SearchResult>>,
}

impl GlobalSearchResponse {
    /// Build the response; `grouped` is a pure reshape of `results`.
    pub fn from_results(results: Vec<SearchResult>) -> Self {
        let mut grouped: BTreeMap<EntityType, Vec<SearchResult>> = BTreeMap::new();
        for result in &results {
            grouped
                .entry(result.entity_type)
                .or_default()
                .push(result.clone());
        }
        Self { results, grouped }
    }
}
