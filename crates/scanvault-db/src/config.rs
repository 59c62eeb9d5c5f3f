//! Store configuration.
//!
//! ## Environment
//!
//! - `DATABASE_URL`: PostgreSQL URL. When unset the store runs emulated.
//! - `DATABASE_SCHEMA`: schema for every statement (default: `public`)
//! - `DB_MAX_CONNECTIONS` (default: 10)
//! - `DB_MIN_CONNECTIONS` (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS` (default: 2)
//! - `DB_IDLE_TIMEOUT_SECS` (default: 600)

use std::time::Duration;

use scanvault_core::defaults::DATABASE_SCHEMA;
use scanvault_core::{Error, Result};

use crate::identifiers::validate_schema_name;
use crate::pool::PoolConfig;

/// Connection settings for the data service.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Backend URL; `None` selects emulated mode without a connection attempt.
    pub database_url: Option<String>,
    /// Active schema, set as `search_path` on every acquired connection.
    pub schema: String,
    pub pool: PoolConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            schema: DATABASE_SCHEMA.to_string(),
            pool: PoolConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Configuration targeting the given URL with default pool settings.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: Some(database_url.into()),
            ..Self::default()
        }
    }

    /// Configuration that never attempts a connection.
    pub fn emulated() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let schema = lookup("DATABASE_SCHEMA").unwrap_or_else(|| DATABASE_SCHEMA.to_string());

        let mut pool = PoolConfig::default();
        if let Some(n) = parse_var::<u32>(&lookup, "DB_MAX_CONNECTIONS")? {
            pool = pool.max_connections(n);
        }
        if let Some(n) = parse_var::<u32>(&lookup, "DB_MIN_CONNECTIONS")? {
            pool = pool.min_connections(n);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "DB_CONNECT_TIMEOUT_SECS")? {
            pool = pool.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "DB_IDLE_TIMEOUT_SECS")? {
            pool = pool.idle_timeout(Duration::from_secs(secs));
        }

        let config = Self {
            database_url,
            schema,
            pool,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_schema_name(&self.schema)?;
        self.pool.validate()
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", key, raw))),
    }
}
