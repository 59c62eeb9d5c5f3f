//! Connection lifecycle: startup probe, mode selection, health, shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{info, warn};

use scanvault_core::{Error, HealthReport, Result, StoreMode};

use crate::config::StoreConfig;
use crate::pool::{create_pool_with_config, log_pool_metrics};

/// Owns the pool when one could be established.
///
/// The mode is decided exactly once, in [`ConnectionManager::initialize`],
/// and never changes for the life of the process.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    pool: Option<PgPool>,
    schema: String,
    waiting: Arc<AtomicUsize>,
    startup_error: Option<String>,
}

impl ConnectionManager {
    /// Probe the backend and pick the execution mode.
    ///
    /// Never fails: a missing URL or any connection error selects emulated
    /// mode and is reported at WARN.
    pub async fn initialize(config: &StoreConfig) -> Self {
        let start = Instant::now();
        let schema = config.schema.clone();
        let waiting = Arc::new(AtomicUsize::new(0));

        let Some(url) = config.database_url.as_deref() else {
            warn!(
                subsystem = "database",
                component = "connection",
                store_mode = "emulated",
                "DATABASE_URL not set, running with the in-memory store"
            );
            return Self {
                pool: None,
                schema,
                waiting,
                startup_error: Some("no database URL configured".to_string()),
            };
        };

        let attempt = match config.validate() {
            Ok(()) => create_pool_with_config(url, &config.pool).await,
            Err(e) => Err(e),
        };

        match attempt {
            Ok(pool) => {
                info!(
                    subsystem = "database",
                    component = "connection",
                    store_mode = "live",
                    schema = %schema,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Connected to PostgreSQL"
                );
                Self {
                    pool: Some(pool),
                    schema,
                    waiting,
                    startup_error: None,
                }
            }
            Err(e) => {
                warn!(
                    subsystem = "database",
                    component = "connection",
                    store_mode = "emulated",
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Database unreachable, falling back to the in-memory store"
                );
                Self {
                    pool: None,
                    schema,
                    waiting,
                    startup_error: Some(e.to_string()),
                }
            }
        }
    }

    /// Wrap an existing pool; the manager is live.
    pub fn from_pool(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool: Some(pool),
            schema: schema.into(),
            waiting: Arc::new(AtomicUsize::new(0)),
            startup_error: None,
        }
    }

    /// A manager without a pool, for services built over a provided store.
    pub fn detached(schema: impl Into<String>) -> Self {
        Self {
            pool: None,
            schema: schema.into(),
            waiting: Arc::new(AtomicUsize::new(0)),
            startup_error: Some("store provided directly, no pool".to_string()),
        }
    }

    /// Give up on the backend after startup: close the pool and record why.
    ///
    /// Used when a live store cannot be built over an established pool.
    pub async fn fall_back(self, reason: &Error) -> Self {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
        warn!(
            subsystem = "database",
            component = "connection",
            store_mode = "emulated",
            error = %reason,
            "Live store unavailable, falling back to the in-memory store"
        );
        Self {
            pool: None,
            schema: self.schema,
            waiting: self.waiting,
            startup_error: Some(reason.to_string()),
        }
    }

    pub fn is_live(&self) -> bool {
        self.pool.is_some()
    }

    pub fn mode(&self) -> StoreMode {
        if self.is_live() {
            StoreMode::Live
        } else {
            StoreMode::Emulated
        }
    }

    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Counter shared with the live store for waiting acquisitions.
    pub fn waiting(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.waiting)
    }

    /// Why the backend was not used, when emulated.
    pub fn startup_error(&self) -> Option<&str> {
        self.startup_error.as_deref()
    }

    /// Probe the backend.
    ///
    /// Emulated mode and failed probes both report `connected: false` with
    /// the error; nothing is thrown.
    pub async fn health(&self) -> HealthReport {
        let Some(pool) = &self.pool else {
            return HealthReport::disconnected(
                self.startup_error
                    .clone()
                    .unwrap_or_else(|| "running in emulated mode".to_string()),
            );
        };

        match probe_server(pool).await {
            Ok((server_time, version)) => {
                let waiting = self.waiting.load(Ordering::Relaxed);
                log_pool_metrics(pool, waiting);
                HealthReport {
                    connected: true,
                    total_connections: Some(pool.size()),
                    idle_connections: Some(pool.num_idle() as u32),
                    waiting_count: Some(waiting),
                    server_time: Some(server_time),
                    version: Some(version),
                    error: None,
                }
            }
            Err(e) => {
                warn!(
                    subsystem = "database",
                    component = "connection",
                    op = "health",
                    error = %e,
                    "Health probe failed"
                );
                HealthReport::disconnected(e.to_string())
            }
        }
    }

    /// Drain and close the pool. Idempotent; a no-op when emulated.
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            if !pool.is_closed() {
                pool.close().await;
                info!(
                    subsystem = "database",
                    component = "connection",
                    op = "shutdown",
                    "Connection pool closed"
                );
            }
        }
    }
}

async fn probe_server(pool: &PgPool) -> Result<(DateTime<Utc>, String)> {
    let row = sqlx::query("SELECT now() AS server_time, version() AS version")
        .fetch_one(pool)
        .await
        .map_err(|e| Error::Connectivity(e.to_string()))?;
    let server_time: DateTime<Utc> = row.try_get("server_time")?;
    let version: String = row.try_get("version")?;
    Ok((server_time, version))
}
