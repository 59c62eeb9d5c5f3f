//! Versioned schema migrations tracked in the `schema_migrations` ledger.
//!
//! Migrations run in list order. Each one is applied and then recorded; a
//! failure in either step aborts the run and leaves that migration pending,
//! so a body whose ledger row could not be written runs again next time.
//! Bodies must therefore be idempotent (`IF NOT EXISTS`, `CREATE OR REPLACE`).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use scanvault_core::defaults::MIGRATIONS_TABLE;
use scanvault_core::{
    parse_timestamp, Error, MigrationInfo, MigrationState, MigrationStatus, Record, RecordStore,
    Result,
};

/// The work a migration performs.
#[async_trait]
pub trait MigrationBody: Send + Sync {
    async fn apply(&self, store: &dyn RecordStore) -> Result<()>;
}

/// A migration made of SQL statements executed in order.
pub struct SqlMigration(pub &'static [&'static str]);

#[async_trait]
impl MigrationBody for SqlMigration {
    async fn apply(&self, store: &dyn RecordStore) -> Result<()> {
        for statement in self.0 {
            store.execute(statement, &[]).await?;
        }
        Ok(())
    }
}

/// A named, ordered schema change.
pub struct Migration {
    pub id: &'static str,
    pub description: &'static str,
    body: Box<dyn MigrationBody>,
}

impl Migration {
    pub fn new(
        id: &'static str,
        description: &'static str,
        body: impl MigrationBody + 'static,
    ) -> Self {
        Self {
            id,
            description,
            body: Box::new(body),
        }
    }

    pub fn sql(
        id: &'static str,
        description: &'static str,
        statements: &'static [&'static str],
    ) -> Self {
        Self::new(id, description, SqlMigration(statements))
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish()
    }
}

const CREATE_LEDGER: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    id TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const LEDGER_PRESENT: &str =
    "SELECT to_regclass('schema_migrations') IS NOT NULL AS present";

const CORE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        display_name TEXT,
        password_hash TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS sessions (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        token TEXT NOT NULL UNIQUE,
        expires_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS projects (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT REFERENCES users(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        path TEXT,
        description TEXT,
        language TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS scans (
        id BIGSERIAL PRIMARY KEY,
        project_id BIGINT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        summary TEXT,
        file_count INTEGER NOT NULL DEFAULT 0,
        total_complexity DOUBLE PRECISION,
        started_at TIMESTAMPTZ,
        finished_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS files (
        id BIGSERIAL PRIMARY KEY,
        project_id BIGINT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        scan_id BIGINT REFERENCES scans(id) ON DELETE SET NULL,
        name TEXT NOT NULL,
        path TEXT NOT NULL,
        language TEXT,
        summary TEXT,
        complexity DOUBLE PRECISION,
        line_count INTEGER,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS conflicts (
        id BIGSERIAL PRIMARY KEY,
        project_id BIGINT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        file_id BIGINT REFERENCES files(id) ON DELETE CASCADE,
        kind TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT,
        file_path TEXT,
        severity TEXT NOT NULL DEFAULT 'medium',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
];

const CACHE_ENTRIES: &[&str] = &["CREATE TABLE IF NOT EXISTS cache_entries (
        cache_key TEXT PRIMARY KEY,
        cache_value TEXT NOT NULL,
        expires_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"];

// Weights A/B/C map to the title, path and description columns of each entity.
const SEARCH_VECTORS: &[&str] = &[
    "ALTER TABLE projects ADD COLUMN IF NOT EXISTS search_vector tsvector
        GENERATED ALWAYS AS (
            setweight(to_tsvector('simple', coalesce(name, '')), 'A') ||
            setweight(to_tsvector('simple', coalesce(path, '')), 'B') ||
            setweight(to_tsvector('simple', coalesce(description, '')), 'C')
        ) STORED",
    "ALTER TABLE scans ADD COLUMN IF NOT EXISTS search_vector tsvector
        GENERATED ALWAYS AS (
            setweight(to_tsvector('simple', coalesce(name, '')), 'A') ||
            setweight(to_tsvector('simple', coalesce(summary, '')), 'C')
        ) STORED",
    "ALTER TABLE files ADD COLUMN IF NOT EXISTS search_vector tsvector
        GENERATED ALWAYS AS (
            setweight(to_tsvector('simple', coalesce(name, '')), 'A') ||
            setweight(to_tsvector('simple', coalesce(path, '')), 'B') ||
            setweight(to_tsvector('simple', coalesce(summary, '')), 'C')
        ) STORED",
    "ALTER TABLE conflicts ADD COLUMN IF NOT EXISTS search_vector tsvector
        GENERATED ALWAYS AS (
            setweight(to_tsvector('simple', coalesce(title, '')), 'A') ||
            setweight(to_tsvector('simple', coalesce(file_path, '')), 'B') ||
            setweight(to_tsvector('simple', coalesce(description, '')), 'C')
        ) STORED",
];

const FOREIGN_KEY_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_projects_user_id ON projects(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_scans_project_id ON scans(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_files_project_id ON files(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_files_scan_id ON files(scan_id)",
    "CREATE INDEX IF NOT EXISTS idx_conflicts_project_id ON conflicts(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_conflicts_file_id ON conflicts(file_id)",
];

/// Installs `touch_updated_at()` and a BEFORE UPDATE trigger per table.
struct TouchUpdatedAt {
    tables: &'static [&'static str],
}

#[async_trait]
impl MigrationBody for TouchUpdatedAt {
    async fn apply(&self, store: &dyn RecordStore) -> Result<()> {
        store
            .execute(
                "CREATE OR REPLACE FUNCTION touch_updated_at() RETURNS trigger AS $$
                BEGIN
                    NEW.updated_at = now();
                    RETURN NEW;
                END;
                $$ LANGUAGE plpgsql",
                &[],
            )
            .await?;

        for table in self.tables {
            store
                .execute(
                    &format!("DROP TRIGGER IF EXISTS trg_{0}_touch ON {0}", table),
                    &[],
                )
                .await?;
            store
                .execute(
                    &format!(
                        "CREATE TRIGGER trg_{0}_touch BEFORE UPDATE ON {0} \
                         FOR EACH ROW EXECUTE FUNCTION touch_updated_at()",
                        table
                    ),
                    &[],
                )
                .await?;
        }
        Ok(())
    }
}

/// The schema this workspace ships with, in application order.
pub fn builtin_migrations() -> Vec<Migration> {
    vec![
        Migration::sql(
            "001_core_tables",
            "users, sessions, projects, scans, files, conflicts",
            CORE_TABLES,
        ),
        Migration::sql("002_cache_entries", "key/value cache with expiry", CACHE_ENTRIES),
        Migration::sql(
            "003_search_vectors",
            "weighted full-text vectors on searchable tables",
            SEARCH_VECTORS,
        ),
        Migration::sql(
            "004_foreign_key_indexes",
            "indexes backing foreign keys",
            FOREIGN_KEY_INDEXES,
        ),
        Migration::new(
            "005_touch_updated_at",
            "maintain updated_at on every update",
            TouchUpdatedAt {
                tables: &["users", "sessions", "projects", "scans", "files", "conflicts"],
            },
        ),
    ]
}

/// Applies pending migrations and reports ledger status.
pub struct MigrationRunner {
    store: Arc<dyn RecordStore>,
    migrations: Vec<Migration>,
    last_failure: Mutex<Option<String>>,
}

impl MigrationRunner {
    pub fn new(store: Arc<dyn RecordStore>, migrations: Vec<Migration>) -> Self {
        Self {
            store,
            migrations,
            last_failure: Mutex::new(None),
        }
    }

    /// Runner over [`builtin_migrations`].
    pub fn builtin(store: Arc<dyn RecordStore>) -> Self {
        Self::new(store, builtin_migrations())
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    fn check_unique_ids(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for migration in &self.migrations {
            if !seen.insert(migration.id) {
                return Err(Error::Config(format!(
                    "duplicate migration id: {}",
                    migration.id
                )));
            }
        }
        Ok(())
    }

    async fn ensure_ledger(&self) -> Result<()> {
        self.store.execute(CREATE_LEDGER, &[]).await?;
        Ok(())
    }

    /// Whether the ledger table exists, without creating it.
    async fn ledger_present(&self) -> Result<bool> {
        if !self.store.mode().is_live() {
            return Ok(true);
        }
        let rows = self.store.query(LEDGER_PRESENT, &[]).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("present"))
            .and_then(|present| present.as_bool())
            .unwrap_or(false))
    }

    async fn ledger(&self) -> Result<Vec<Record>> {
        self.store.select(MIGRATIONS_TABLE, None, None, None).await
    }

    /// Apply every pending migration in order.
    ///
    /// Returns the ids applied by this call; an up-to-date schema yields an
    /// empty list. The first failure aborts the run with
    /// [`Error::MigrationFailed`].
    pub async fn run(&self) -> Result<Vec<String>> {
        self.check_unique_ids()?;
        self.ensure_ledger().await?;

        let applied_ids: HashSet<String> = self
            .ledger()
            .await?
            .iter()
            .filter_map(|row| row.get_text("id"))
            .collect();

        let mut applied = Vec::new();
        for migration in &self.migrations {
            if applied_ids.contains(migration.id) {
                debug!(
                    subsystem = "database",
                    component = "migrations",
                    migration_id = migration.id,
                    "Migration already applied"
                );
                continue;
            }

            let start = Instant::now();
            info!(
                subsystem = "database",
                component = "migrations",
                op = "apply",
                migration_id = migration.id,
                "Applying migration"
            );

            if let Err(e) = self.apply_one(migration).await {
                error!(
                    subsystem = "database",
                    component = "migrations",
                    op = "apply",
                    migration_id = migration.id,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Migration failed"
                );
                *self.last_failure.lock().await = Some(migration.id.to_string());
                return Err(Error::MigrationFailed {
                    id: migration.id.to_string(),
                    reason: e.to_string(),
                });
            }

            info!(
                subsystem = "database",
                component = "migrations",
                op = "apply",
                migration_id = migration.id,
                duration_ms = start.elapsed().as_millis() as u64,
                "Migration applied"
            );
            applied.push(migration.id.to_string());
        }

        *self.last_failure.lock().await = None;
        Ok(applied)
    }

    async fn apply_one(&self, migration: &Migration) -> Result<()> {
        migration.body.apply(self.store.as_ref()).await?;
        let entry = Record::new()
            .with("id", migration.id)
            .with("description", migration.description);
        self.store.insert(MIGRATIONS_TABLE, entry).await?;
        Ok(())
    }

    /// Ledger summary against the static list. Read-only: a missing ledger
    /// reports every migration as pending.
    pub async fn status(&self) -> Result<MigrationStatus> {
        let ledger = if self.ledger_present().await? {
            self.ledger().await?
        } else {
            Vec::new()
        };
        let last_failure = self.last_failure.lock().await.clone();

        let migrations: Vec<MigrationInfo> = self
            .migrations
            .iter()
            .map(|migration| {
                let row = ledger
                    .iter()
                    .find(|row| row.get_text("id").as_deref() == Some(migration.id));
                let state = match row {
                    Some(_) => MigrationState::Applied,
                    None if last_failure.as_deref() == Some(migration.id) => {
                        MigrationState::Failed
                    }
                    None => MigrationState::Pending,
                };
                let applied_at = row.and_then(|row| {
                    row.get("applied_at")
                        .and_then(parse_timestamp)
                        .or_else(|| row.get("created_at").and_then(parse_timestamp))
                });
                MigrationInfo {
                    id: migration.id.to_string(),
                    description: migration.description.to_string(),
                    state,
                    applied_at,
                }
            })
            .collect();

        let applied = migrations
            .iter()
            .filter(|m| m.state == MigrationState::Applied)
            .count();

        Ok(MigrationStatus {
            total: migrations.len(),
            applied,
            pending: migrations.len() - applied,
            migrations,
        })
    }
}
