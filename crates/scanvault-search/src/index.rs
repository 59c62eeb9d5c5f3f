//! Provisioning of search indexes and SQL ranking functions.
//!
//! Every statement is idempotent and runs independently: a failure is logged
//! and counted, and provisioning carries on with the next statement.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use scanvault_core::defaults::{
    EXACT_DESCRIPTION_BOOST, EXACT_NAME_BOOST, EXACT_PATH_BOOST, SEARCH_LIMIT, WEIGHT_DESCRIPTION,
    WEIGHT_NAME, WEIGHT_PATH,
};
use scanvault_core::{EntityType, RecordStore};

use crate::entities::{EntitySpec, Scope};

/// Outcome of a provisioning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub created: usize,
    pub failed: usize,
    /// True when the store is emulated and nothing was attempted.
    pub skipped: bool,
}

impl IndexReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Creates the indexes and functions the live search path relies on.
pub struct SearchIndexManager {
    store: Arc<dyn RecordStore>,
}

impl SearchIndexManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// GIN indexes on the search vectors, recency indexes and the cache
    /// expiry index.
    pub async fn create_indexes(&self) -> IndexReport {
        self.provision("indexes", index_statements()).await
    }

    /// `search_<table>` per entity and `global_search`.
    pub async fn create_functions(&self) -> IndexReport {
        self.provision("functions", function_statements()).await
    }

    async fn provision(&self, kind: &str, statements: Vec<String>) -> IndexReport {
        if !self.store.mode().is_live() {
            debug!(
                subsystem = "search",
                component = "index",
                op = kind,
                "Emulated store, search provisioning skipped"
            );
            return IndexReport::skipped();
        }

        let start = Instant::now();
        let mut report = IndexReport::default();
        for statement in &statements {
            match self.store.execute(statement, &[]).await {
                Ok(_) => report.created += 1,
                Err(e) => {
                    report.failed += 1;
                    debug!(
                        subsystem = "search",
                        component = "index",
                        op = kind,
                        error = %e,
                        "Search provisioning statement failed"
                    );
                }
            }
        }

        info!(
            subsystem = "search",
            component = "index",
            op = kind,
            created = report.created,
            failed = report.failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Search provisioning complete"
        );
        report
    }
}

pub fn index_statements() -> Vec<String> {
    let mut statements = Vec::new();
    for entity in EntityType::ALL {
        let table = entity.table();
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_search_vector ON {0} USING GIN (search_vector)",
            table
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_updated_at ON {0} (updated_at DESC)",
            table
        ));
    }
    statements.push(
        "CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at \
         ON cache_entries (expires_at) WHERE expires_at IS NOT NULL"
            .to_string(),
    );
    statements
}

pub fn function_statements() -> Vec<String> {
    let mut statements: Vec<String> = EntityType::ALL
        .iter()
        .map(|entity| entity_function(EntitySpec::of(*entity)))
        .collect();
    statements.push(global_function());
    statements
}

/// `lower(coalesce(e.<column>, ''))`
fn lowered(column: &str) -> String {
    format!("lower(coalesce(e.{}, ''))", column)
}

fn entity_function(spec: &EntitySpec) -> String {
    // (field expression, boost, match type) in precedence order
    let mut exact = vec![(lowered(spec.title_column), EXACT_NAME_BOOST, "exact_name")];
    if let Some(path) = spec.path_column {
        exact.push((lowered(path), EXACT_PATH_BOOST, "exact_path"));
    }
    exact.push((
        lowered(spec.description_column),
        EXACT_DESCRIPTION_BOOST,
        "exact_description",
    ));

    let boosts: Vec<String> = exact
        .iter()
        .map(|(field, boost, _)| {
            format!(
                "CASE WHEN strpos({}, q.needle) > 0 THEN {:.2} ELSE 0 END",
                field, boost
            )
        })
        .collect();
    let classification: Vec<String> = exact
        .iter()
        .map(|(field, _, match_type)| {
            format!("WHEN strpos({}, q.needle) > 0 THEN '{}'", field, match_type)
        })
        .collect();
    let contains: Vec<String> = exact
        .iter()
        .map(|(field, _, _)| format!("strpos({}, q.needle) > 0", field))
        .collect();

    let scope = match spec.scope {
        Scope::Direct(column) => format!("e.{}::text = scope_id", column),
        Scope::ViaProject(fk) => format!(
            "EXISTS (SELECT 1 FROM projects p WHERE p.id = e.{} AND p.user_id::text = scope_id)",
            fk
        ),
    };

    // ts_rank weight array order is {D, C, B, A}; normalization 32 is r / (r + 1).
    format!(
        "CREATE OR REPLACE FUNCTION {name}(search_query TEXT, scope_id TEXT DEFAULT NULL)
RETURNS TABLE(record JSONB, rank REAL, match_type TEXT)
LANGUAGE sql STABLE AS $fn$
    WITH q AS (
        SELECT lower(trim(search_query)) AS needle,
               to_tsquery('simple', coalesce(array_to_string(array(
                   SELECT quote_literal(t) || ':*'
                   FROM regexp_split_to_table(lower(search_query), '[^[:alnum:]]+') AS t
                   WHERE t <> ''
               ), ' | '), '')) AS tsq
    )
    SELECT to_jsonb(e) - 'search_vector' AS record,
           (ts_rank('{{0.0, {c:.2}, {b:.2}, {a:.2}}}', e.search_vector, q.tsq, 32)
            + {boosts})::real AS rank,
           CASE {classification} ELSE 'semantic' END AS match_type
    FROM {table} e, q
    WHERE q.needle <> ''
      AND (e.search_vector @@ q.tsq OR {contains})
      AND (scope_id IS NULL OR {scope})
    ORDER BY rank DESC, e.updated_at DESC
$fn$",
        name = spec.function_name(),
        table = spec.table,
        a = WEIGHT_NAME,
        b = WEIGHT_PATH,
        c = WEIGHT_DESCRIPTION,
        boosts = boosts.join("\n            + "),
        classification = classification.join(" "),
        contains = contains.join(" OR "),
        scope = scope,
    )
}

fn global_function() -> String {
    let branches: Vec<String> = EntityType::ALL
        .iter()
        .map(|entity| {
            let spec = EntitySpec::of(*entity);
            let metadata: Vec<String> = spec
                .metadata_columns
                .iter()
                .map(|column| format!("'{0}', s.record -> '{0}'", column))
                .collect();
            format!(
                "SELECT '{entity}'::text AS entity_type,
               s.record ->> 'id' AS entity_id,
               coalesce(s.record ->> '{title}', '') AS title,
               coalesce(s.record ->> '{description}', '') AS description,
               jsonb_build_object({metadata}) AS metadata,
               s.rank,
               s.match_type,
               coalesce(s.record ->> 'updated_at', s.record ->> 'created_at') AS recency
        FROM {function}(search_query, scope_id) s",
                entity = entity.as_str(),
                title = spec.title_column,
                description = spec.description_column,
                metadata = metadata.join(", "),
                function = spec.function_name(),
            )
        })
        .collect();

    format!(
        "CREATE OR REPLACE FUNCTION global_search(
    search_query TEXT,
    scope_id TEXT DEFAULT NULL,
    result_limit INT DEFAULT {limit}
)
RETURNS TABLE(entity_type TEXT, entity_id TEXT, title TEXT, description TEXT,
              metadata JSONB, rank REAL, match_type TEXT)
LANGUAGE sql STABLE AS $fn$
    SELECT u.entity_type, u.entity_id, u.title, u.description, u.metadata, u.rank, u.match_type
    FROM (
        {branches}
    ) u
    ORDER BY u.rank DESC, u.recency::timestamptz DESC NULLS LAST
    LIMIT result_limit
$fn$",
        limit = SEARCH_LIMIT,
        branches = branches.join("\n        UNION ALL\n        "),
    )
}
