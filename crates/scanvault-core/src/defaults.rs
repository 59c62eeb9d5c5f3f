//! Centralized default constants for scanvault.
//!
//! All crates and the CLI reference these constants instead of defining
//! their own magic numbers.

// =============================================================================
// CONNECTION POOL
// =============================================================================

/// Maximum number of pooled connections.
pub const POOL_MAX_CONNECTIONS: u32 = 10;

/// Minimum number of pooled connections kept warm.
pub const POOL_MIN_CONNECTIONS: u32 = 2;

/// Connect/acquire timeout in seconds. Kept short so an unreachable backend
/// is detected quickly at startup.
pub const POOL_CONNECT_TIMEOUT_SECS: u64 = 2;

/// Idle connections are recycled after this many seconds.
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 600;

/// Maximum connection lifetime in seconds (30 minutes).
pub const POOL_MAX_LIFETIME_SECS: u64 = 1800;

/// Schema used when none is configured.
pub const DATABASE_SCHEMA: &str = "public";

// =============================================================================
// TABLES
// =============================================================================

/// Ledger of applied schema migrations.
pub const MIGRATIONS_TABLE: &str = "schema_migrations";

/// Live-mode backing table for the cache.
pub const CACHE_TABLE: &str = "cache_entries";

/// Every table the application knows about. The emulated store is seeded
/// with an empty table for each.
pub const KNOWN_TABLES: &[&str] = &[
    "users",
    "sessions",
    "projects",
    "scans",
    "files",
    "conflicts",
    CACHE_TABLE,
    MIGRATIONS_TABLE,
];

/// Ownership cascades as `(parent_table, child_table, foreign_key_column)`.
///
/// Live mode declares these as `ON DELETE CASCADE` foreign keys; the
/// emulated store replays them on delete.
pub const CASCADES: &[(&str, &str, &str)] = &[
    ("users", "sessions", "user_id"),
    ("users", "projects", "user_id"),
    ("projects", "scans", "project_id"),
    ("projects", "files", "project_id"),
    ("projects", "conflicts", "project_id"),
    ("files", "conflicts", "file_id"),
];

// =============================================================================
// SEARCH
// =============================================================================

/// Default number of search results.
pub const SEARCH_LIMIT: i64 = 20;

/// Upper bound on the number of search results per request.
pub const SEARCH_LIMIT_MAX: i64 = 100;

/// Document vector weight for the name/title field (tsvector weight A).
pub const WEIGHT_NAME: f32 = 1.0;

/// Document vector weight for the path field (tsvector weight B).
pub const WEIGHT_PATH: f32 = 0.4;

/// Document vector weight for the description field (tsvector weight C).
pub const WEIGHT_DESCRIPTION: f32 = 0.2;

/// Rank boost when the raw query appears verbatim in the name.
pub const EXACT_NAME_BOOST: f32 = 1.0;

/// Rank boost when the raw query appears verbatim in the path.
pub const EXACT_PATH_BOOST: f32 = 0.5;

/// Rank boost when the raw query appears verbatim in the description.
pub const EXACT_DESCRIPTION_BOOST: f32 = 0.25;

// =============================================================================
// CACHE
// =============================================================================

/// TTL for memoized global search responses, in seconds.
pub const SEARCH_CACHE_TTL_SECS: u64 = 60;

/// Prefix for memoized search cache keys.
pub const SEARCH_CACHE_PREFIX: &str = "sv:search:";

/// Interval between background cache sweeps in the CLI host, in seconds.
pub const CACHE_SWEEP_INTERVAL_SECS: u64 = 300;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_bounds() {
        assert!(POOL_MIN_CONNECTIONS <= POOL_MAX_CONNECTIONS);
        assert_eq!(POOL_MAX_CONNECTIONS, 10);
        assert_eq!(POOL_MIN_CONNECTIONS, 2);
    }

    #[test]
    fn test_cascades_reference_known_tables() {
        for (parent, child, _) in CASCADES {
            assert!(KNOWN_TABLES.contains(parent), "unknown parent {}", parent);
            assert!(KNOWN_TABLES.contains(child), "unknown child {}", child);
        }
    }

    #[test]
    fn test_boosts_are_ordered() {
        assert!(EXACT_NAME_BOOST > EXACT_PATH_BOOST);
        assert!(EXACT_PATH_BOOST > EXACT_DESCRIPTION_BOOST);
    }
}
