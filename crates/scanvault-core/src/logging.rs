//! Structured logging schema and field name constants for scanvault.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query by the same field names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied (emulated mode, isolated search failure) |
//! | INFO  | Lifecycle events (startup, migrations, shutdown) |
//! | DEBUG | Decision points, statement timing, config choices |
//! | TRACE | Per-item iteration, high-volume data (search hits) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "database", "search", "cache", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "executor", "emulated", "migrations", "engine"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "insert", "select", "global_search", "sweep"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Database table or entity affected.
pub const DB_TABLE: &str = "db_table";

/// Entity type searched.
pub const ENTITY_TYPE: &str = "entity_type";

/// Migration identifier.
pub const MIGRATION_ID: &str = "migration_id";

/// Statement text, truncated.
pub const QUERY: &str = "query";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows or results returned.
pub const RESULT_COUNT: &str = "result_count";

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

/// Execution mode ("live" or "emulated").
pub const STORE_MODE: &str = "store_mode";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";

/// Statements slower than this are flagged with `slow = true`.
pub const SLOW_QUERY_MS: u64 = 250;
