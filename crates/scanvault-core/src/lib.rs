//! # scanvault-core
//!
//! Core types, traits, and abstractions for the scanvault data-access and
//! search subsystem.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the storage and search crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod query;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use query::{Condition, Operator, OrderBy, Predicate, SortDirection};
pub use traits::*;
