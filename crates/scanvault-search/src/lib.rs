//! # scanvault-search
//!
//! Ranked, federated search across scanvault entities.
//!
//! This crate provides:
//! - Provisioning of GIN indexes and per-entity SQL ranking functions
//! - Per-entity ranked search with exact-match classification
//! - Global search that fuses every entity's results, tolerating per-entity
//!   failures, with optional memoization through the cache
//!
//! ## Example
//!
//! ```rust,ignore
//! use scanvault_db::{DataService, StoreConfig};
//! use scanvault_search::{FederatedSearchEngine, SearchIndexManager};
//!
//! let service = DataService::initialize(StoreConfig::from_env()?).await;
//! let indexes = SearchIndexManager::new(service.store().clone());
//! indexes.create_indexes().await;
//! indexes.create_functions().await;
//!
//! let engine = FederatedSearchEngine::for_service(&service);
//! let response = engine.global_search("auth", Some("1"), None).await?;
//! for hit in &response.results {
//!     println!("{} {} {:.2}", hit.entity_type, hit.title, hit.rank);
//! }
//! ```

pub mod engine;
pub mod entities;
pub mod index;
pub mod scoring;

pub use engine::{cache_key, clamp_limit, FederatedSearchEngine};
pub use entities::{EntitySpec, Scope};
pub use index::{IndexReport, SearchIndexManager};
pub use scoring::{score, tokenize, QueryTerms, Scored};

// Re-export the result types callers work with
pub use scanvault_core::{EntityType, GlobalSearchResponse, MatchType, SearchResult};
