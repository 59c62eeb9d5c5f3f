//! Federated ranked search over projects, scans, files and conflicts.
//!
//! Live stores delegate ranking to the provisioned `search_<table>`
//! functions; emulated stores score rows in process with the same weights.
//! Global search fans out to every entity concurrently and fuses the
//! results, so one failing entity never hides the others.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use scanvault_core::defaults::{
    SEARCH_CACHE_PREFIX, SEARCH_CACHE_TTL_SECS, SEARCH_LIMIT, SEARCH_LIMIT_MAX,
};
use scanvault_core::{
    sort_by_relevance, value_as_text, EntityType, Error, GlobalSearchResponse, MatchType,
    Predicate, Record, RecordStore, Result, SearchResult,
};
use scanvault_db::{CacheStore, DataService};

use crate::entities::{EntitySpec, Scope};
use crate::scoring::{score, QueryTerms, Scored};

/// Default to [`SEARCH_LIMIT`], never above [`SEARCH_LIMIT_MAX`].
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    match limit {
        None => SEARCH_LIMIT,
        Some(limit) => limit.clamp(1, SEARCH_LIMIT_MAX),
    }
}

/// Cache key for a global search.
///
/// The query is trimmed and lowercased so that equivalent searches share an
/// entry.
pub fn cache_key(query: &str, scope: Option<&str>, limit: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.trim().to_lowercase().as_bytes());
    hasher.update([0x1f_u8]);
    hasher.update(scope.unwrap_or_default().as_bytes());
    hasher.update([0x1f_u8]);
    hasher.update(limit.to_string().as_bytes());
    format!("{}{}", SEARCH_CACHE_PREFIX, hex::encode(hasher.finalize()))
}

/// Search engine over a [`RecordStore`].
#[derive(Clone)]
pub struct FederatedSearchEngine {
    store: Arc<dyn RecordStore>,
    cache: Option<CacheStore>,
    cache_ttl: Duration,
}

impl FederatedSearchEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            cache: None,
            cache_ttl: Duration::from_secs(SEARCH_CACHE_TTL_SECS),
        }
    }

    /// Engine over the service's store, memoizing global searches in its cache.
    pub fn for_service(service: &DataService) -> Self {
        Self::new(Arc::clone(service.store())).with_cache(service.cache().clone())
    }

    /// Memoize global searches in `cache`.
    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Ranked results for one entity type.
    ///
    /// A blank query returns no results. Any store failure is reported as
    /// [`Error::SearchUnavailable`] for that entity.
    #[instrument(
        skip(self, query),
        fields(subsystem = "search", component = "engine", entity_type = %entity)
    )]
    pub async fn search_entity(
        &self,
        entity: EntityType,
        query: &str,
        scope: Option<&str>,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<SearchResult>> {
        let Some(terms) = QueryTerms::parse(query) else {
            debug!("Blank query, no results");
            return Ok(Vec::new());
        };
        let limit = clamp_limit(limit);
        let offset = offset.max(0);
        let spec = EntitySpec::of(entity);

        let start = Instant::now();
        let outcome = if self.store.mode().is_live() {
            self.search_live(spec, query, scope, limit, offset).await
        } else {
            self.search_emulated(spec, &terms, scope, limit, offset).await
        };
        let results = outcome.map_err(|e| Error::SearchUnavailable {
            entity: entity.to_string(),
            reason: e.to_string(),
        })?;

        debug!(
            result_count = results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Entity search complete"
        );
        Ok(results)
    }

    async fn search_live(
        &self,
        spec: &EntitySpec,
        query: &str,
        scope: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SearchResult>> {
        let sql = format!(
            "SELECT record, rank, match_type FROM {}($1, $2) LIMIT $3 OFFSET $4",
            spec.function_name()
        );
        let params = [
            Value::from(query),
            scope.map(Value::from).unwrap_or(Value::Null),
            Value::from(limit),
            Value::from(offset),
        ];

        let rows = self.store.query(&sql, &params).await?;
        rows.iter().map(|row| live_result(spec, row)).collect()
    }

    async fn search_emulated(
        &self,
        spec: &EntitySpec,
        terms: &QueryTerms,
        scope: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SearchResult>> {
        let rows = self.store.select(spec.table, None, None, None).await?;
        let owned = match scope {
            Some(owner) => Some(self.owned_keys(spec, owner).await?),
            None => None,
        };

        let mut results: Vec<SearchResult> = rows
            .iter()
            .filter(|row| match (&owned, spec.scope) {
                (None, _) => true,
                (Some(keys), Scope::Direct(column)) | (Some(keys), Scope::ViaProject(column)) => {
                    row.get_text(column).is_some_and(|key| keys.contains(&key))
                }
            })
            .filter_map(|row| {
                score(
                    terms,
                    spec.title(row),
                    spec.path(row),
                    spec.description(row),
                )
                .map(|scored| spec.to_result(row, scored))
            })
            .collect();

        sort_by_relevance(&mut results);
        Ok(results
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    /// Values the scope column must take for rows owned by `owner`.
    async fn owned_keys(&self, spec: &EntitySpec, owner: &str) -> Result<HashSet<String>> {
        match spec.scope {
            Scope::Direct(_) => Ok(HashSet::from([owner.to_string()])),
            Scope::ViaProject(_) => {
                let projects = self
                    .store
                    .select(
                        EntityType::Project.table(),
                        Some(&Predicate::eq("user_id", owner)),
                        None,
                        None,
                    )
                    .await?;
                Ok(projects.iter().filter_map(|p| p.get_text("id")).collect())
            }
        }
    }

    /// Search every entity type and fuse the results.
    ///
    /// Entity searches run concurrently; a failing entity is logged and
    /// contributes nothing, and the degraded response is not cached. Results are ordered by rank then recency,
    /// truncated to the clamped limit, and grouped by entity type.
    #[instrument(skip(self, query), fields(subsystem = "search", component = "engine"))]
    pub async fn global_search(
        &self,
        query: &str,
        scope: Option<&str>,
        limit: Option<i64>,
    ) -> Result<GlobalSearchResponse> {
        if query.trim().is_empty() {
            return Ok(GlobalSearchResponse::default());
        }
        let limit = clamp_limit(limit);
        let key = cache_key(query, scope, limit);

        if let Some(cached) = self.cached(&key).await {
            return Ok(cached);
        }

        let start = Instant::now();
        let searches = EntityType::ALL
            .iter()
            .map(|entity| self.search_entity(*entity, query, scope, Some(limit), 0));
        let outcomes = join_all(searches).await;

        let mut results = Vec::new();
        let mut failed = 0usize;
        for outcome in outcomes {
            match outcome {
                Ok(hits) => results.extend(hits),
                Err(e) => {
                    failed += 1;
                    warn!(error = %e, "Entity search failed, continuing without it");
                }
            }
        }

        sort_by_relevance(&mut results);
        results.truncate(limit as usize);
        let response = GlobalSearchResponse::from_results(results);

        info!(
            result_count = response.results.len(),
            failed_entities = failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Global search complete"
        );

        // A partial answer is only valid while the failure lasts.
        if failed == 0 {
            self.remember(&key, &response).await;
        }
        Ok(response)
    }

    async fn cached(&self, key: &str) -> Option<GlobalSearchResponse> {
        let cache = self.cache.as_ref()?;
        match cache.get_as::<GlobalSearchResponse>(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "Search cache read failed");
                None
            }
        }
    }

    async fn remember(&self, key: &str, response: &GlobalSearchResponse) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache.set_as(key, response, Some(self.cache_ttl)).await {
            warn!(error = %e, "Search cache write failed");
        }
    }
}

/// Convert a `search_<table>` row into a result.
fn live_result(spec: &EntitySpec, row: &Record) -> Result<SearchResult> {
    let record = match row.get("record") {
        Some(Value::String(text)) => Record::from_json(serde_json::from_str(text)?)?,
        Some(value) => Record::from_json(value.clone())?,
        None => return Err(Error::Query("search row without record".to_string())),
    };
    let rank = row.get("rank").and_then(Value::as_f64).unwrap_or_default() as f32;
    let match_type = match row.get("match_type").and_then(value_as_text) {
        Some(text) => text.parse()?,
        None => MatchType::Semantic,
    };

    Ok(spec.to_result(&record, Scored { rank, match_type }))
}
