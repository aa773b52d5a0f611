//! Ranking cache keyed by (dataset, horizon).
//!
//! A stored ranking serves a request when it was computed under the same
//! model, is younger than the validity window, and holds at least `k`
//! entries (or selection stopped on its own before `k`). Anything else is a
//! miss and triggers recomputation under a per-(dataset, horizon, model)
//! single-flight lock; the new ranking replaces the old one in one write.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::CacheConfig;
use crate::error::{BottleneckError, StoreError};
use crate::influence::ModelType;
use crate::store::{Keyspace, TieredStore, ranking_key};

use super::{BottleneckEntry, BottleneckResult, Selection, unix_now};

/// What the cache stores per (dataset, horizon).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRanking {
    pub model: ModelType,
    pub requested_k: usize,
    /// Selection ended before `requested_k` because no candidate helped.
    pub exhausted: bool,
    pub computed_at: u64,
    pub entries: Vec<BottleneckEntry>,
}

impl CachedRanking {
    /// The first `k` entries when this ranking can answer the request.
    ///
    /// A ranking with fewer than `k` rows is normally a miss. The exception
    /// is an exhausted ranking: its selection stopped because no remaining
    /// candidate had positive benefit, so recomputing with a larger `k`
    /// returns the same rows and the short ranking is served as a hit.
    fn serve(&self, k: usize, model: ModelType, now: u64, validity_secs: u64) -> Option<Vec<BottleneckEntry>> {
        let fresh = now.saturating_sub(self.computed_at) < validity_secs;
        let enough = self.entries.len() >= k || self.exhausted;
        (self.model == model && fresh && enough)
            .then(|| self.entries.iter().take(k).cloned().collect())
    }
}

/// Ranking returned to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingOutcome {
    pub entries: Vec<BottleneckEntry>,
    pub cached: bool,
    /// False when the selection was interrupted. Partial rankings are never stored.
    pub complete: bool,
}

type FlightKey = (String, u32, ModelType);

/// Get-or-compute cache over the tiered store.
pub struct RankingCache {
    store: Arc<TieredStore>,
    validity_secs: u64,
    in_flight: DashMap<FlightKey, Arc<Mutex<()>>>,
}

impl RankingCache {
    pub fn new(store: Arc<TieredStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            validity_secs: config.validity_secs,
            in_flight: DashMap::new(),
        }
    }

    /// The stored ranking for (dataset, horizon), if any and decodable.
    pub fn stored(&self, dataset_id: &str, horizon_minutes: u32) -> BottleneckResult<Option<CachedRanking>> {
        let key = ranking_key(dataset_id, horizon_minutes);
        match self.store.get_value::<CachedRanking>(Keyspace::Rankings, &key) {
            Ok(ranking) => Ok(ranking),
            Err(StoreError::Serialization { message }) => {
                tracing::warn!(dataset_id, horizon_minutes, %message, "unreadable cached ranking, treating as miss");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cached entries that can serve the request at time `now`.
    pub fn lookup(
        &self,
        dataset_id: &str,
        k: usize,
        horizon_minutes: u32,
        model: ModelType,
        now: u64,
    ) -> BottleneckResult<Option<Vec<BottleneckEntry>>> {
        Ok(self
            .stored(dataset_id, horizon_minutes)?
            .and_then(|r| r.serve(k, model, now, self.validity_secs)))
    }

    /// Serve from cache or run `compute` and store its ranking.
    pub fn get_or_compute<F>(
        &self,
        dataset_id: &str,
        k: usize,
        horizon_minutes: u32,
        model: ModelType,
        force_recompute: bool,
        compute: F,
    ) -> BottleneckResult<RankingOutcome>
    where
        F: FnOnce() -> BottleneckResult<Selection>,
    {
        if k == 0 {
            return Err(BottleneckError::ZeroK);
        }
        let hit = |cache: &Self| -> BottleneckResult<Option<RankingOutcome>> {
            if force_recompute {
                return Ok(None);
            }
            Ok(cache
                .lookup(dataset_id, k, horizon_minutes, model, unix_now())?
                .map(|entries| RankingOutcome {
                    entries,
                    cached: true,
                    complete: true,
                }))
        };

        if let Some(outcome) = hit(self)? {
            tracing::info!(dataset_id, horizon_minutes, %model, k, "ranking cache hit");
            return Ok(outcome);
        }

        let flight = self
            .in_flight
            .entry((dataset_id.to_string(), horizon_minutes, model))
            .or_default()
            .clone();
        let _guard = flight.lock().expect("single-flight lock poisoned");

        // Another request may have filled the cache while we waited.
        if let Some(outcome) = hit(self)? {
            tracing::info!(dataset_id, horizon_minutes, %model, k, "ranking filled by concurrent request");
            return Ok(outcome);
        }

        tracing::info!(dataset_id, horizon_minutes, %model, k, force_recompute, "recomputing ranking");
        let selection = compute()?;

        if selection.complete {
            let ranking = CachedRanking {
                model,
                requested_k: k,
                exhausted: selection.exhausted,
                computed_at: unix_now(),
                entries: selection.entries.clone(),
            };
            self.store.put_value(
                Keyspace::Rankings,
                &ranking_key(dataset_id, horizon_minutes),
                &ranking,
            )?;
        } else {
            tracing::warn!(dataset_id, horizon_minutes, %model, "partial ranking not cached");
        }

        Ok(RankingOutcome {
            entries: selection.entries,
            cached: false,
            complete: selection.complete,
        })
    }
}

impl std::fmt::Debug for RankingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankingCache")
            .field("validity_secs", &self.validity_secs)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}
