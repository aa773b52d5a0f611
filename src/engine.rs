//! Engine facade: top-level API for the jamspread system.
//!
//! The `Engine` owns the store, the ranking cache and the dataset source, and
//! turns routing-layer requests into learner, simulator and selector calls.

use std::sync::Arc;

use crate::api::{
    BottlenecksRequest, BottlenecksResponse, FlowsResponse, ImpactsResponse, LearnRequest,
    LearnResponse, ModelRequest, PredictRequest, PredictResponse, RunModelRequest,
    RunModelResponse, WhatIfRequest, WhatIfResponse,
};
use crate::bottleneck::cache::RankingCache;
use crate::bottleneck::{CancellationToken, GreedySelector, SelectionParams};
use crate::config::EngineConfig;
use crate::dataset::{Dataset, DatasetProvider, DatasetRegistry};
use crate::diffusion::{self, DiffusionGraph, Prediction, SimulationParams};
use crate::error::{BottleneckError, EngineError, JamError, JamResult};
use crate::flows;
use crate::history::{SeedSet, derive_seed_set};
use crate::influence::learn::{LearnSummary, learn_probabilities};
use crate::influence::{InfluenceTable, ModelType};
use crate::segment::SegmentId;
use crate::store::TieredStore;
use crate::whatif::{self, WhatIfReport};

/// The traffic-jam diffusion engine.
pub struct Engine {
    config: EngineConfig,
    provider: Arc<dyn DatasetProvider>,
    registry: Option<Arc<DatasetRegistry>>,
    store: Arc<TieredStore>,
    cache: RankingCache,
}

impl Engine {
    /// Create an engine with its own in-memory dataset registry.
    pub fn new(config: EngineConfig) -> JamResult<Self> {
        let registry = Arc::new(DatasetRegistry::new());
        let provider: Arc<dyn DatasetProvider> = registry.clone();
        Self::build(config, provider, Some(registry))
    }

    /// Create an engine that reads datasets from an external provider.
    pub fn with_provider(config: EngineConfig, provider: Arc<dyn DatasetProvider>) -> JamResult<Self> {
        Self::build(config, provider, None)
    }

    fn build(
        config: EngineConfig,
        provider: Arc<dyn DatasetProvider>,
        registry: Option<Arc<DatasetRegistry>>,
    ) -> JamResult<Self> {
        config.validate()?;
        tracing::info!(
            persistent = config.data_dir.is_some(),
            seeded = config.rng_seed.is_some(),
            "initializing jamspread engine"
        );

        let store = if let Some(ref dir) = config.data_dir {
            std::fs::create_dir_all(dir).map_err(|_| EngineError::DataDir {
                path: dir.display().to_string(),
            })?;
            TieredStore::with_persistence(dir)?
        } else {
            TieredStore::memory_only()
        };
        let store = Arc::new(store);
        let cache = RankingCache::new(Arc::clone(&store), &config.cache);

        Ok(Self {
            config,
            provider,
            registry,
            store,
            cache,
        })
    }

    /// Register or replace a dataset. Replacing drops the id's cached rankings.
    ///
    /// Stored influence rows that reference a segment the new graph lacks are
    /// dropped so the remaining rows still build a diffusion graph.
    pub fn register_dataset(&self, dataset_id: &str, dataset: Dataset) -> JamResult<()> {
        let Some(registry) = &self.registry else {
            return Err(EngineError::ExternalProvider {
                dataset_id: dataset_id.to_string(),
            }
            .into());
        };
        tracing::info!(
            dataset_id,
            segments = dataset.graph().segment_count(),
            observations = dataset.history().len(),
            "registering dataset"
        );
        let (kept, stale): (Vec<_>, Vec<_>) =
            self.store.influence(dataset_id)?.into_iter().partition(|row| {
                dataset.graph().has_segment(row.from_segment_id)
                    && dataset.graph().has_segment(row.to_segment_id)
            });
        if !stale.is_empty() {
            self.store.replace_influence(dataset_id, &kept)?;
            tracing::warn!(
                dataset_id,
                skipped = stale.len(),
                kept = kept.len(),
                "influence rows reference segments missing from the new graph"
            );
        }
        if registry.insert(dataset_id, dataset) {
            let dropped = self.store.invalidate_rankings(dataset_id)?;
            tracing::info!(dataset_id, dropped, "dataset replaced, cached rankings dropped");
        }
        Ok(())
    }

    /// The dataset, or an empty one when nothing is known under the id.
    fn dataset(&self, dataset_id: &str) -> Arc<Dataset> {
        self.provider.dataset(dataset_id).unwrap_or_else(|| {
            tracing::warn!(dataset_id, "no data for dataset, results will be empty");
            Arc::new(Dataset::default())
        })
    }

    /// Seed for one request: the configured one or a fresh draw.
    fn request_seed(&self) -> u64 {
        self.config.rng_seed.unwrap_or_else(rand::random)
    }

    /// Learn influence probabilities and replace the dataset's stored rows.
    pub fn learn(&self, request: &LearnRequest) -> JamResult<LearnResponse> {
        let model = request.model()?;
        let summary = self.learn_inner(&request.dataset_id, &request.time_horizons, model)?;
        Ok(LearnResponse {
            success: true,
            total_learned: summary.total_learned,
            time_horizons: request.time_horizons.clone(),
            model_type: model,
        })
    }

    fn learn_inner(&self, dataset_id: &str, horizons: &[u32], model: ModelType) -> JamResult<LearnSummary> {
        let dataset = self.dataset(dataset_id);
        let (rows, summary) = learn_probabilities(&dataset, horizons, model, &self.config.learn)?;
        self.store.replace_influence(dataset_id, &rows)?;
        let dropped = self.store.invalidate_rankings(dataset_id)?;
        tracing::info!(
            dataset_id,
            %model,
            total = summary.total_learned,
            dropped_rankings = dropped,
            "influence probabilities learned"
        );
        Ok(summary)
    }

    /// Current seed set of a dataset. `now` defaults to the latest observation.
    pub fn seed_set(&self, dataset_id: &str, now: Option<u64>) -> SeedSet {
        let dataset = self.dataset(dataset_id);
        derive_seed_set(dataset.history(), &dataset.segment_ids(), now, &self.config.learn)
    }

    fn diffusion_graph(&self, dataset: &Dataset, dataset_id: &str, horizon: u32, model: ModelType) -> JamResult<DiffusionGraph> {
        let rows = self.store.influence(dataset_id)?;
        if rows.is_empty() {
            tracing::warn!(dataset_id, "no influence probabilities learned, nothing can spread");
        }
        let table = InfluenceTable::select(&rows, horizon, model);
        Ok(DiffusionGraph::build(dataset.graph(), &table)?)
    }

    /// Simulate spread from explicit seeds.
    pub fn predict(&self, request: &PredictRequest) -> JamResult<PredictResponse> {
        let model = request.model()?;
        let horizon = request.time_horizon_minutes;
        let result = (|| -> JamResult<Vec<Prediction>> {
            let dataset = self.dataset(&request.dataset_id);
            let graph = self.diffusion_graph(&dataset, &request.dataset_id, horizon, model)?;
            let params = SimulationParams {
                horizon_minutes: horizon,
                simulations: request
                    .num_simulations
                    .unwrap_or_else(|| diffusion::default_simulations(model, &self.config.diffusion)),
                rng_seed: self.request_seed(),
            };
            let spread = diffusion::simulate(
                &graph,
                model,
                &request.seed_segment_ids,
                &params,
                &self.config.diffusion,
            )?;
            Ok(spread.predictions)
        })();
        let predictions = log_failure(result, &request.dataset_id, horizon, model)?;

        Ok(PredictResponse {
            success: true,
            model_type: model,
            time_horizon: horizon,
            seed_segment_ids: request.seed_segment_ids.clone(),
            predictions,
        })
    }

    /// Top-K bottlenecks, served from the cache when possible.
    pub fn top_k_bottlenecks(
        &self,
        request: &BottlenecksRequest,
        cancel: &CancellationToken,
    ) -> JamResult<BottlenecksResponse> {
        let model = request.model()?;
        if request.k == 0 {
            return Err(BottleneckError::ZeroK.into());
        }
        let dataset_id = request.dataset_id.as_str();
        let horizon = request.time_horizon_minutes;
        let dataset = self.dataset(dataset_id);
        let seeds = derive_seed_set(
            dataset.history(),
            &dataset.segment_ids(),
            None,
            &self.config.learn,
        );

        let outcome = self.cache.get_or_compute(
            dataset_id,
            request.k,
            horizon,
            model,
            request.force_recompute,
            || {
                let rows = self.store.influence(dataset_id)?;
                let table = InfluenceTable::select(&rows, horizon, model);
                let graph = DiffusionGraph::build(dataset.graph(), &table)?;
                let selector = GreedySelector::new(
                    &graph,
                    dataset.graph(),
                    &self.config.diffusion,
                    &self.config.selection,
                );
                let params = SelectionParams {
                    k: request.k,
                    horizon_minutes: horizon,
                    model,
                    rng_seed: self.request_seed(),
                };
                let selection = selector.select(&seeds.segments, &params, cancel)?;
                tracing::info!(
                    dataset_id,
                    horizon,
                    %model,
                    selected = selection.entries.len(),
                    baseline = selection.baseline_jam_count,
                    simulations = selection.simulations_run,
                    "greedy selection finished"
                );
                Ok(selection)
            },
        );
        let outcome = log_failure(outcome.map_err(JamError::from), dataset_id, horizon, model)?;

        Ok(BottlenecksResponse {
            success: true,
            cached: outcome.cached,
            complete: outcome.complete,
            seed_fallback: seeds.fallback,
            model_type: model,
            time_horizon: horizon,
            bottlenecks: outcome.entries,
        })
    }

    /// Learn with the default horizons if the dataset has no rows yet, then
    /// recompute the ranking.
    pub fn run_model(&self, request: &RunModelRequest, cancel: &CancellationToken) -> JamResult<RunModelResponse> {
        let model = request.model()?;
        let learned = if self.store.influence(&request.dataset_id)?.is_empty() {
            let horizons = self.config.learn.default_horizons.clone();
            self.learn_inner(&request.dataset_id, &horizons, model)?
                .total_learned
        } else {
            0
        };
        let ranking = self.top_k_bottlenecks(
            &BottlenecksRequest {
                dataset_id: request.dataset_id.clone(),
                k: request.k,
                time_horizon_minutes: request.time_horizon_minutes,
                model_type: model.as_str().to_string(),
                force_recompute: true,
            },
            cancel,
        )?;
        Ok(RunModelResponse { learned, ranking })
    }

    /// Compare spread with and without the fixed segments.
    pub fn what_if(&self, request: &WhatIfRequest) -> JamResult<WhatIfResponse> {
        let model = request.model()?;
        if request.fixed_segment_ids.is_empty() {
            return Err(BottleneckError::NoFixedSegments.into());
        }
        let dataset_id = request.dataset_id.as_str();
        let horizon = request.time_horizon_minutes;
        let dataset = self.dataset(dataset_id);
        let seeds = derive_seed_set(
            dataset.history(),
            &dataset.segment_ids(),
            None,
            &self.config.learn,
        );

        let result = (|| -> JamResult<WhatIfReport> {
            let graph = self.diffusion_graph(&dataset, dataset_id, horizon, model)?;
            let params = SimulationParams {
                horizon_minutes: horizon,
                simulations: diffusion::default_simulations(model, &self.config.diffusion),
                rng_seed: self.request_seed(),
            };
            Ok(whatif::compare(
                &graph,
                dataset.graph(),
                &seeds.segments,
                &request.fixed_segment_ids,
                model,
                &params,
                &self.config.diffusion,
                &self.config.selection,
            )?)
        })();
        let report = log_failure(result, dataset_id, horizon, model)?;

        Ok(WhatIfResponse {
            success: true,
            seed_fallback: seeds.fallback,
            report,
        })
    }

    /// Strongest learned influence edges at a horizon.
    pub fn influence_flows(&self, dataset_id: &str, horizon: u32, min_probability: Option<f64>) -> JamResult<FlowsResponse> {
        let dataset = self.dataset(dataset_id);
        let rows = self.store.influence(dataset_id)?;
        let mut config = self.config.flows.clone();
        if let Some(p) = min_probability {
            config.min_probability = p;
        }
        let flows = flows::influence_flows(
            &rows,
            dataset.graph(),
            horizon,
            &config,
            self.config.selection.default_centroid,
        );
        Ok(FlowsResponse {
            success: true,
            count: flows.len(),
            flows,
        })
    }

    /// Outgoing influence of the cached bottlenecks at a horizon.
    pub fn bottleneck_impacts(&self, dataset_id: &str, horizon: u32, bottleneck: Option<SegmentId>) -> JamResult<ImpactsResponse> {
        let dataset = self.dataset(dataset_id);
        let ranking = self
            .cache
            .stored(dataset_id, horizon)?
            .map(|r| r.entries)
            .unwrap_or_default();
        let rows = self.store.influence(dataset_id)?;
        let impacts = flows::bottleneck_impacts(
            &ranking,
            &rows,
            dataset.graph(),
            horizon,
            bottleneck,
            &self.config.flows,
            self.config.selection.default_centroid,
        );
        Ok(ImpactsResponse {
            success: true,
            count: impacts.len(),
            impacts,
        })
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the store handle.
    pub fn store(&self) -> &TieredStore {
        &self.store
    }

    /// Dataset and storage summary.
    pub fn info(&self) -> JamResult<EngineInfo> {
        let mut datasets = Vec::new();
        for id in self.provider.dataset_ids() {
            let Some(dataset) = self.provider.dataset(&id) else {
                continue;
            };
            datasets.push(DatasetInfo {
                influence_rows: self.store.influence(&id)?.len(),
                segments: dataset.graph().segment_count(),
                adjacencies: dataset.graph().adjacency_count(),
                observations: dataset.history().len(),
                id,
            });
        }
        Ok(EngineInfo {
            datasets,
            store_hot_entries: self.store.hot.len(),
            persistent: self.store.is_persistent(),
        })
    }
}

/// Log internal failures with their request context.
fn log_failure<T>(result: JamResult<T>, dataset_id: &str, horizon: u32, model: ModelType) -> JamResult<T> {
    if let Err(ref e) = result {
        if e.is_client_error() {
            tracing::debug!(dataset_id, horizon, %model, error = %e, "request rejected");
        } else {
            tracing::error!(dataset_id, horizon, %model, error = %e, "computation failed");
        }
    }
    result
}

/// Per-dataset counts reported by [`Engine::info`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetInfo {
    pub id: String,
    pub segments: usize,
    pub adjacencies: usize,
    pub observations: usize,
    pub influence_rows: usize,
}

/// Summary information about the engine state.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInfo {
    pub datasets: Vec<DatasetInfo>,
    pub store_hot_entries: usize,
    pub persistent: bool,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "jamspread engine info")?;
        writeln!(f, "  datasets:     {}", self.datasets.len())?;
        for d in &self.datasets {
            writeln!(
                f,
                "    {}: {} segments, {} adjacencies, {} observations, {} influence rows",
                d.id, d.segments, d.adjacencies, d.observations, d.influence_rows
            )?;
        }
        writeln!(f, "  hot entries:  {}", self.store_hot_entries)?;
        writeln!(f, "  persistent:   {}", self.persistent)?;
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("cache", &self.cache)
            .finish()
    }
}
