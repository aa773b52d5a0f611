//! Greedy bottleneck selection.
//!
//! Round `r` scores every remaining candidate `c` by how much the predicted
//! jam count shrinks when `selected ∪ {c}` is removed from the seed set, plus
//! a static-importance term, and keeps the best. A candidate whose
//! removal empties the seed set scores exactly `multiplier × baseline`,
//! with no importance term.
//!
//! Every evaluation reuses the request's RNG seed, so the score of a reduced
//! seed set is a pure function of that set. Scores are memoised by seed set,
//! which also makes the ranking prefix-stable: selecting `K + 1` yields the
//! same first `K` as selecting `K`.

pub mod cache;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::{DiffusionConfig, SelectionConfig};
use crate::diffusion::{self, DiffusionGraph, SimulationParams};
use crate::error::BottleneckError;
use crate::graph::RoadGraph;
use crate::influence::ModelType;
use crate::segment::{Centroid, SegmentId};

/// Result type for selection, caching and what-if operations.
pub type BottleneckResult<T> = std::result::Result<T, BottleneckError>;

/// Seconds since UNIX epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Cooperative cancellation flag shared between a request and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One ranked bottleneck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BottleneckEntry {
    pub segment_id: SegmentId,
    pub display_name: String,
    /// 1-based, in selection order.
    pub rank: usize,
    pub benefit_score: f64,
    pub affected_segment_count: usize,
    pub time_horizon_minutes: u32,
    pub computed_at: u64,
    pub coordinates: Centroid,
}

/// Parameters of one selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionParams {
    pub k: usize,
    pub horizon_minutes: u32,
    pub model: ModelType,
    pub rng_seed: u64,
}

/// Outcome of a greedy selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub entries: Vec<BottleneckEntry>,
    /// False when cancelled or out of time before `k` rounds or exhaustion.
    pub complete: bool,
    /// True when selection stopped because no candidate had positive benefit.
    pub exhausted: bool,
    pub baseline_jam_count: usize,
    /// Distinct seed sets simulated.
    pub simulations_run: usize,
}

/// Greedy selector over one dataset's diffusion graph.
pub struct GreedySelector<'a> {
    graph: &'a DiffusionGraph,
    road: &'a RoadGraph,
    diffusion: &'a DiffusionConfig,
    selection: &'a SelectionConfig,
}

impl<'a> GreedySelector<'a> {
    pub fn new(
        graph: &'a DiffusionGraph,
        road: &'a RoadGraph,
        diffusion: &'a DiffusionConfig,
        selection: &'a SelectionConfig,
    ) -> Self {
        Self {
            graph,
            road,
            diffusion,
            selection,
        }
    }

    fn sim_params(&self, params: &SelectionParams) -> SimulationParams {
        SimulationParams {
            horizon_minutes: params.horizon_minutes,
            simulations: self.selection.greedy_simulations,
            rng_seed: params.rng_seed,
        }
    }

    /// Rank up to `k` bottlenecks for the given seed set.
    pub fn select(
        &self,
        seeds: &[SegmentId],
        params: &SelectionParams,
        cancel: &CancellationToken,
    ) -> BottleneckResult<Selection> {
        if params.k == 0 {
            return Err(BottleneckError::ZeroK);
        }
        let sim = self.sim_params(params);
        let deadline = self
            .selection
            .time_budget_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let interrupted = || cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d);

        let mut memo: HashMap<Vec<SegmentId>, usize> = HashMap::new();
        let mut jam_count = |reduced: &[SegmentId]| -> BottleneckResult<usize> {
            let mut key = reduced.to_vec();
            key.sort_unstable();
            if let Some(&count) = memo.get(&key) {
                return Ok(count);
            }
            let count =
                diffusion::simulate(self.graph, params.model, reduced, &sim, self.diffusion)?
                    .jam_count();
            memo.insert(key, count);
            Ok(count)
        };

        let baseline = jam_count(seeds)?;
        let segments = self.road.segments();
        let importance: HashMap<SegmentId, f64> = segments
            .iter()
            .map(|s| {
                let value = s.importance(
                    self.selection.default_length_meters,
                    self.selection.default_capacity,
                );
                (s.id, value)
            })
            .collect();

        let mut selected: Vec<(SegmentId, f64)> = Vec::new();
        let mut removed: HashSet<SegmentId> = HashSet::new();
        let mut selected_importance = 0.0;
        let mut complete = true;
        let mut exhausted = false;

        'rounds: for round in 1..=params.k {
            let mut best: Option<(SegmentId, f64)> = None;
            let mut best_benefit = 0.0;
            let mut evaluated = 0usize;

            for segment in &segments {
                let candidate = segment.id;
                if removed.contains(&candidate) {
                    continue;
                }
                if interrupted() {
                    complete = false;
                    break 'rounds;
                }
                evaluated += 1;

                let reduced: Vec<SegmentId> = seeds
                    .iter()
                    .copied()
                    .filter(|s| *s != candidate && !removed.contains(s))
                    .collect();
                let benefit = if reduced.is_empty() {
                    self.selection.all_seeds_fixed_multiplier * baseline as f64
                } else {
                    let importance_term = (selected_importance + importance[&candidate])
                        / self.selection.importance_scale;
                    baseline as f64 - jam_count(&reduced)? as f64 + importance_term
                };
                if benefit > best_benefit {
                    best_benefit = benefit;
                    best = Some((candidate, benefit));
                }
            }

            let Some((winner, benefit)) = best else {
                exhausted = true;
                tracing::debug!(round, evaluated, "no candidate with positive benefit");
                break;
            };
            tracing::debug!(round, evaluated, %winner, benefit, "greedy round");
            removed.insert(winner);
            selected_importance += importance[&winner];
            selected.push((winner, benefit));
        }
        if !complete {
            tracing::warn!(
                selected = selected.len(),
                k = params.k,
                "selection interrupted, returning partial ranking"
            );
        }

        let affected = if cancel.is_cancelled() {
            vec![0; selected.len()]
        } else {
            self.affected_counts(seeds, &selected, &sim, params.model)?
        };

        let computed_at = unix_now();
        let entries = selected
            .iter()
            .zip(affected)
            .enumerate()
            .map(|(i, (&(segment_id, benefit_score), affected_segment_count))| {
                let segment = self.road.segment(segment_id);
                BottleneckEntry {
                    segment_id,
                    display_name: segment
                        .as_ref()
                        .map_or_else(|| segment_id.to_string(), |s| s.display_name.clone()),
                    rank: i + 1,
                    benefit_score,
                    affected_segment_count,
                    time_horizon_minutes: params.horizon_minutes,
                    computed_at,
                    coordinates: segment
                        .and_then(|s| s.centroid)
                        .unwrap_or(self.selection.default_centroid),
                }
            })
            .collect();

        Ok(Selection {
            entries,
            complete,
            exhausted,
            baseline_jam_count: baseline,
            simulations_run: memo.len(),
        })
    }

    /// Segments above the affected threshold in the baseline that drop below
    /// it when one selected segment alone is removed from the seeds.
    fn affected_counts(
        &self,
        seeds: &[SegmentId],
        selected: &[(SegmentId, f64)],
        sim: &SimulationParams,
        model: ModelType,
    ) -> BottleneckResult<Vec<usize>> {
        if selected.is_empty() {
            return Ok(Vec::new());
        }
        let threshold = self.selection.affected_threshold;
        let baseline = diffusion::simulate(self.graph, model, seeds, sim, self.diffusion)?
            .segments_at_least(threshold);

        selected
            .iter()
            .map(|&(segment, _)| {
                if !seeds.contains(&segment) {
                    // Same seeds, same draws: nothing disappears.
                    return Ok(0);
                }
                let reduced: Vec<SegmentId> =
                    seeds.iter().copied().filter(|s| *s != segment).collect();
                if reduced.is_empty() {
                    return Ok(baseline.len());
                }
                let remaining = diffusion::simulate(self.graph, model, &reduced, sim, self.diffusion)?
                    .segments_at_least(threshold);
                Ok(baseline.difference(&remaining).count())
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::influence::InfluenceTable;
    use crate::segment::RoadSegment;

    pub(crate) fn seg(id: u64) -> SegmentId {
        SegmentId::new(id).unwrap()
    }

    /// A -> B (0.8) -> C (0.6).
    pub(crate) fn chain_road() -> RoadGraph {
        let road = RoadGraph::new();
        road.insert_segment(RoadSegment::new(seg(1), "A").with_centroid(1.30, 103.80))
            .unwrap();
        road.insert_segment(RoadSegment::new(seg(2), "B").with_size(400.0, 1800.0))
            .unwrap();
        road.insert_segment(RoadSegment::new(seg(3), "C")).unwrap();
        road
    }

    pub(crate) fn chain_table() -> InfluenceTable {
        InfluenceTable::from_edges([(seg(1), seg(2), 0.8), (seg(2), seg(3), 0.6)])
    }

    /// Two independent chains: 1 -> 2 -> 3 and 4 -> 5, plus isolated 6.
    fn forked() -> (RoadGraph, InfluenceTable) {
        let road = RoadGraph::new();
        for id in 1..=6 {
            road.insert_segment(RoadSegment::new(seg(id), format!("S{id}"))).unwrap();
        }
        let table = InfluenceTable::from_edges([
            (seg(1), seg(2), 0.9),
            (seg(2), seg(3), 0.9),
            (seg(4), seg(5), 0.7),
        ]);
        (road, table)
    }

    fn params(k: usize, model: ModelType) -> SelectionParams {
        SelectionParams {
            k,
            horizon_minutes: 30,
            model,
            rng_seed: 2024,
        }
    }

    fn run(
        road: &RoadGraph,
        table: &InfluenceTable,
        seeds: &[SegmentId],
        params: &SelectionParams,
    ) -> Selection {
        let graph = DiffusionGraph::build(road, table).unwrap();
        let diffusion = DiffusionConfig::default();
        let selection = SelectionConfig::default();
        GreedySelector::new(&graph, road, &diffusion, &selection)
            .select(seeds, params, &CancellationToken::new())
            .unwrap()
    }

    #[test]
    fn single_seed_chain_picks_the_seed() {
        let road = chain_road();
        let s = run(&road, &chain_table(), &[seg(1)], &params(1, ModelType::Lim));
        assert_eq!(s.entries.len(), 1);
        let top = &s.entries[0];
        assert_eq!(top.segment_id, seg(1));
        assert_eq!(top.rank, 1);
        assert_eq!(top.display_name, "A");
        assert_eq!(top.benefit_score, 10.0 * s.baseline_jam_count as f64);
        assert_eq!(top.coordinates, Centroid { lat: 1.30, lon: 103.80 });
        assert!(s.complete);
    }

    #[test]
    fn ltm_chain_picks_the_seed() {
        let road = chain_road();
        let s = run(&road, &chain_table(), &[seg(1)], &params(1, ModelType::Ltm));
        assert_eq!(s.baseline_jam_count, 3);
        assert_eq!(s.entries[0].segment_id, seg(1));
        assert_eq!(s.entries[0].affected_segment_count, 3);
    }

    #[test]
    fn larger_k_extends_the_same_prefix() {
        let (road, table) = forked();
        let seeds = [seg(1), seg(4)];
        let three = run(&road, &table, &seeds, &params(3, ModelType::Lim));
        let four = run(&road, &table, &seeds, &params(4, ModelType::Lim));
        let ids = |s: &Selection| s.entries.iter().map(|e| e.segment_id).collect::<Vec<_>>();
        assert_eq!(ids(&three)[..], ids(&four)[..three.entries.len()]);
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let (road, table) = forked();
        let seeds = [seg(1), seg(4)];
        let a = run(&road, &table, &seeds, &params(3, ModelType::Sir));
        let b = run(&road, &table, &seeds, &params(3, ModelType::Sir));
        let strip = |s: &Selection| {
            s.entries
                .iter()
                .map(|e| (e.segment_id, e.rank, e.benefit_score, e.affected_segment_count))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(&a), strip(&b));
    }

    #[test]
    fn larger_cascade_ranks_first() {
        let (road, table) = forked();
        let s = run(&road, &table, &[seg(1), seg(4)], &params(2, ModelType::Ltm));
        // Removing 1 saves three segments, removing 4 saves two; each
        // default-sized segment adds 1.0 of importance.
        assert_eq!(s.entries[0].segment_id, seg(1));
        assert_eq!(s.entries[0].benefit_score, 4.0);
        // Removing both empties the seed set: 10 x a baseline of five, no
        // importance on top.
        assert_eq!(s.baseline_jam_count, 5);
        assert_eq!(s.entries[1].segment_id, seg(4));
        assert_eq!(s.entries[1].benefit_score, 50.0);
    }

    #[test]
    fn zero_k_is_rejected() {
        let road = chain_road();
        let graph = DiffusionGraph::build(&road, &chain_table()).unwrap();
        let (d, sel) = (DiffusionConfig::default(), SelectionConfig::default());
        let err = GreedySelector::new(&graph, &road, &d, &sel)
            .select(&[seg(1)], &params(0, ModelType::Lim), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, BottleneckError::ZeroK));
    }

    #[test]
    fn cancelled_selection_is_partial() {
        let road = chain_road();
        let graph = DiffusionGraph::build(&road, &chain_table()).unwrap();
        let (d, sel) = (DiffusionConfig::default(), SelectionConfig::default());
        let token = CancellationToken::new();
        token.cancel();
        let s = GreedySelector::new(&graph, &road, &d, &sel)
            .select(&[seg(1)], &params(2, ModelType::Lim), &token)
            .unwrap();
        assert!(!s.complete);
        assert!(s.entries.is_empty());
    }

    #[test]
    fn candidates_run_out_before_k() {
        let road = chain_road();
        let s = run(&road, &chain_table(), &[seg(1)], &params(10, ModelType::Ltm));
        assert!(s.entries.len() <= 3);
        assert!(s.complete);
        assert!(s.exhausted);
    }
}
