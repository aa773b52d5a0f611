//! Jam diffusion simulators.
//!
//! All four models share one contract: given a [`DiffusionGraph`] (segments
//! plus learned influence edges for one horizon) and a seed set of already
//! jammed segments, produce a jam probability per segment. Segments that end
//! at zero are left out of the result.
//!
//! - [`cascade`]: independent cascade, Monte Carlo (`LIM`)
//! - [`threshold`]: linear threshold fixpoint, deterministic (`LTM`)
//! - [`epidemic`]: susceptible-infected-recovered / -susceptible (`SIR`, `SIS`)
//!
//! Monte Carlo trials fan out over rayon. Each trial owns an RNG seeded from
//! the request seed and its trial index, so a fixed request seed gives the
//! same answer on any number of threads.

pub mod cascade;
pub mod epidemic;
pub mod threshold;

use std::collections::{HashMap, HashSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::DiffusionConfig;
use crate::error::DiffusionError;
use crate::graph::RoadGraph;
use crate::influence::{InfluenceTable, ModelType};
use crate::segment::SegmentId;

/// Result type for diffusion operations.
pub type DiffusionResult<T> = std::result::Result<T, DiffusionError>;

/// Qualitative risk derived from a jam probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn from_probability(probability: f64, config: &DiffusionConfig) -> Self {
        if probability >= config.risk_high {
            RiskLevel::High
        } else if probability >= config.risk_medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// One segment's predicted jam probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub segment_id: SegmentId,
    pub display_name: String,
    pub jam_probability: f64,
    pub risk_level: RiskLevel,
}

/// Output of one simulator invocation. Transient: consumed and dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Diffusion {
    pub model: ModelType,
    /// Trials run; `None` for the deterministic threshold model.
    pub simulations: Option<usize>,
    /// Sorted by probability descending, then segment id.
    pub predictions: Vec<Prediction>,
}

impl Diffusion {
    /// Segments with a non-zero probability.
    pub fn jam_count(&self) -> usize {
        self.predictions.len()
    }

    /// Segments at or above `threshold`.
    pub fn count_at_least(&self, threshold: f64) -> usize {
        self.predictions
            .iter()
            .filter(|p| p.jam_probability >= threshold)
            .count()
    }

    pub fn segments_at_least(&self, threshold: f64) -> HashSet<SegmentId> {
        self.predictions
            .iter()
            .filter(|p| p.jam_probability >= threshold)
            .map(|p| p.segment_id)
            .collect()
    }

    pub fn probability_of(&self, segment: SegmentId) -> f64 {
        self.predictions
            .iter()
            .find(|p| p.segment_id == segment)
            .map_or(0.0, |p| p.jam_probability)
    }

    pub fn probabilities(&self) -> HashMap<SegmentId, f64> {
        self.predictions
            .iter()
            .map(|p| (p.segment_id, p.jam_probability))
            .collect()
    }
}

/// Per-call simulation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationParams {
    pub horizon_minutes: u32,
    /// Monte Carlo trials. Ignored by the threshold model.
    pub simulations: usize,
    /// Base seed; trial `i` draws from a stream derived from `(rng_seed, i)`.
    pub rng_seed: u64,
}

/// Dense, index-based view of the influence network for one horizon.
///
/// Node order follows the road graph, so indices are stable for a dataset.
#[derive(Debug, Clone)]
pub struct DiffusionGraph {
    nodes: Vec<SegmentId>,
    names: Vec<String>,
    index: HashMap<SegmentId, usize>,
    /// `(from, to, probability)`.
    edges: Vec<(usize, usize, f64)>,
    /// Per node: `(target, edge index)`.
    outgoing: Vec<Vec<(usize, usize)>>,
    /// Per node: `(source, probability)`.
    incoming: Vec<Vec<(usize, f64)>>,
}

impl DiffusionGraph {
    /// Combine the road graph's segments with a horizon's influence edges.
    ///
    /// Fails when an influence edge cannot be simulated: unknown endpoint,
    /// self-loop, or a probability outside [0, 1].
    pub fn build(graph: &RoadGraph, table: &InfluenceTable) -> DiffusionResult<Self> {
        let segments = graph.segments();
        let nodes: Vec<SegmentId> = segments.iter().map(|s| s.id).collect();
        let names: Vec<String> = segments.into_iter().map(|s| s.display_name).collect();
        let index: HashMap<SegmentId, usize> =
            nodes.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let mut edges = Vec::with_capacity(table.len());
        let mut outgoing = vec![Vec::new(); nodes.len()];
        let mut incoming = vec![Vec::new(); nodes.len()];

        for &(from, to, probability) in table.edges() {
            let malformed = |reason: &str| DiffusionError::MalformedEdge {
                from: from.get(),
                to: to.get(),
                reason: reason.to_string(),
            };
            if from == to {
                return Err(malformed("self-loop"));
            }
            if !(0.0..=1.0).contains(&probability) {
                return Err(malformed("probability outside [0, 1]"));
            }
            let (Some(&u), Some(&v)) = (index.get(&from), index.get(&to)) else {
                return Err(malformed("endpoint not in road graph"));
            };
            let e = edges.len();
            edges.push((u, v, probability));
            outgoing[u].push((v, e));
            incoming[v].push((u, probability));
        }

        Ok(Self {
            nodes,
            names,
            index,
            edges,
            outgoing,
            incoming,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn segment(&self, node: usize) -> SegmentId {
        self.nodes[node]
    }

    pub fn edges(&self) -> &[(usize, usize, f64)] {
        &self.edges
    }

    pub fn outgoing(&self, node: usize) -> &[(usize, usize)] {
        &self.outgoing[node]
    }

    pub fn incoming(&self, node: usize) -> &[(usize, f64)] {
        &self.incoming[node]
    }

    /// Map seed segments to node indices, rejecting unknown ones.
    pub fn seed_indices(&self, seeds: &[SegmentId]) -> DiffusionResult<Vec<usize>> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(seeds.len());
        for &seed in seeds {
            let idx = *self.index.get(&seed).ok_or(DiffusionError::UnknownSeed {
                segment_id: seed.get(),
            })?;
            if seen.insert(idx) {
                out.push(idx);
            }
        }
        Ok(out)
    }
}

/// A diffusion model over a [`DiffusionGraph`].
pub trait DiffusionModel: Send + Sync {
    fn model_type(&self) -> ModelType;

    /// Jam probability for every node, indexed like the graph.
    fn simulate(&self, graph: &DiffusionGraph, seeds: &[usize], params: &SimulationParams)
    -> Vec<f64>;
}

/// The simulator implementing `model` with the configured parameters.
pub fn model_for(model: ModelType, config: &DiffusionConfig) -> Box<dyn DiffusionModel> {
    match model {
        ModelType::Lim => Box::new(cascade::IndependentCascade::new(config.max_rounds)),
        ModelType::Ltm => Box::new(threshold::LinearThreshold::new(
            config.ltm_threshold,
            config.max_rounds,
        )),
        ModelType::Sir => Box::new(epidemic::Epidemic::sir(config)),
        ModelType::Sis => Box::new(epidemic::Epidemic::sis(config)),
    }
}

/// Trials a model runs when the caller does not say.
pub fn default_simulations(model: ModelType, config: &DiffusionConfig) -> usize {
    match model {
        ModelType::Lim | ModelType::Ltm => config.default_simulations,
        ModelType::Sir | ModelType::Sis => config.epidemic_simulations,
    }
}

/// Run one simulator invocation and shape its output.
pub fn simulate(
    graph: &DiffusionGraph,
    model: ModelType,
    seeds: &[SegmentId],
    params: &SimulationParams,
    config: &DiffusionConfig,
) -> DiffusionResult<Diffusion> {
    if params.simulations == 0 && model.is_stochastic() {
        return Err(DiffusionError::ZeroSimulations);
    }
    let seed_nodes = graph.seed_indices(seeds)?;
    let probabilities = model_for(model, config).simulate(graph, &seed_nodes, params);

    let mut predictions: Vec<Prediction> = probabilities
        .iter()
        .enumerate()
        .filter(|&(_, &p)| p > 0.0)
        .map(|(node, &p)| {
            let jam_probability = p.clamp(0.0, 1.0);
            Prediction {
                segment_id: graph.nodes[node],
                display_name: graph.names[node].clone(),
                jam_probability,
                risk_level: RiskLevel::from_probability(jam_probability, config),
            }
        })
        .collect();
    predictions.sort_by(|a, b| {
        b.jam_probability
            .partial_cmp(&a.jam_probability)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.segment_id.cmp(&b.segment_id))
    });

    Ok(Diffusion {
        model,
        simulations: model.is_stochastic().then_some(params.simulations),
        predictions,
    })
}

/// Seed for trial `trial` of a request seeded with `base`.
pub(crate) fn trial_seed(base: u64, trial: usize) -> u64 {
    // splitmix64 finalizer over the pair
    let mut z = base ^ (trial as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Fan `trials` independent runs out over rayon and reduce their counters.
///
/// Each run adds integer counts into a per-node accumulator; the sum over
/// all runs is divided by `trials * per_trial_scale`. Integer accumulation
/// keeps the result independent of how rayon splits the work.
pub(crate) fn monte_carlo<F>(
    node_count: usize,
    params: &SimulationParams,
    per_trial_scale: u64,
    trial: F,
) -> Vec<f64>
where
    F: Fn(&mut StdRng, &mut [u64]) + Sync,
{
    let trials = params.simulations;
    if trials == 0 || node_count == 0 {
        return vec![0.0; node_count];
    }
    let counts = (0..trials)
        .into_par_iter()
        .fold(
            || vec![0u64; node_count],
            |mut acc, i| {
                let mut rng = StdRng::seed_from_u64(trial_seed(params.rng_seed, i));
                trial(&mut rng, &mut acc[..]);
                acc
            },
        )
        .reduce(
            || vec![0u64; node_count],
            |mut a, b| {
                a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
                a
            },
        );
    let denom = trials as f64 * per_trial_scale.max(1) as f64;
    counts.into_iter().map(|c| c as f64 / denom).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::segment::RoadSegment;

    pub(crate) fn seg(id: u64) -> SegmentId {
        SegmentId::new(id).unwrap()
    }

    /// A -> B (0.8) -> C (0.6), segments 1, 2, 3.
    pub(crate) fn chain() -> DiffusionGraph {
        let road = RoadGraph::new();
        for (id, name) in [(1, "A"), (2, "B"), (3, "C")] {
            road.insert_segment(RoadSegment::new(seg(id), name)).unwrap();
        }
        let table = InfluenceTable::from_edges([(seg(1), seg(2), 0.8), (seg(2), seg(3), 0.6)]);
        DiffusionGraph::build(&road, &table).unwrap()
    }

    pub(crate) fn params(simulations: usize, rng_seed: u64) -> SimulationParams {
        SimulationParams {
            horizon_minutes: 30,
            simulations,
            rng_seed,
        }
    }

    #[test]
    fn risk_levels() {
        let c = DiffusionConfig::default();
        assert_eq!(RiskLevel::from_probability(0.7, &c), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.3, &c), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.29, &c), RiskLevel::Low);
    }

    #[test]
    fn build_rejects_malformed_edges() {
        let road = RoadGraph::new();
        road.insert_segment(RoadSegment::new(seg(1), "A")).unwrap();
        road.insert_segment(RoadSegment::new(seg(2), "B")).unwrap();

        let unknown = InfluenceTable::from_edges([(seg(1), seg(9), 0.5)]);
        assert!(matches!(
            DiffusionGraph::build(&road, &unknown),
            Err(DiffusionError::MalformedEdge { to: 9, .. })
        ));
        let nan = InfluenceTable::from_edges([(seg(1), seg(2), f64::NAN)]);
        assert!(DiffusionGraph::build(&road, &nan).is_err());
        let looped = InfluenceTable::from_edges([(seg(2), seg(2), 0.5)]);
        assert!(DiffusionGraph::build(&road, &looped).is_err());
    }

    #[test]
    fn unknown_seed_rejected() {
        let g = chain();
        let err = simulate(
            &g,
            ModelType::Lim,
            &[seg(42)],
            &params(10, 1),
            &DiffusionConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DiffusionError::UnknownSeed { segment_id: 42 }));
    }

    #[test]
    fn duplicate_seeds_collapse() {
        let g = chain();
        assert_eq!(g.seed_indices(&[seg(1), seg(1), seg(2)]).unwrap(), vec![0, 1]);
    }

    #[test]
    fn empty_seed_set_predicts_nothing() {
        let g = chain();
        for model in ModelType::ALL {
            let d = simulate(&g, model, &[], &params(20, 3), &DiffusionConfig::default()).unwrap();
            assert!(d.predictions.is_empty(), "{model} predicted from no seeds");
        }
    }

    #[test]
    fn predictions_sorted_and_bounded() {
        let g = chain();
        let d = simulate(
            &g,
            ModelType::Lim,
            &[seg(1)],
            &params(200, 11),
            &DiffusionConfig::default(),
        )
        .unwrap();
        assert_eq!(d.simulations, Some(200));
        assert_eq!(d.predictions[0].segment_id, seg(1));
        assert_eq!(d.predictions[0].display_name, "A");
        for w in d.predictions.windows(2) {
            assert!(w[0].jam_probability >= w[1].jam_probability);
        }
        assert!(d
            .predictions
            .iter()
            .all(|p| p.jam_probability > 0.0 && p.jam_probability <= 1.0));
    }

    #[test]
    fn zero_simulations_rejected_for_stochastic_models() {
        let g = chain();
        let c = DiffusionConfig::default();
        assert!(matches!(
            simulate(&g, ModelType::Sir, &[seg(1)], &params(0, 1), &c),
            Err(DiffusionError::ZeroSimulations)
        ));
        assert!(simulate(&g, ModelType::Ltm, &[seg(1)], &params(0, 1), &c).is_ok());
    }

    #[test]
    fn trial_seeds_differ() {
        let seeds: HashSet<u64> = (0..1000).map(|i| trial_seed(7, i)).collect();
        assert_eq!(seeds.len(), 1000);
    }

    #[test]
    fn monte_carlo_is_thread_independent() {
        let p = params(64, 5);
        let run = || {
            monte_carlo(4, &p, 1, |rng, acc| {
                use rand::Rng;
                for slot in acc.iter_mut() {
                    if rng.r#gen::<f64>() < 0.5 {
                        *slot += 1;
                    }
                }
            })
        };
        assert_eq!(run(), run());
    }
}
