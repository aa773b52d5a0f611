//! Influence probability learner.
//!
//! For an adjacency `u -> v` and horizon `h`, every instant at which `u` was
//! jammed is one trial; the trial succeeds when `v` is jammed at some instant
//! in `[t, t + h]`. The estimate is successes / trials. Edges whose upstream
//! segment never jammed produce no row.

use rayon::prelude::*;

use crate::config::LearnConfig;
use crate::dataset::Dataset;
use crate::error::LearnError;
use crate::segment::DirectedAdjacency;

use super::{ConfidenceTier, InfluenceProbability, ModelType};

pub type LearnResult<T> = std::result::Result<T, LearnError>;

/// Row counts produced by one learning pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnSummary {
    pub total_learned: usize,
    /// `(horizon, rows)` in request order.
    pub per_horizon: Vec<(u32, usize)>,
}

/// Estimate influence probabilities for every adjacency and horizon.
pub fn learn_probabilities(
    dataset: &Dataset,
    horizons: &[u32],
    model: ModelType,
    config: &LearnConfig,
) -> LearnResult<(Vec<InfluenceProbability>, LearnSummary)> {
    if horizons.is_empty() {
        return Err(LearnError::NoHorizons);
    }
    if let Some(&minutes) = horizons.iter().find(|&&h| h == 0) {
        return Err(LearnError::ZeroHorizon { minutes });
    }

    let adjacencies = dataset.graph().adjacencies();
    let mut rows = Vec::new();
    let mut per_horizon = Vec::with_capacity(horizons.len());

    for &horizon in horizons {
        let learned: Vec<InfluenceProbability> = adjacencies
            .par_iter()
            .filter_map(|adj| estimate_edge(dataset, adj, horizon, model, config))
            .collect();
        tracing::info!(horizon, learned = learned.len(), "learned influence probabilities");
        per_horizon.push((horizon, learned.len()));
        rows.extend(learned);
    }

    let summary = LearnSummary {
        total_learned: rows.len(),
        per_horizon,
    };
    Ok((rows, summary))
}

fn estimate_edge(
    dataset: &Dataset,
    adj: &DirectedAdjacency,
    horizon: u32,
    model: ModelType,
    config: &LearnConfig,
) -> Option<InfluenceProbability> {
    let history = dataset.history();
    let upstream = history.jammed_instants(adj.from_segment_id, config.jam_threshold);
    if upstream.is_empty() {
        return None;
    }
    let downstream = history.jammed_instants(adj.to_segment_id, config.jam_threshold);
    let window = u64::from(horizon) * 60;

    let followed = upstream
        .iter()
        .filter(|&&t| {
            let next = downstream.partition_point(|&d| d < t);
            downstream
                .get(next)
                .is_some_and(|&d| d <= t.saturating_add(window))
        })
        .count();

    let trials = upstream.len();
    let samples = u32::try_from(trials).unwrap_or(u32::MAX);
    Some(InfluenceProbability {
        from_segment_id: adj.from_segment_id,
        to_segment_id: adj.to_segment_id,
        time_horizon_minutes: horizon,
        probability: (followed as f64 / trials as f64).clamp(0.0, 1.0),
        model_type: model,
        confidence: ConfidenceTier::from_samples(
            samples,
            config.confidence_high_samples,
            config.confidence_medium_samples,
        ),
        sample_count: samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::CongestionObservation;
    use crate::segment::{RoadSegment, SegmentId};

    fn seg(id: u64) -> SegmentId {
        SegmentId::new(id).unwrap()
    }

    fn obs(id: u64, minute: u64, index: f64) -> CongestionObservation {
        CongestionObservation::new(seg(id), minute * 60, index)
    }

    /// A jams at minutes 0, 10, 20, 30; B follows within 5 minutes after the
    /// first two only, and 12 minutes after the third.
    fn dataset() -> Dataset {
        let segments = vec![
            RoadSegment::new(seg(1), "A"),
            RoadSegment::new(seg(2), "B"),
            RoadSegment::new(seg(3), "C"),
        ];
        let adjacencies = vec![
            DirectedAdjacency::new(seg(1), seg(2), 100.0),
            DirectedAdjacency::new(seg(2), seg(3), 100.0),
            DirectedAdjacency::new(seg(3), seg(1), 100.0),
        ];
        let observations = vec![
            obs(1, 0, 0.9),
            obs(1, 10, 0.8),
            obs(1, 20, 0.75),
            obs(1, 30, 0.7),
            obs(1, 40, 0.2),
            obs(2, 5, 0.9),
            obs(2, 15, 0.85),
            obs(2, 32, 0.8),
            obs(2, 50, 0.3),
            obs(3, 0, 0.1),
            obs(3, 40, 0.2),
        ];
        Dataset::build(segments, &adjacencies, observations).unwrap()
    }

    fn prob(rows: &[InfluenceProbability], from: u64, to: u64, horizon: u32) -> Option<f64> {
        rows.iter()
            .find(|r| {
                r.from_segment_id == seg(from)
                    && r.to_segment_id == seg(to)
                    && r.time_horizon_minutes == horizon
            })
            .map(|r| r.probability)
    }

    #[test]
    fn conditional_frequency_per_horizon() {
        let (rows, summary) =
            learn_probabilities(&dataset(), &[5, 15], ModelType::Lim, &LearnConfig::default())
                .unwrap();
        // 5 min: B follows A at 0 and 10, and at 30 (B jammed at 32).
        assert_eq!(prob(&rows, 1, 2, 5), Some(0.75));
        // 15 min: additionally A at 20 -> B at 32.
        assert_eq!(prob(&rows, 1, 2, 15), Some(1.0));
        // B jams three times, C never.
        assert_eq!(prob(&rows, 2, 3, 5), Some(0.0));
        // C never jams: no row.
        assert_eq!(prob(&rows, 3, 1, 5), None);
        assert_eq!(summary.total_learned, 4);
        assert_eq!(summary.per_horizon, vec![(5, 2), (15, 2)]);
    }

    #[test]
    fn confidence_follows_sample_count() {
        let (rows, _) =
            learn_probabilities(&dataset(), &[5], ModelType::Lim, &LearnConfig::default())
                .unwrap();
        let a_to_b = rows.iter().find(|r| r.from_segment_id == seg(1)).unwrap();
        assert_eq!(a_to_b.sample_count, 4);
        assert_eq!(a_to_b.confidence, ConfidenceTier::Low);
        assert_eq!(a_to_b.model_type, ModelType::Lim);
    }

    #[test]
    fn probabilities_are_bounded() {
        let (rows, _) = learn_probabilities(
            &dataset(),
            &[1, 5, 15, 30, 120],
            ModelType::Ltm,
            &LearnConfig::default(),
        )
        .unwrap();
        assert!(rows.iter().all(|r| (0.0..=1.0).contains(&r.probability)));
    }

    #[test]
    fn unobserved_segments_contribute_nothing() {
        let segments = vec![RoadSegment::new(seg(1), "A"), RoadSegment::new(seg(2), "B")];
        let adjacencies = vec![DirectedAdjacency::new(seg(1), seg(2), 10.0)];
        let d = Dataset::build(segments, &adjacencies, vec![]).unwrap();
        let (rows, summary) =
            learn_probabilities(&d, &[30], ModelType::Lim, &LearnConfig::default()).unwrap();
        assert!(rows.is_empty());
        assert_eq!(summary.total_learned, 0);
    }

    #[test]
    fn horizons_are_validated() {
        let d = dataset();
        let config = LearnConfig::default();
        assert!(matches!(
            learn_probabilities(&d, &[], ModelType::Lim, &config),
            Err(LearnError::NoHorizons)
        ));
        assert!(matches!(
            learn_probabilities(&d, &[5, 0], ModelType::Lim, &config),
            Err(LearnError::ZeroHorizon { minutes: 0 })
        ));
    }
}
