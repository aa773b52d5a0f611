//! Counterfactual comparison: how much spread disappears if some segments
//! are fixed.
//!
//! Both scenarios run with the same simulation seed. Under the independent
//! cascade and threshold models the counterfactual can then only jam a subset
//! of what the baseline jams, so every reported reduction is positive. The
//! epidemic models carry no such guarantee.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::bottleneck::BottleneckResult;
use crate::config::{DiffusionConfig, SelectionConfig};
use crate::diffusion::{self, DiffusionGraph, SimulationParams};
use crate::error::BottleneckError;
use crate::graph::RoadGraph;
use crate::influence::ModelType;
use crate::segment::SegmentId;

/// A segment whose jam probability drops when the fixed segments are fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedSegment {
    pub segment_id: SegmentId,
    pub display_name: String,
    pub baseline_probability: f64,
    pub fixed_probability: f64,
    pub reduction: f64,
}

/// Result of one what-if comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatIfReport {
    /// Names of the fixed segments that exist in the road graph.
    pub fixed_segment_names: Vec<String>,
    /// Sum of all reported reductions.
    pub total_benefit: f64,
    /// Sorted by reduction, largest first.
    pub affected_segments: Vec<AffectedSegment>,
    pub baseline_jam_count: usize,
    pub fixed_jam_count: usize,
}

/// Compare spread from `seeds` against spread from `seeds \ fixed`.
#[allow(clippy::too_many_arguments)]
pub fn compare(
    graph: &DiffusionGraph,
    road: &RoadGraph,
    seeds: &[SegmentId],
    fixed: &[SegmentId],
    model: ModelType,
    params: &SimulationParams,
    diffusion_config: &DiffusionConfig,
    selection_config: &SelectionConfig,
) -> BottleneckResult<WhatIfReport> {
    if fixed.is_empty() {
        return Err(BottleneckError::NoFixedSegments);
    }
    let fixed_set: HashSet<SegmentId> = fixed.iter().copied().collect();
    let fixed_segment_names = fixed
        .iter()
        .filter_map(|id| road.segment(*id))
        .map(|s| s.display_name)
        .collect();

    let remaining: Vec<SegmentId> = seeds
        .iter()
        .copied()
        .filter(|s| !fixed_set.contains(s))
        .collect();
    let baseline = diffusion::simulate(graph, model, seeds, params, diffusion_config)?;
    let counterfactual = diffusion::simulate(graph, model, &remaining, params, diffusion_config)?;
    let after = counterfactual.probabilities();

    let mut affected_segments: Vec<AffectedSegment> = baseline
        .predictions
        .iter()
        .filter_map(|p| {
            let fixed_probability = after.get(&p.segment_id).copied().unwrap_or(0.0);
            let reduction = p.jam_probability - fixed_probability;
            (reduction > selection_config.whatif_significance).then(|| AffectedSegment {
                segment_id: p.segment_id,
                display_name: p.display_name.clone(),
                baseline_probability: p.jam_probability,
                fixed_probability,
                reduction,
            })
        })
        .collect();
    affected_segments.sort_by(|a, b| {
        b.reduction
            .partial_cmp(&a.reduction)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.segment_id.cmp(&b.segment_id))
    });

    let total_benefit = affected_segments.iter().map(|a| a.reduction).sum();
    let threshold = selection_config.whatif_jam_threshold;
    let report = WhatIfReport {
        fixed_segment_names,
        total_benefit,
        affected_segments,
        baseline_jam_count: baseline.count_at_least(threshold),
        fixed_jam_count: counterfactual.count_at_least(threshold),
    };
    tracing::info!(
        %model,
        fixed = fixed.len(),
        affected = report.affected_segments.len(),
        total_benefit = report.total_benefit,
        "what-if comparison"
    );
    Ok(report)
}
