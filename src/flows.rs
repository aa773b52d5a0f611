//! Map overlays: strongest influence edges and what each bottleneck pushes
//! congestion into.
//!
//! Both listings read the learned influence rows directly; no simulation runs.
//! Edges whose endpoints are not in the road graph are skipped.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::bottleneck::BottleneckEntry;
use crate::config::FlowConfig;
use crate::graph::RoadGraph;
use crate::influence::{ConfidenceTier, InfluenceProbability};
use crate::segment::{Centroid, SegmentId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluenceFlow {
    pub from_segment_id: SegmentId,
    pub to_segment_id: SegmentId,
    pub probability: f64,
    pub confidence: ConfidenceTier,
    pub from_name: String,
    pub to_name: String,
    pub from_coords: Centroid,
    pub to_coords: Centroid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BottleneckImpact {
    pub bottleneck_id: SegmentId,
    pub bottleneck_name: String,
    pub bottleneck_coords: Centroid,
    pub rank: usize,
    pub affected_id: SegmentId,
    pub affected_name: String,
    pub affected_coords: Centroid,
    pub probability: f64,
}

/// Rows at `horizon`, strongest first, one per edge.
fn strongest_edges(rows: &[InfluenceProbability], horizon: u32) -> Vec<&InfluenceProbability> {
    let mut at_horizon: Vec<&InfluenceProbability> = rows
        .iter()
        .filter(|r| r.time_horizon_minutes == horizon)
        .collect();
    at_horizon.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.from_segment_id.cmp(&b.from_segment_id))
            .then(a.to_segment_id.cmp(&b.to_segment_id))
    });
    let mut seen = HashSet::new();
    at_horizon.retain(|r| seen.insert((r.from_segment_id, r.to_segment_id)));
    at_horizon
}

/// Name and coordinates of a segment, if the graph knows it.
fn locate(road: &RoadGraph, id: SegmentId, fallback: Centroid) -> Option<(String, Centroid)> {
    road.segment(id)
        .map(|s| (s.display_name, s.centroid.unwrap_or(fallback)))
}

/// The strongest influence edges at a horizon.
pub fn influence_flows(
    rows: &[InfluenceProbability],
    road: &RoadGraph,
    horizon: u32,
    config: &FlowConfig,
    fallback: Centroid,
) -> Vec<InfluenceFlow> {
    strongest_edges(rows, horizon)
        .into_iter()
        .filter(|r| r.probability >= config.min_probability)
        .filter_map(|r| {
            let (from_name, from_coords) = locate(road, r.from_segment_id, fallback)?;
            let (to_name, to_coords) = locate(road, r.to_segment_id, fallback)?;
            Some(InfluenceFlow {
                from_segment_id: r.from_segment_id,
                to_segment_id: r.to_segment_id,
                probability: r.probability,
                confidence: r.confidence,
                from_name,
                to_name,
                from_coords,
                to_coords,
            })
        })
        .take(config.max_flows)
        .collect()
}

/// Outgoing influence of ranked bottlenecks, by rank then probability.
///
/// With `only`, lists a single bottleneck with a lower probability floor.
pub fn bottleneck_impacts(
    ranking: &[BottleneckEntry],
    rows: &[InfluenceProbability],
    road: &RoadGraph,
    horizon: u32,
    only: Option<SegmentId>,
    config: &FlowConfig,
    fallback: Centroid,
) -> Vec<BottleneckImpact> {
    let (floor, limit) = match only {
        Some(_) => (config.single_impact_min_probability, config.max_single_impacts),
        None => (config.impact_min_probability, config.max_impacts),
    };
    let edges = strongest_edges(rows, horizon);

    let mut impacts = Vec::new();
    for entry in ranking {
        if only.is_some_and(|id| id != entry.segment_id) {
            continue;
        }
        for r in edges
            .iter()
            .filter(|r| r.from_segment_id == entry.segment_id && r.probability >= floor)
        {
            let Some((affected_name, affected_coords)) = locate(road, r.to_segment_id, fallback)
            else {
                continue;
            };
            impacts.push(BottleneckImpact {
                bottleneck_id: entry.segment_id,
                bottleneck_name: entry.display_name.clone(),
                bottleneck_coords: entry.coordinates,
                rank: entry.rank,
                affected_id: r.to_segment_id,
                affected_name,
                affected_coords,
                probability: r.probability,
            });
        }
    }
    impacts.sort_by(|a, b| {
        a.rank.cmp(&b.rank).then(
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    impacts.truncate(limit);
    impacts
}
