//! In-memory road graph with an id index.
//!
//! Uses `petgraph` for the graph structure and `DashMap` for O(1) lookups
//! from a [`SegmentId`] to its node and attributes.

use std::sync::RwLock;

use dashmap::DashMap;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::GraphError;
use crate::segment::{DirectedAdjacency, RoadSegment, SegmentId};

use super::EdgeData;

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Road graph backed by petgraph.
///
/// Node order is insertion order; every iteration over segments follows it,
/// which keeps greedy tie-breaking reproducible.
pub struct RoadGraph {
    graph: RwLock<DiGraph<SegmentId, EdgeData>>,
    node_index: DashMap<SegmentId, NodeIndex>,
    segments: DashMap<SegmentId, RoadSegment>,
}

impl RoadGraph {
    /// Create a new empty road graph.
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(DiGraph::new()),
            node_index: DashMap::new(),
            segments: DashMap::new(),
        }
    }

    /// Insert a segment. Segments are immutable, so re-inserting an id fails.
    pub fn insert_segment(&self, segment: RoadSegment) -> GraphResult<()> {
        let id = segment.id;
        let mut graph = self.graph.write().expect("graph lock poisoned");
        if self.node_index.contains_key(&id) {
            return Err(GraphError::DuplicateSegment {
                segment_id: id.get(),
            });
        }
        let idx = graph.add_node(id);
        self.node_index.insert(id, idx);
        self.segments.insert(id, segment);
        Ok(())
    }

    /// Insert a directed adjacency between two known, distinct segments.
    pub fn insert_adjacency(&self, adjacency: &DirectedAdjacency) -> GraphResult<()> {
        let from = adjacency.from_segment_id;
        let to = adjacency.to_segment_id;
        if from == to {
            return Err(GraphError::SelfLoop {
                segment_id: from.get(),
            });
        }
        let from_idx = self.index_of(from)?;
        let to_idx = self.index_of(to)?;

        let mut graph = self.graph.write().expect("graph lock poisoned");
        graph.update_edge(from_idx, to_idx, EdgeData::from(adjacency));
        Ok(())
    }

    fn index_of(&self, segment: SegmentId) -> GraphResult<NodeIndex> {
        self.node_index
            .get(&segment)
            .map(|idx| *idx.value())
            .ok_or(GraphError::SegmentNotFound {
                segment_id: segment.get(),
            })
    }

    /// Segments reachable in one hop downstream.
    pub fn successors(&self, segment: SegmentId) -> Vec<SegmentId> {
        self.neighbors(segment, Direction::Outgoing)
    }

    /// Segments one hop upstream.
    pub fn predecessors(&self, segment: SegmentId) -> Vec<SegmentId> {
        self.neighbors(segment, Direction::Incoming)
    }

    fn neighbors(&self, segment: SegmentId, direction: Direction) -> Vec<SegmentId> {
        let Ok(idx) = self.index_of(segment) else {
            return vec![];
        };
        let graph = self.graph.read().expect("graph lock poisoned");
        graph
            .edges_directed(idx, direction)
            .filter_map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                graph.node_weight(other).copied()
            })
            .collect()
    }

    /// Attributes of a segment.
    pub fn segment(&self, id: SegmentId) -> Option<RoadSegment> {
        self.segments.get(&id).map(|s| s.value().clone())
    }

    /// Check if a segment exists.
    pub fn has_segment(&self, id: SegmentId) -> bool {
        self.node_index.contains_key(&id)
    }

    /// All segment ids in insertion order.
    pub fn segment_ids(&self) -> Vec<SegmentId> {
        let graph = self.graph.read().expect("graph lock poisoned");
        graph
            .node_indices()
            .filter_map(|idx| graph.node_weight(idx).copied())
            .collect()
    }

    /// All segments in insertion order.
    pub fn segments(&self) -> Vec<RoadSegment> {
        self.segment_ids()
            .into_iter()
            .filter_map(|id| self.segment(id))
            .collect()
    }

    /// All adjacencies in the graph.
    pub fn adjacencies(&self) -> Vec<DirectedAdjacency> {
        let graph = self.graph.read().expect("graph lock poisoned");
        graph
            .edge_references()
            .filter_map(|e| {
                let from = *graph.node_weight(e.source())?;
                let to = *graph.node_weight(e.target())?;
                Some(DirectedAdjacency::new(from, to, e.weight().distance_meters))
            })
            .collect()
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.node_index.len()
    }

    /// Number of adjacencies.
    pub fn adjacency_count(&self) -> usize {
        self.graph.read().expect("graph lock poisoned").edge_count()
    }
}

impl Default for RoadGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RoadGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoadGraph")
            .field("segments", &self.segment_count())
            .field("adjacencies", &self.adjacency_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(id: u64) -> SegmentId {
        SegmentId::new(id).unwrap()
    }

    fn chain() -> RoadGraph {
        let g = RoadGraph::new();
        for (id, name) in [(1, "A"), (2, "B"), (3, "C")] {
            g.insert_segment(RoadSegment::new(seg(id), name)).unwrap();
        }
        g.insert_adjacency(&DirectedAdjacency::new(seg(1), seg(2), 100.0))
            .unwrap();
        g.insert_adjacency(&DirectedAdjacency::new(seg(2), seg(3), 80.0))
            .unwrap();
        g
    }

    #[test]
    fn insert_and_query() {
        let g = chain();
        assert_eq!(g.segment_count(), 3);
        assert_eq!(g.adjacency_count(), 2);
        assert_eq!(g.successors(seg(1)), vec![seg(2)]);
        assert_eq!(g.predecessors(seg(3)), vec![seg(2)]);
        assert_eq!(g.segment(seg(2)).unwrap().display_name, "B");
    }

    #[test]
    fn insertion_order_is_preserved() {
        let g = RoadGraph::new();
        for id in [5, 2, 9] {
            g.insert_segment(RoadSegment::new(seg(id), "x")).unwrap();
        }
        assert_eq!(g.segment_ids(), vec![seg(5), seg(2), seg(9)]);
    }

    #[test]
    fn self_loop_rejected() {
        let g = chain();
        let err = g
            .insert_adjacency(&DirectedAdjacency::new(seg(1), seg(1), 0.0))
            .unwrap_err();
        assert!(matches!(err, GraphError::SelfLoop { segment_id: 1 }));
    }

    #[test]
    fn unknown_endpoint_rejected() {
        let g = chain();
        let err = g
            .insert_adjacency(&DirectedAdjacency::new(seg(1), seg(99), 0.0))
            .unwrap_err();
        assert!(matches!(err, GraphError::SegmentNotFound { segment_id: 99 }));
    }

    #[test]
    fn duplicate_segment_rejected() {
        let g = chain();
        let err = g.insert_segment(RoadSegment::new(seg(1), "again")).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateSegment { .. }));
    }

    #[test]
    fn repeated_adjacency_is_not_duplicated() {
        let g = chain();
        g.insert_adjacency(&DirectedAdjacency::new(seg(1), seg(2), 120.0))
            .unwrap();
        assert_eq!(g.adjacency_count(), 2);
        let a = g
            .adjacencies()
            .into_iter()
            .find(|a| a.from_segment_id == seg(1))
            .unwrap();
        assert_eq!(a.distance_meters, 120.0);
    }

    #[test]
    fn empty_queries() {
        let g = RoadGraph::new();
        assert!(g.successors(seg(1)).is_empty());
        assert!(g.segment(seg(1)).is_none());
        assert!(g.adjacencies().is_empty());
    }
}
