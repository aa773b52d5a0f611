//! Road graph: segments as nodes, directed adjacencies as edges.
//!
//! The graph is supplied by the upstream road-network ingestion and is
//! read-only to the prediction core once a dataset is registered.

pub mod index;

use serde::{Deserialize, Serialize};

use crate::segment::DirectedAdjacency;

pub use index::{GraphResult, RoadGraph};

/// Edge data stored on petgraph edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    /// Distance between the two segments in meters.
    pub distance_meters: f64,
}

impl From<&DirectedAdjacency> for EdgeData {
    fn from(a: &DirectedAdjacency) -> Self {
        Self {
            distance_meters: a.distance_meters,
        }
    }
}
