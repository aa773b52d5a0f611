//! Datasets: a road graph plus its congestion history.
//!
//! The ingestion pipeline that builds datasets lives upstream. This module only
//! accepts its output, either programmatically or as a JSON document, and makes
//! it available to the engine through the [`DatasetProvider`] seam.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;
use crate::graph::RoadGraph;
use crate::history::{CongestionHistory, CongestionObservation};
use crate::segment::{DirectedAdjacency, RoadSegment, SegmentId};

pub type DatasetResult<T> = std::result::Result<T, DatasetError>;

/// Wire shape of a dataset document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetFile {
    #[serde(default)]
    pub segments: Vec<RoadSegment>,
    #[serde(default)]
    pub adjacencies: Vec<DirectedAdjacency>,
    #[serde(default)]
    pub observations: Vec<CongestionObservation>,
}

/// An immutable road graph with its congestion history.
#[derive(Debug, Default)]
pub struct Dataset {
    graph: RoadGraph,
    history: CongestionHistory,
}

impl Dataset {
    /// Assemble a dataset, validating every record.
    pub fn build(
        segments: Vec<RoadSegment>,
        adjacencies: &[DirectedAdjacency],
        observations: Vec<CongestionObservation>,
    ) -> DatasetResult<Self> {
        let graph = RoadGraph::new();
        for segment in segments {
            graph.insert_segment(segment)?;
        }
        for adjacency in adjacencies {
            graph.insert_adjacency(adjacency)?;
        }
        for obs in &observations {
            if !(0.0..=1.0).contains(&obs.congestion_index) {
                return Err(DatasetError::Parse {
                    message: format!(
                        "congestion index {} of {} at {} lies outside [0, 1]",
                        obs.congestion_index, obs.segment_id, obs.timestamp
                    ),
                });
            }
        }
        let history = CongestionHistory::from_observations(observations);
        tracing::debug!(
            segments = graph.segment_count(),
            adjacencies = graph.adjacency_count(),
            observations = history.len(),
            "dataset assembled"
        );
        Ok(Self { graph, history })
    }

    /// Parse a JSON dataset document.
    pub fn from_json(json: &str) -> DatasetResult<Self> {
        let file: DatasetFile = serde_json::from_str(json).map_err(|e| DatasetError::Parse {
            message: e.to_string(),
        })?;
        Self::from_file(file)
    }

    pub fn from_file(file: DatasetFile) -> DatasetResult<Self> {
        Self::build(file.segments, &file.adjacencies, file.observations)
    }

    /// Read a JSON dataset document from disk.
    pub fn load(path: &Path) -> DatasetResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DatasetError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&content)
    }

    pub fn graph(&self) -> &RoadGraph {
        &self.graph
    }

    pub fn history(&self) -> &CongestionHistory {
        &self.history
    }

    /// Segment ids in graph order.
    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.graph.segment_ids()
    }
}

/// Source of datasets by identifier.
pub trait DatasetProvider: Send + Sync {
    /// The dataset, or `None` when nothing was ingested under this id.
    fn dataset(&self, dataset_id: &str) -> Option<Arc<Dataset>>;

    /// Identifiers of every known dataset.
    fn dataset_ids(&self) -> Vec<String>;
}

/// In-memory dataset registry.
#[derive(Debug, Default)]
pub struct DatasetRegistry {
    datasets: DashMap<String, Arc<Dataset>>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a dataset. Returns true when an older one was replaced.
    pub fn insert(&self, dataset_id: impl Into<String>, dataset: Dataset) -> bool {
        self.datasets
            .insert(dataset_id.into(), Arc::new(dataset))
            .is_some()
    }

    pub fn remove(&self, dataset_id: &str) -> bool {
        self.datasets.remove(dataset_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

impl DatasetProvider for DatasetRegistry {
    fn dataset(&self, dataset_id: &str) -> Option<Arc<Dataset>> {
        self.datasets.get(dataset_id).map(|d| Arc::clone(d.value()))
    }

    fn dataset_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.datasets.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;

    const CHAIN: &str = r#"{
        "segments": [
            {"id": 1, "displayName": "A"},
            {"id": 2, "displayName": "B", "lengthMeters": 500.0, "capacity": 2000.0},
            {"id": 3, "displayName": "C", "centroid": {"lat": 1.30, "lon": 103.85}}
        ],
        "adjacencies": [
            {"fromSegmentId": 1, "toSegmentId": 2, "distanceMeters": 120.0},
            {"fromSegmentId": 2, "toSegmentId": 3}
        ],
        "observations": [
            {"segmentId": 1, "timestamp": 0, "congestionIndex": 0.9, "state": "jammed"},
            {"segmentId": 2, "timestamp": 300, "speedKmh": 12.5, "congestionIndex": 0.8, "state": "jammed"}
        ]
    }"#;

    #[test]
    fn parse_chain_dataset() {
        let d = Dataset::from_json(CHAIN).unwrap();
        assert_eq!(d.graph().segment_count(), 3);
        assert_eq!(d.graph().adjacency_count(), 2);
        assert_eq!(d.history().len(), 2);
        assert_eq!(
            d.segment_ids(),
            vec![
                SegmentId::new(1).unwrap(),
                SegmentId::new(2).unwrap(),
                SegmentId::new(3).unwrap()
            ]
        );
    }

    #[test]
    fn out_of_range_index_rejected() {
        let json = r#"{
            "segments": [{"id": 1, "displayName": "A"}],
            "observations": [{"segmentId": 1, "timestamp": 0, "congestionIndex": 1.4, "state": "jammed"}]
        }"#;
        assert!(matches!(
            Dataset::from_json(json),
            Err(DatasetError::Parse { .. })
        ));
    }

    #[test]
    fn self_loop_rejected() {
        let json = r#"{
            "segments": [{"id": 1, "displayName": "A"}],
            "adjacencies": [{"fromSegmentId": 1, "toSegmentId": 1}]
        }"#;
        assert!(matches!(
            Dataset::from_json(json),
            Err(DatasetError::Graph(GraphError::SelfLoop { .. }))
        ));
    }

    #[test]
    fn registry_lookup() {
        let registry = DatasetRegistry::new();
        assert!(!registry.insert("downtown", Dataset::from_json(CHAIN).unwrap()));
        registry.insert("airport", Dataset::default());
        assert!(registry.insert("airport", Dataset::default()));
        assert!(registry.dataset("downtown").is_some());
        assert!(registry.dataset("nowhere").is_none());
        assert_eq!(registry.dataset_ids(), vec!["airport", "downtown"]);
        assert!(registry.remove("airport"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("chain.json");
        std::fs::write(&path, CHAIN).unwrap();
        let d = Dataset::load(&path).unwrap();
        assert_eq!(d.graph().segment_count(), 3);
        assert!(matches!(
            Dataset::load(&dir.path().join("missing.json")),
            Err(DatasetError::Read { .. })
        ));
    }
}
