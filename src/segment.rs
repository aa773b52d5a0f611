//! Core road-network types.
//!
//! Every stretch of road is identified by a [`SegmentId`] and described by
//! [`RoadSegment`]. A [`DirectedAdjacency`] records that traffic leaving one
//! segment enters the next, which is also the direction congestion can spread.

use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

/// Unique, niche-optimized identifier for a road segment.
///
/// Uses `NonZeroU64` so that `Option<SegmentId>` is the same size as `SegmentId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
#[repr(transparent)]
pub struct SegmentId(NonZeroU64);

impl SegmentId {
    /// Create a `SegmentId` from a raw `u64`.
    ///
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(SegmentId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl TryFrom<u64> for SegmentId {
    type Error = String;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        SegmentId::new(raw).ok_or_else(|| "segment id must be non-zero".to_string())
    }
}

impl From<SegmentId> for u64 {
    fn from(id: SegmentId) -> Self {
        id.get()
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "seg:{}", self.0)
    }
}

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub lat: f64,
    pub lon: f64,
}

/// A stretch of road. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadSegment {
    pub id: SegmentId,
    pub display_name: String,
    /// Length in meters, when the upstream network knows it.
    #[serde(default)]
    pub length_meters: Option<f64>,
    /// Vehicles per hour, when the upstream network knows it.
    #[serde(default)]
    pub capacity: Option<f64>,
    #[serde(default)]
    pub free_flow_speed_kmh: Option<f64>,
    #[serde(default)]
    pub centroid: Option<Centroid>,
}

impl RoadSegment {
    /// Create a segment with only an id and a name.
    pub fn new(id: SegmentId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            length_meters: None,
            capacity: None,
            free_flow_speed_kmh: None,
            centroid: None,
        }
    }

    /// Set length and capacity.
    pub fn with_size(mut self, length_meters: f64, capacity: f64) -> Self {
        self.length_meters = Some(length_meters);
        self.capacity = Some(capacity);
        self
    }

    /// Set the centroid.
    pub fn with_centroid(mut self, lat: f64, lon: f64) -> Self {
        self.centroid = Some(Centroid { lat, lon });
        self
    }

    /// Static importance: length × capacity, substituting defaults for
    /// whatever the upstream network left blank.
    pub fn importance(&self, default_length: f64, default_capacity: f64) -> f64 {
        self.length_meters.unwrap_or(default_length) * self.capacity.unwrap_or(default_capacity)
    }
}

/// Directed adjacency between two distinct segments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectedAdjacency {
    pub from_segment_id: SegmentId,
    pub to_segment_id: SegmentId,
    #[serde(default)]
    pub distance_meters: f64,
}

impl DirectedAdjacency {
    pub fn new(from: SegmentId, to: SegmentId, distance_meters: f64) -> Self {
        Self {
            from_segment_id: from,
            to_segment_id: to,
            distance_meters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_id_niche_optimization() {
        assert_eq!(
            std::mem::size_of::<SegmentId>(),
            std::mem::size_of::<Option<SegmentId>>()
        );
    }

    #[test]
    fn segment_id_zero_is_none() {
        assert!(SegmentId::new(0).is_none());
        assert_eq!(SegmentId::new(42).unwrap().get(), 42);
    }

    #[test]
    fn segment_id_rejects_zero_in_json() {
        let parsed: Result<SegmentId, _> = serde_json::from_str("0");
        assert!(parsed.is_err());
        let parsed: SegmentId = serde_json::from_str("7").unwrap();
        assert_eq!(parsed.get(), 7);
    }

    #[test]
    fn importance_uses_defaults_for_missing_fields() {
        let id = SegmentId::new(1).unwrap();
        let bare = RoadSegment::new(id, "Orchard Rd");
        assert_eq!(bare.importance(1000.0, 1000.0), 1_000_000.0);

        let sized = RoadSegment::new(id, "Orchard Rd").with_size(250.0, 1800.0);
        assert_eq!(sized.importance(1000.0, 1000.0), 450_000.0);
    }

    #[test]
    fn segment_json_shape() {
        let json = r#"{
            "id": 3,
            "displayName": "PIE",
            "lengthMeters": 1200.0,
            "capacity": 4000.0,
            "freeFlowSpeedKmh": 90.0,
            "centroid": {"lat": 1.33, "lon": 103.9}
        }"#;
        let seg: RoadSegment = serde_json::from_str(json).unwrap();
        assert_eq!(seg.id.get(), 3);
        assert_eq!(seg.display_name, "PIE");
        assert_eq!(seg.centroid.unwrap().lon, 103.9);
    }
}
