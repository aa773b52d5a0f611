//! Congestion history and seed-set derivation.
//!
//! Observations arrive from the upstream trajectory pipeline as one record per
//! segment per aggregation window. The history keeps each segment's series
//! sorted by timestamp so that look-ahead queries are binary searches.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::LearnConfig;
use crate::segment::SegmentId;

/// Discretized congestion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionState {
    Free,
    Moderate,
    Heavy,
    Jammed,
}

impl CongestionState {
    /// Bucket a congestion index in [0, 1].
    pub fn from_index(index: f64) -> Self {
        if index >= 0.7 {
            CongestionState::Jammed
        } else if index >= 0.5 {
            CongestionState::Heavy
        } else if index >= 0.3 {
            CongestionState::Moderate
        } else {
            CongestionState::Free
        }
    }
}

/// One aggregation window of measurements for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CongestionObservation {
    pub segment_id: SegmentId,
    /// Seconds since UNIX epoch.
    pub timestamp: u64,
    #[serde(default)]
    pub speed_kmh: Option<f64>,
    #[serde(default)]
    pub flow: Option<f64>,
    #[serde(default)]
    pub density: Option<f64>,
    /// In [0, 1]; 1 is a standstill.
    pub congestion_index: f64,
    pub state: CongestionState,
}

impl CongestionObservation {
    /// Create an observation whose state is bucketed from the index.
    pub fn new(segment_id: SegmentId, timestamp: u64, congestion_index: f64) -> Self {
        Self {
            segment_id,
            timestamp,
            speed_kmh: None,
            flow: None,
            density: None,
            congestion_index,
            state: CongestionState::from_index(congestion_index),
        }
    }
}

/// Per-segment congestion time series.
#[derive(Debug, Clone, Default)]
pub struct CongestionHistory {
    series: HashMap<SegmentId, Vec<CongestionObservation>>,
    latest: Option<u64>,
    len: usize,
}

impl CongestionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an unordered batch of observations.
    pub fn from_observations(observations: impl IntoIterator<Item = CongestionObservation>) -> Self {
        let mut history = Self::new();
        for obs in observations {
            history.push(obs);
        }
        history
    }

    /// Append an observation, keeping the segment's series time-sorted.
    pub fn push(&mut self, obs: CongestionObservation) {
        self.latest = Some(self.latest.map_or(obs.timestamp, |t| t.max(obs.timestamp)));
        self.len += 1;
        let series = self.series.entry(obs.segment_id).or_default();
        let pos = series.partition_point(|o| o.timestamp <= obs.timestamp);
        series.insert(pos, obs);
    }

    /// The time-sorted series for a segment (empty when unobserved).
    pub fn series(&self, segment: SegmentId) -> &[CongestionObservation] {
        self.series.get(&segment).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Timestamps at which the segment's index reached `threshold`, ascending.
    pub fn jammed_instants(&self, segment: SegmentId, threshold: f64) -> Vec<u64> {
        self.series(segment)
            .iter()
            .filter(|o| o.congestion_index >= threshold)
            .map(|o| o.timestamp)
            .collect()
    }

    /// Most recent timestamp across all segments.
    pub fn latest_timestamp(&self) -> Option<u64> {
        self.latest
    }

    /// Segments jammed at any instant in `[since, until]`.
    pub fn jammed_between(&self, since: u64, until: u64, threshold: f64) -> HashSet<SegmentId> {
        self.series
            .iter()
            .filter(|(_, series)| {
                let start = series.partition_point(|o| o.timestamp < since);
                series[start..]
                    .iter()
                    .take_while(|o| o.timestamp <= until)
                    .any(|o| o.congestion_index >= threshold)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// Total number of observations.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of segments with at least one observation.
    pub fn observed_segments(&self) -> usize {
        self.series.len()
    }
}

/// Segments treated as congested at simulation start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedSet {
    pub segments: Vec<SegmentId>,
    /// True when nothing was jammed and the first segments of the graph were
    /// substituted. Results computed from such seeds describe a hypothetical.
    pub fallback: bool,
}

impl SeedSet {
    /// Explicit seeds, e.g. from a predict request.
    pub fn explicit(segments: Vec<SegmentId>) -> Self {
        Self {
            segments,
            fallback: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Seeds minus the given segments, order preserved.
    pub fn without(&self, removed: &HashSet<SegmentId>) -> Vec<SegmentId> {
        self.segments
            .iter()
            .copied()
            .filter(|s| !removed.contains(s))
            .collect()
    }
}

/// Derive the current seed set.
///
/// A segment is a seed when its index reached the jam threshold within the
/// lookback window ending at `now`. `segment_order` is the graph's segment
/// order; it orders the result and supplies the fallback sample.
pub fn derive_seed_set(
    history: &CongestionHistory,
    segment_order: &[SegmentId],
    now: Option<u64>,
    config: &LearnConfig,
) -> SeedSet {
    let jammed = match now.or(history.latest_timestamp()) {
        Some(now) => {
            let since = now.saturating_sub(u64::from(config.seed_lookback_minutes) * 60);
            history.jammed_between(since, now, config.jam_threshold)
        }
        None => HashSet::new(),
    };

    let segments: Vec<SegmentId> = segment_order
        .iter()
        .copied()
        .filter(|s| jammed.contains(s))
        .collect();

    if !segments.is_empty() {
        tracing::info!(seeds = segments.len(), "derived seed set from recent congestion");
        return SeedSet {
            segments,
            fallback: false,
        };
    }

    let sample: Vec<SegmentId> = segment_order
        .iter()
        .copied()
        .take(config.fallback_seed_count)
        .collect();
    tracing::warn!(
        seeds = sample.len(),
        "no currently jammed segments, falling back to a sample of the graph"
    );
    SeedSet {
        segments: sample,
        fallback: true,
    }
}
