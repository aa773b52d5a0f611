//! Influence probabilities: how likely a jam on one segment spreads downstream.
//!
//! Rows are estimated by [`learn`] from the congestion history and stored per
//! dataset. Simulators read them through an [`InfluenceTable`] restricted to
//! one time horizon.

pub mod learn;

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DiffusionError;
use crate::segment::SegmentId;

/// The diffusion model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    /// Independent cascade, Monte Carlo.
    #[serde(rename = "LIM")]
    Lim,
    /// Linear threshold, deterministic.
    #[serde(rename = "LTM")]
    Ltm,
    /// Susceptible-infected-recovered epidemic.
    #[serde(rename = "SIR")]
    Sir,
    /// Susceptible-infected-susceptible epidemic.
    #[serde(rename = "SIS")]
    Sis,
}

impl ModelType {
    pub const ALL: [ModelType; 4] = [ModelType::Lim, ModelType::Ltm, ModelType::Sir, ModelType::Sis];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::Lim => "LIM",
            ModelType::Ltm => "LTM",
            ModelType::Sir => "SIR",
            ModelType::Sis => "SIS",
        }
    }

    /// Whether repeated runs with different seeds can disagree.
    pub fn is_stochastic(self) -> bool {
        !matches!(self, ModelType::Ltm)
    }
}

impl FromStr for ModelType {
    type Err = DiffusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LIM" => Ok(ModelType::Lim),
            "LTM" => Ok(ModelType::Ltm),
            "SIR" => Ok(ModelType::Sir),
            "SIS" => Ok(ModelType::Sis),
            _ => Err(DiffusionError::InvalidModelType {
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse reliability of an estimate, by the number of upstream jams observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_samples(samples: u32, high: u32, medium: u32) -> Self {
        if samples >= high {
            ConfidenceTier::High
        } else if samples >= medium {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

/// Learned probability that `to` jams within the horizon given `from` jammed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluenceProbability {
    pub from_segment_id: SegmentId,
    pub to_segment_id: SegmentId,
    pub time_horizon_minutes: u32,
    /// In [0, 1].
    pub probability: f64,
    pub model_type: ModelType,
    pub confidence: ConfidenceTier,
    /// Upstream jam instants the estimate is based on.
    pub sample_count: u32,
}

/// Influence edges for one horizon, ready for a simulator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfluenceTable {
    edges: Vec<(SegmentId, SegmentId, f64)>,
}

impl InfluenceTable {
    /// Build directly from `(from, to, probability)` triples.
    pub fn from_edges(edges: impl IntoIterator<Item = (SegmentId, SegmentId, f64)>) -> Self {
        Self {
            edges: edges.into_iter().collect(),
        }
    }

    /// Select the rows for a horizon.
    ///
    /// Rows tagged with the requested model win. When the dataset was learned
    /// under a different tag, that tag's rows are used instead: the estimate
    /// itself does not depend on the model. Duplicate edges keep their first row.
    pub fn select(rows: &[InfluenceProbability], horizon: u32, model: ModelType) -> Self {
        let at_horizon: Vec<&InfluenceProbability> = rows
            .iter()
            .filter(|r| r.time_horizon_minutes == horizon)
            .collect();
        let has_model = at_horizon.iter().any(|r| r.model_type == model);
        if !has_model && !at_horizon.is_empty() {
            tracing::debug!(%model, horizon, "no rows for model, using rows learned under another tag");
        }

        let mut seen = HashSet::new();
        let edges = at_horizon
            .into_iter()
            .filter(|r| !has_model || r.model_type == model)
            .filter(|r| seen.insert((r.from_segment_id, r.to_segment_id)))
            .map(|r| (r.from_segment_id, r.to_segment_id, r.probability))
            .collect();
        Self { edges }
    }

    pub fn edges(&self) -> &[(SegmentId, SegmentId, f64)] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(id: u64) -> SegmentId {
        SegmentId::new(id).unwrap()
    }

    fn row(from: u64, to: u64, horizon: u32, p: f64, model: ModelType) -> InfluenceProbability {
        InfluenceProbability {
            from_segment_id: seg(from),
            to_segment_id: seg(to),
            time_horizon_minutes: horizon,
            probability: p,
            model_type: model,
            confidence: ConfidenceTier::High,
            sample_count: 12,
        }
    }

    #[test]
    fn model_type_parses_exactly_four_values() {
        assert_eq!("LIM".parse::<ModelType>().unwrap(), ModelType::Lim);
        assert_eq!("ltm".parse::<ModelType>().unwrap(), ModelType::Ltm);
        assert_eq!("SIR".parse::<ModelType>().unwrap(), ModelType::Sir);
        assert_eq!("SIS".parse::<ModelType>().unwrap(), ModelType::Sis);
        assert!(matches!(
            "SEIR".parse::<ModelType>(),
            Err(DiffusionError::InvalidModelType { .. })
        ));
    }

    #[test]
    fn model_type_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&ModelType::Sis).unwrap(), "\"SIS\"");
        for m in ModelType::ALL {
            assert_eq!(m.as_str().parse::<ModelType>().unwrap(), m);
        }
    }

    #[test]
    fn confidence_tiers() {
        assert_eq!(ConfidenceTier::from_samples(10, 10, 5), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_samples(7, 10, 5), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_samples(4, 10, 5), ConfidenceTier::Low);
    }

    #[test]
    fn select_filters_horizon_and_prefers_model() {
        let rows = vec![
            row(1, 2, 5, 0.3, ModelType::Lim),
            row(1, 2, 30, 0.8, ModelType::Lim),
            row(1, 2, 30, 0.6, ModelType::Ltm),
            row(2, 3, 30, 0.5, ModelType::Ltm),
        ];
        let lim = InfluenceTable::select(&rows, 30, ModelType::Lim);
        assert_eq!(lim.edges(), &[(seg(1), seg(2), 0.8)]);

        let ltm = InfluenceTable::select(&rows, 30, ModelType::Ltm);
        assert_eq!(ltm.len(), 2);
    }

    #[test]
    fn select_falls_back_to_other_tag() {
        let rows = vec![row(1, 2, 15, 0.4, ModelType::Lim)];
        let sir = InfluenceTable::select(&rows, 15, ModelType::Sir);
        assert_eq!(sir.edges(), &[(seg(1), seg(2), 0.4)]);
        assert!(InfluenceTable::select(&rows, 30, ModelType::Sir).is_empty());
    }
}
