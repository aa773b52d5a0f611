//! Request and response shapes exchanged with the routing layer.
//!
//! All shapes serialize as camelCase JSON. Model types travel as strings and
//! are parsed at the engine boundary, so an unknown value surfaces as
//! `InvalidModelType` before any computation starts.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};

use crate::bottleneck::BottleneckEntry;
use crate::diffusion::Prediction;
use crate::error::{DiffusionError, JamError};
use crate::flows::{BottleneckImpact, InfluenceFlow};
use crate::influence::ModelType;
use crate::segment::SegmentId;
use crate::whatif::WhatIfReport;

fn default_model() -> String {
    ModelType::Lim.as_str().to_string()
}

fn default_horizon() -> u32 {
    30
}

fn default_horizons() -> Vec<u32> {
    vec![5, 15, 30]
}

fn default_k() -> usize {
    10
}

/// Anything carrying a model type string.
pub trait ModelRequest {
    fn model_type_str(&self) -> &str;

    fn model(&self) -> Result<ModelType, DiffusionError> {
        self.model_type_str().parse()
    }
}

macro_rules! model_request {
    ($($ty:ty),+ $(,)?) => {
        $(impl ModelRequest for $ty {
            fn model_type_str(&self) -> &str {
                &self.model_type
            }
        })+
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnRequest {
    pub dataset_id: String,
    #[serde(default = "default_horizons")]
    pub time_horizons: Vec<u32>,
    #[serde(default = "default_model")]
    pub model_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnResponse {
    pub success: bool,
    pub total_learned: usize,
    pub time_horizons: Vec<u32>,
    pub model_type: ModelType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    pub dataset_id: String,
    pub seed_segment_ids: Vec<SegmentId>,
    #[serde(default = "default_horizon")]
    pub time_horizon_minutes: u32,
    #[serde(default = "default_model")]
    pub model_type: String,
    #[serde(default)]
    pub num_simulations: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    pub success: bool,
    pub model_type: ModelType,
    pub time_horizon: u32,
    pub seed_segment_ids: Vec<SegmentId>,
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BottlenecksRequest {
    pub dataset_id: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_horizon")]
    pub time_horizon_minutes: u32,
    #[serde(default = "default_model")]
    pub model_type: String,
    #[serde(default)]
    pub force_recompute: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BottlenecksResponse {
    pub success: bool,
    pub cached: bool,
    /// False when the selection was cancelled or ran out of time.
    pub complete: bool,
    /// Seeds were a sample of the graph because nothing was jammed.
    pub seed_fallback: bool,
    pub model_type: ModelType,
    pub time_horizon: u32,
    pub bottlenecks: Vec<BottleneckEntry>,
}

/// Learn if needed, then rank with a forced recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunModelRequest {
    pub dataset_id: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_horizon")]
    pub time_horizon_minutes: u32,
    #[serde(default = "default_model")]
    pub model_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunModelResponse {
    /// Rows learned on the way; 0 when the dataset already had some.
    pub learned: usize,
    #[serde(flatten)]
    pub ranking: BottlenecksResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatIfRequest {
    pub dataset_id: String,
    pub fixed_segment_ids: Vec<SegmentId>,
    #[serde(default = "default_horizon")]
    pub time_horizon_minutes: u32,
    #[serde(default = "default_model")]
    pub model_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatIfResponse {
    pub success: bool,
    pub seed_fallback: bool,
    #[serde(flatten)]
    pub report: WhatIfReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowsResponse {
    pub success: bool,
    pub flows: Vec<InfluenceFlow>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactsResponse {
    pub success: bool,
    pub impacts: Vec<BottleneckImpact>,
    pub count: usize,
}

model_request!(
    LearnRequest,
    PredictRequest,
    BottlenecksRequest,
    RunModelRequest,
    WhatIfRequest,
);

/// Failure body. `clientError` tells the routing layer 4xx from 5xx.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(default)]
    pub code: Option<String>,
    pub client_error: bool,
}

impl From<&JamError> for ErrorResponse {
    fn from(err: &JamError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            code: err.code().map(|c| c.to_string()),
            client_error: err.is_client_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_request_defaults() {
        let req: PredictRequest =
            serde_json::from_str(r#"{"datasetId": "d", "seedSegmentIds": [1, 2]}"#).unwrap();
        assert_eq!(req.time_horizon_minutes, 30);
        assert_eq!(req.model().unwrap(), ModelType::Lim);
        assert_eq!(req.num_simulations, None);
        assert_eq!(req.seed_segment_ids.len(), 2);
    }

    #[test]
    fn unknown_model_type_rejected() {
        let req: BottlenecksRequest =
            serde_json::from_str(r#"{"datasetId": "d", "k": 3, "modelType": "SEIR"}"#).unwrap();
        assert!(matches!(
            req.model(),
            Err(DiffusionError::InvalidModelType { .. })
        ));
        assert!(!req.force_recompute);
    }

    #[test]
    fn zero_segment_id_fails_to_parse() {
        let res: Result<WhatIfRequest, _> =
            serde_json::from_str(r#"{"datasetId": "d", "fixedSegmentIds": [0]}"#);
        assert!(res.is_err());
    }

    #[test]
    fn error_response_carries_code() {
        let err: JamError = DiffusionError::InvalidModelType {
            value: "X".into(),
        }
        .into();
        let body = ErrorResponse::from(&err);
        assert!(!body.success);
        assert!(body.client_error);
        assert_eq!(body.code.as_deref(), Some("jam::diffusion::invalid_model"));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["clientError"], true);
    }

    #[test]
    fn what_if_response_flattens_report() {
        let resp = WhatIfResponse {
            success: true,
            seed_fallback: false,
            report: WhatIfReport {
                fixed_segment_names: vec!["A".into()],
                total_benefit: 1.5,
                affected_segments: vec![],
                baseline_jam_count: 3,
                fixed_jam_count: 1,
            },
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["fixedSegmentNames"][0], "A");
        assert_eq!(json["baselineJamCount"], 3);
        assert_eq!(json["seedFallback"], false);
    }
}
