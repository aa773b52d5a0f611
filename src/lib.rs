// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # jamspread
//!
//! Traffic-jam spread prediction over road networks. Learns how likely a jam
//! on one segment is to propagate to its neighbours, simulates spread under
//! four diffusion models, and ranks the segments whose remediation would
//! prevent the most spread.
//!
//! ## Architecture
//!
//! - **Road graph** (`graph`, `segment`): petgraph-backed segments and adjacencies
//! - **History** (`history`, `dataset`): congestion observations and seed sets
//! - **Influence learning** (`influence`): per-edge, per-horizon jam propagation probabilities
//! - **Diffusion** (`diffusion`): independent cascade, linear threshold, SIR and SIS simulators
//! - **Bottlenecks** (`bottleneck`): greedy top-K selection with a ranking cache
//! - **What-if** (`whatif`): counterfactual comparison for a set of fixed segments
//! - **Tiered storage** (`store`): Hot (memory) → cold (redb)
//!
//! ## Library usage
//!
//! ```no_run
//! use jamspread::api::{BottlenecksRequest, LearnRequest};
//! use jamspread::bottleneck::CancellationToken;
//! use jamspread::config::EngineConfig;
//! use jamspread::dataset::Dataset;
//! use jamspread::engine::Engine;
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let dataset = Dataset::load(std::path::Path::new("downtown.json")).unwrap();
//! engine.register_dataset("downtown", dataset).unwrap();
//! engine
//!     .learn(&LearnRequest {
//!         dataset_id: "downtown".into(),
//!         time_horizons: vec![5, 15, 30],
//!         model_type: "LIM".into(),
//!     })
//!     .unwrap();
//! let ranking = engine
//!     .top_k_bottlenecks(
//!         &BottlenecksRequest {
//!             dataset_id: "downtown".into(),
//!             k: 5,
//!             time_horizon_minutes: 30,
//!             model_type: "LIM".into(),
//!             force_recompute: false,
//!         },
//!         &CancellationToken::new(),
//!     )
//!     .unwrap();
//! ```

pub mod api;
pub mod bottleneck;
pub mod config;
pub mod dataset;
pub mod diffusion;
pub mod engine;
pub mod error;
pub mod flows;
pub mod graph;
pub mod history;
pub mod influence;
pub mod segment;
pub mod store;
pub mod whatif;
