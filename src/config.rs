//! Engine configuration, persisted as TOML.
//!
//! Every threshold the prediction core relies on lives here with its
//! reference default, so a partial TOML file only overrides what it names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::segment::Centroid;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Data directory for persistence. `None` for memory-only mode.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Fixed seed for every simulator call. `None` draws a fresh seed per request.
    #[serde(default)]
    pub rng_seed: Option<u64>,
    #[serde(default)]
    pub learn: LearnConfig,
    #[serde(default)]
    pub diffusion: DiffusionConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub flows: FlowConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            rng_seed: None,
            learn: LearnConfig::default(),
            diffusion: DiffusionConfig::default(),
            selection: SelectionConfig::default(),
            cache: CacheConfig::default(),
            flows: FlowConfig::default(),
        }
    }
}

/// Influence learning and seed-set derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnConfig {
    /// Congestion index at or above which a segment counts as jammed.
    pub jam_threshold: f64,
    /// How far back from the latest observation a jam still makes a seed.
    pub seed_lookback_minutes: u32,
    /// Segments used as seeds when nothing is currently jammed.
    pub fallback_seed_count: usize,
    /// Sample count for the `high` confidence tier.
    pub confidence_high_samples: u32,
    /// Sample count for the `medium` confidence tier.
    pub confidence_medium_samples: u32,
    /// Horizons learned when a ranking is requested before any learning ran.
    pub default_horizons: Vec<u32>,
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            jam_threshold: 0.7,
            seed_lookback_minutes: 30,
            fallback_seed_count: 5,
            confidence_high_samples: 10,
            confidence_medium_samples: 5,
            default_horizons: vec![5, 15, 30],
        }
    }
}

/// Simulator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffusionConfig {
    /// Monte Carlo trials when the request does not say.
    pub default_simulations: usize,
    /// Monte Carlo trials for SIR/SIS when the request does not say.
    pub epidemic_simulations: usize,
    /// Incoming influence sum that activates a segment under LTM.
    pub ltm_threshold: f64,
    /// Probability at or above which a prediction is `high` risk.
    pub risk_high: f64,
    /// Probability at or above which a prediction is `medium` risk.
    pub risk_medium: f64,
    /// Upper bound on cascade rounds and threshold fixpoint iterations.
    pub max_rounds: usize,
    /// Scales edge probabilities into per-step infection chances (β).
    pub infection_rate: f64,
    /// Per-step chance that an infected segment recovers (γ).
    pub recovery_rate: f64,
    /// Minutes simulated by one epidemic time step.
    pub epidemic_step_minutes: u32,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            default_simulations: 100,
            epidemic_simulations: 50,
            ltm_threshold: 0.5,
            risk_high: 0.7,
            risk_medium: 0.3,
            max_rounds: 10_000,
            infection_rate: 1.0,
            recovery_rate: 0.2,
            epidemic_step_minutes: 5,
        }
    }
}

/// Greedy bottleneck selection and what-if comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Monte Carlo trials per benefit evaluation.
    pub greedy_simulations: usize,
    /// Benefit multiplier when a selection removes every seed.
    pub all_seeds_fixed_multiplier: f64,
    /// Divisor normalising Σ length × capacity into the importance term.
    pub importance_scale: f64,
    pub default_length_meters: f64,
    pub default_capacity: f64,
    /// Probability a segment must reach to count as affected.
    pub affected_threshold: f64,
    /// Minimum what-if reduction worth reporting.
    pub whatif_significance: f64,
    /// Probability counted as a jam in what-if aggregates.
    pub whatif_jam_threshold: f64,
    /// Wall-clock budget for one selection. `None` is unbounded.
    pub time_budget_secs: Option<u64>,
    /// Coordinates reported for segments without a centroid.
    pub default_centroid: Centroid,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            greedy_simulations: 50,
            all_seeds_fixed_multiplier: 10.0,
            importance_scale: 1_000_000.0,
            default_length_meters: 1000.0,
            default_capacity: 1000.0,
            affected_threshold: 0.1,
            whatif_significance: 0.1,
            whatif_jam_threshold: 0.5,
            time_budget_secs: None,
            default_centroid: Centroid {
                lat: 1.3521,
                lon: 103.8198,
            },
        }
    }
}

/// Ranking cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds a stored ranking stays valid.
    pub validity_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            validity_secs: 3600,
        }
    }
}

/// Influence-flow and bottleneck-impact listings for map overlays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Weakest influence edge listed as a flow.
    pub min_probability: f64,
    pub max_flows: usize,
    /// Weakest influence edge listed as an impact across all bottlenecks.
    pub impact_min_probability: f64,
    pub max_impacts: usize,
    /// Weakest influence edge listed when a single bottleneck is inspected.
    pub single_impact_min_probability: f64,
    pub max_single_impacts: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            min_probability: 0.3,
            max_flows: 100,
            impact_min_probability: 0.3,
            max_impacts: 50,
            single_impact_min_probability: 0.2,
            max_single_impacts: 20,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: "<memory>".into(),
            message: e.to_string(),
        })
    }

    /// Reject values no simulator can work with.
    pub fn validate(&self) -> ConfigResult<()> {
        let unit = [
            ("learn.jam_threshold", self.learn.jam_threshold),
            ("diffusion.risk_high", self.diffusion.risk_high),
            ("diffusion.risk_medium", self.diffusion.risk_medium),
            ("diffusion.recovery_rate", self.diffusion.recovery_rate),
            ("selection.affected_threshold", self.selection.affected_threshold),
            ("selection.whatif_significance", self.selection.whatif_significance),
            ("selection.whatif_jam_threshold", self.selection.whatif_jam_threshold),
            ("flows.min_probability", self.flows.min_probability),
            ("flows.impact_min_probability", self.flows.impact_min_probability),
            (
                "flows.single_impact_min_probability",
                self.flows.single_impact_min_probability,
            ),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    message: format!("{name} must lie in [0, 1], got {value}"),
                });
            }
        }
        if self.diffusion.risk_medium > self.diffusion.risk_high {
            return Err(ConfigError::Invalid {
                message: "diffusion.risk_medium must not exceed diffusion.risk_high".into(),
            });
        }
        if !(self.diffusion.ltm_threshold > 0.0) {
            return Err(ConfigError::Invalid {
                message: "diffusion.ltm_threshold must be positive".into(),
            });
        }
        if !(self.diffusion.infection_rate >= 0.0) {
            return Err(ConfigError::Invalid {
                message: "diffusion.infection_rate must be non-negative".into(),
            });
        }
        if self.diffusion.default_simulations == 0
            || self.diffusion.epidemic_simulations == 0
            || self.selection.greedy_simulations == 0
        {
            return Err(ConfigError::Invalid {
                message: "simulation counts must be positive".into(),
            });
        }
        if self.diffusion.max_rounds == 0 {
            return Err(ConfigError::Invalid {
                message: "diffusion.max_rounds must be positive".into(),
            });
        }
        if self.diffusion.epidemic_step_minutes == 0 {
            return Err(ConfigError::Invalid {
                message: "diffusion.epidemic_step_minutes must be positive".into(),
            });
        }
        if !(self.selection.importance_scale > 0.0) {
            return Err(ConfigError::Invalid {
                message: "selection.importance_scale must be positive".into(),
            });
        }
        Ok(())
    }
}
