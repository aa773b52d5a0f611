//! Linear threshold (`LTM`).
//!
//! A segment jams once the summed influence from its jammed upstream
//! neighbours reaches the threshold. Activation only ever adds segments, so
//! the sweep converges to the least fixpoint regardless of visiting order.
//! The model is deterministic: every jammed segment is reported at 1.0.

use crate::influence::ModelType;

use super::{DiffusionGraph, DiffusionModel, SimulationParams};

#[derive(Debug, Clone, Copy)]
pub struct LinearThreshold {
    threshold: f64,
    max_rounds: usize,
}

impl LinearThreshold {
    pub fn new(threshold: f64, max_rounds: usize) -> Self {
        Self {
            threshold,
            max_rounds,
        }
    }

    /// Jammed flag per node at the fixpoint.
    pub fn fixpoint(&self, graph: &DiffusionGraph, seeds: &[usize]) -> Vec<bool> {
        let mut active = vec![false; graph.node_count()];
        for &s in seeds {
            active[s] = true;
        }

        let mut rounds = 0;
        loop {
            let newly: Vec<usize> = (0..graph.node_count())
                .filter(|&v| !active[v])
                .filter(|&v| {
                    let pressure: f64 = graph
                        .incoming(v)
                        .iter()
                        .filter(|&&(u, _)| active[u])
                        .map(|&(_, p)| p)
                        .sum();
                    pressure >= self.threshold
                })
                .collect();
            if newly.is_empty() {
                break;
            }
            for v in newly {
                active[v] = true;
            }
            rounds += 1;
            if rounds >= self.max_rounds {
                tracing::warn!(rounds, "threshold fixpoint hit the round limit");
                break;
            }
        }
        active
    }
}

impl DiffusionModel for LinearThreshold {
    fn model_type(&self) -> ModelType {
        ModelType::Ltm
    }

    fn simulate(
        &self,
        graph: &DiffusionGraph,
        seeds: &[usize],
        _params: &SimulationParams,
    ) -> Vec<f64> {
        self.fixpoint(graph, seeds)
            .into_iter()
            .map(|jammed| if jammed { 1.0 } else { 0.0 })
            .collect()
    }
}
