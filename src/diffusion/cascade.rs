//! Independent cascade (`LIM`).
//!
//! Each newly jammed segment gets one chance to jam each downstream neighbour,
//! succeeding with the edge's influence probability. We use the equivalent
//! live-edge form: a trial first decides which edges are live, then everything
//! reachable from the seeds over live edges is jammed. Drawing every edge in a
//! fixed order means two runs with the same request seed share their coins, so
//! removing seeds can only shrink each trial's jammed set.

use rand::Rng;

use crate::influence::ModelType;

use super::{DiffusionGraph, DiffusionModel, SimulationParams, monte_carlo};

#[derive(Debug, Clone, Copy)]
pub struct IndependentCascade {
    max_rounds: usize,
}

impl IndependentCascade {
    pub fn new(max_rounds: usize) -> Self {
        Self { max_rounds }
    }
}

impl DiffusionModel for IndependentCascade {
    fn model_type(&self) -> ModelType {
        ModelType::Lim
    }

    fn simulate(
        &self,
        graph: &DiffusionGraph,
        seeds: &[usize],
        params: &SimulationParams,
    ) -> Vec<f64> {
        if seeds.is_empty() {
            return vec![0.0; graph.node_count()];
        }
        monte_carlo(graph.node_count(), params, 1, |rng, counts| {
            let live: Vec<bool> = graph
                .edges()
                .iter()
                .map(|&(_, _, p)| rng.r#gen::<f64>() < p)
                .collect();

            let mut active = vec![false; graph.node_count()];
            let mut frontier = Vec::with_capacity(seeds.len());
            for &s in seeds {
                if !active[s] {
                    active[s] = true;
                    frontier.push(s);
                }
            }

            let mut rounds = 0;
            while !frontier.is_empty() && rounds < self.max_rounds {
                let mut next = Vec::new();
                for &u in &frontier {
                    for &(v, e) in graph.outgoing(u) {
                        if live[e] && !active[v] {
                            active[v] = true;
                            next.push(v);
                        }
                    }
                }
                frontier = next;
                rounds += 1;
            }

            for (count, jammed) in counts.iter_mut().zip(active) {
                if jammed {
                    *count += 1;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiffusionConfig;
    use crate::diffusion::simulate;
    use crate::diffusion::tests::{chain, params, seg};

    #[test]
    fn chain_matches_path_products() {
        let g = chain();
        let d = simulate(
            &g,
            ModelType::Lim,
            &[seg(1)],
            &params(1000, 42),
            &DiffusionConfig::default(),
        )
        .unwrap();
        assert_eq!(d.probability_of(seg(1)), 1.0);
        assert!((d.probability_of(seg(2)) - 0.8).abs() < 0.05);
        assert!((d.probability_of(seg(3)) - 0.48).abs() < 0.05);
    }

    #[test]
    fn same_seed_same_answer() {
        let g = chain();
        let model = IndependentCascade::new(10_000);
        let a = model.simulate(&g, &[0], &params(300, 9));
        let b = model.simulate(&g, &[0], &params(300, 9));
        assert_eq!(a, b);
    }

    #[test]
    fn removing_seeds_never_raises_probability() {
        let g = chain();
        let model = IndependentCascade::new(10_000);
        let p = params(200, 17);
        let both = model.simulate(&g, &[0, 1], &p);
        let fewer = model.simulate(&g, &[1], &p);
        for (x, y) in fewer.iter().zip(&both) {
            assert!(x <= y);
        }
    }

    #[test]
    fn more_trials_only_shrink_sampling_noise() {
        let g = chain();
        let model = IndependentCascade::new(10_000);
        let few = model.simulate(&g, &[0], &params(100, 5));
        let many = model.simulate(&g, &[0], &params(5000, 5));
        for (i, (a, b)) in few.iter().zip(&many).enumerate() {
            // Four standard errors of the difference between the two means.
            let se = (b * (1.0 - b) * (1.0 / 100.0 + 1.0 / 5000.0)).sqrt();
            assert!((a - b).abs() <= 4.0 * se, "segment {i}: {a} vs {b}");
        }
        assert!((many[1] - 0.8).abs() < 0.03);
        assert!((many[2] - 0.48).abs() < 0.03);
    }

    #[test]
    fn round_limit_bounds_spread() {
        let g = chain();
        let one_round = IndependentCascade::new(1).simulate(&g, &[0], &params(200, 3));
        assert_eq!(one_round[2], 0.0);
        assert!(one_round[1] > 0.0);
    }

    #[test]
    fn certain_edges_always_fire() {
        use crate::graph::RoadGraph;
        use crate::influence::InfluenceTable;
        use crate::segment::RoadSegment;

        let road = RoadGraph::new();
        for id in 1..=3 {
            road.insert_segment(RoadSegment::new(seg(id), format!("S{id}"))).unwrap();
        }
        let table = InfluenceTable::from_edges([(seg(1), seg(2), 1.0), (seg(2), seg(3), 0.0)]);
        let g = DiffusionGraph::build(&road, &table).unwrap();
        let probs = IndependentCascade::new(10).simulate(&g, &[0], &params(50, 1));
        assert_eq!(probs, vec![1.0, 1.0, 0.0]);
    }
}
