use super::{
    GlobalOptimizer, OptimizationOutcome, SearchProblem, build_pool, evaluate_batch,
    scale_to_bounds,
};
use bugrank_core::config::OptimizerConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform sampling baseline. Each iteration draws one batch of candidates
/// and keeps the best seen so far; it only reports convergence when the
/// cost floor is hit.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    seed: u64,
    max_iterations: usize,
    batch_per_dimension: usize,
    workers: usize,
}

impl RandomSearch {
    pub fn new(seed: u64, max_iterations: usize, workers: usize) -> Self {
        Self {
            seed,
            max_iterations,
            batch_per_dimension: 15,
            workers,
        }
    }

    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self {
            batch_per_dimension: config.population_size.max(1),
            ..Self::new(
                config.seed,
                config.max_iterations,
                config.effective_workers(),
            )
        }
    }
}

impl GlobalOptimizer for RandomSearch {
    fn name(&self) -> &'static str {
        "random_search"
    }

    fn minimize(&self, problem: &SearchProblem<'_>) -> OptimizationOutcome {
        let bounds = &problem.bounds;
        let dimensions = bounds.len();
        let batch = (self.batch_per_dimension * dimensions).max(1);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let pool = build_pool(self.workers);

        let mut best: Option<(Vec<f64>, f64)> = None;
        let mut iterations = 0;
        let mut evaluations = 0;
        let mut converged = false;

        while !converged && iterations < self.max_iterations.max(1) {
            iterations += 1;
            let candidates: Vec<Vec<f64>> = (0..batch)
                .map(|_| {
                    let unit: Vec<f64> =
                        (0..dimensions).map(|_| rng.gen_range(0.0..1.0)).collect();
                    scale_to_bounds(&unit, bounds)
                })
                .collect();
            let costs = evaluate_batch(pool.as_ref(), problem.cost, &candidates);
            evaluations += candidates.len();

            for (candidate, cost) in candidates.into_iter().zip(costs) {
                let improves = match &best {
                    Some((_, best_cost)) => cost < *best_cost,
                    None => true,
                };
                if improves {
                    best = Some((candidate, cost));
                }
            }
            converged = best
                .as_ref()
                .zip(problem.cost_floor)
                .is_some_and(|((_, cost), floor)| *cost <= floor);
        }

        let (parameters, cost) = best.unwrap_or_else(|| (Vec::new(), f64::INFINITY));
        OptimizationOutcome {
            strategy: self.name().to_string(),
            parameters,
            cost,
            iterations,
            evaluations,
            converged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_best_sample_and_is_reproducible() {
        let cost = |point: &[f64]| (point[0] - 0.5).abs() + (point[1] - 0.5).abs();
        let problem = SearchProblem {
            bounds: vec![(0.0, 1.0); 2],
            cost: &cost,
            cost_floor: None,
        };
        let first = RandomSearch::new(3, 20, 1).minimize(&problem);
        let second = RandomSearch::new(3, 20, 3).minimize(&problem);
        assert_eq!(first, second);
        assert_eq!(first.evaluations, 20 * 30);
        assert!(!first.converged);
        assert!(first.cost < 0.1);
    }

    #[test]
    fn floor_ends_the_search() {
        let step = |point: &[f64]| if point[0] > 0.5 { -2.0 } else { 0.0 };
        let problem = SearchProblem {
            bounds: vec![(0.0, 1.0)],
            cost: &step,
            cost_floor: Some(-2.0),
        };
        let outcome = RandomSearch::new(11, 100, 1).minimize(&problem);
        assert!(outcome.converged);
        assert_eq!(outcome.cost, -2.0);
        assert!(outcome.parameters[0] > 0.5);
        assert_eq!(outcome.iterations, 1);
    }
}
