use super::{
    GlobalOptimizer, OptimizationOutcome, SearchProblem, build_pool, evaluate_batch,
    scale_to_bounds,
};
use bugrank_core::config::OptimizerConfig;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

const MIN_POPULATION: usize = 5;

/// Differential evolution, `rand-to-best/1` mutation with exponential
/// crossover.
///
/// The population lives in the unit cube and is scaled onto the problem
/// bounds only for cost evaluation. Trial vectors for a whole generation
/// are drawn first, on one RNG, and then costed in parallel; selection is
/// applied once all costs are back. This keeps results independent of the
/// worker count.
#[derive(Debug, Clone)]
pub struct DifferentialEvolution {
    seed: u64,
    max_iterations: usize,
    population_size: usize,
    mutation: (f64, f64),
    recombination: f64,
    tolerance: f64,
    absolute_tolerance: f64,
    workers: usize,
}

impl DifferentialEvolution {
    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self {
            seed: config.seed,
            max_iterations: config.max_iterations,
            population_size: config.population_size.max(1),
            mutation: (
                config.mutation_min.min(config.mutation_max),
                config.mutation_min.max(config.mutation_max),
            ),
            recombination: config.recombination.clamp(0.0, 1.0),
            tolerance: config.tolerance,
            absolute_tolerance: config.absolute_tolerance,
            workers: config.effective_workers(),
        }
    }

    fn population_count(&self, dimensions: usize) -> usize {
        (self.population_size * dimensions).max(MIN_POPULATION)
    }

    /// Draw a mutation factor for one generation (dithering).
    fn mutation_factor(&self, rng: &mut StdRng) -> f64 {
        let (low, high) = self.mutation;
        if high > low {
            rng.gen_range(low..high)
        } else {
            low
        }
    }

    fn trial(
        &self,
        candidate: usize,
        best: usize,
        population: &[Vec<f64>],
        factor: f64,
        rng: &mut StdRng,
    ) -> Vec<f64> {
        let dimensions = population[candidate].len();
        let picks: Vec<usize> = sample(rng, population.len() - 1, 3)
            .into_iter()
            .map(|idx| if idx >= candidate { idx + 1 } else { idx })
            .collect();
        let (r0, r1, r2) = (picks[0], picks[1], picks[2]);

        let mut trial = population[candidate].clone();
        let mut fill = rng.gen_range(0..dimensions);
        for step in 0..dimensions {
            // The first coordinate is always crossed over.
            if step > 0 && rng.gen_range(0.0..1.0) >= self.recombination {
                break;
            }
            let base = population[r0][fill];
            trial[fill] = base
                + factor * (population[best][fill] - base)
                + factor * (population[r1][fill] - population[r2][fill]);
            fill = (fill + 1) % dimensions;
        }

        for value in &mut trial {
            if !(0.0..=1.0).contains(&*value) {
                *value = rng.gen_range(0.0..1.0);
            }
        }
        trial
    }

    fn converged(&self, energies: &[f64]) -> bool {
        let count = energies.len() as f64;
        let mean = energies.iter().sum::<f64>() / count;
        let variance = energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / count;
        let spread = variance.sqrt();
        spread.is_finite() && spread <= self.absolute_tolerance + self.tolerance * mean.abs()
    }
}

/// One stratified sample per population member along every dimension.
fn latin_hypercube(rng: &mut StdRng, count: usize, dimensions: usize) -> Vec<Vec<f64>> {
    let mut population = vec![vec![0.0; dimensions]; count];
    for dim in 0..dimensions {
        let mut column: Vec<f64> = (0..count)
            .map(|slot| (slot as f64 + rng.gen_range(0.0..1.0)) / count as f64)
            .collect();
        column.shuffle(rng);
        for (member, value) in population.iter_mut().zip(column) {
            member[dim] = value;
        }
    }
    population
}

fn best_index(energies: &[f64]) -> usize {
    let mut best = 0;
    for (idx, energy) in energies.iter().enumerate() {
        if *energy < energies[best] {
            best = idx;
        }
    }
    best
}

fn reached_floor(problem: &SearchProblem<'_>, cost: f64) -> bool {
    problem.cost_floor.is_some_and(|floor| cost <= floor)
}

impl GlobalOptimizer for DifferentialEvolution {
    fn name(&self) -> &'static str {
        "differential_evolution"
    }

    fn minimize(&self, problem: &SearchProblem<'_>) -> OptimizationOutcome {
        let bounds = &problem.bounds;
        let dimensions = bounds.len();
        if dimensions == 0 {
            return OptimizationOutcome {
                strategy: self.name().to_string(),
                parameters: Vec::new(),
                cost: (problem.cost)(&[]),
                iterations: 0,
                evaluations: 1,
                converged: true,
            };
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let pool = build_pool(self.workers);
        let count = self.population_count(dimensions);
        tracing::debug!(
            population = count,
            dimensions,
            workers = self.workers,
            "starting differential evolution"
        );

        let mut population = latin_hypercube(&mut rng, count, dimensions);
        let scaled: Vec<Vec<f64>> = population
            .iter()
            .map(|member| scale_to_bounds(member, bounds))
            .collect();
        let mut energies = evaluate_batch(pool.as_ref(), problem.cost, &scaled);
        let mut evaluations = count;
        let mut best = best_index(&energies);
        let mut iterations = 0;
        let mut converged = reached_floor(problem, energies[best]);

        while !converged && iterations < self.max_iterations {
            iterations += 1;
            let factor = self.mutation_factor(&mut rng);
            let trials: Vec<Vec<f64>> = (0..count)
                .map(|candidate| self.trial(candidate, best, &population, factor, &mut rng))
                .collect();
            let scaled: Vec<Vec<f64>> = trials
                .iter()
                .map(|member| scale_to_bounds(member, bounds))
                .collect();
            let trial_energies = evaluate_batch(pool.as_ref(), problem.cost, &scaled);
            evaluations += count;

            for (idx, (trial, energy)) in trials.into_iter().zip(trial_energies).enumerate() {
                if energy <= energies[idx] {
                    population[idx] = trial;
                    energies[idx] = energy;
                }
            }
            best = best_index(&energies);

            tracing::debug!(
                generation = iterations,
                best = energies[best],
                "differential evolution generation"
            );
            converged = reached_floor(problem, energies[best]) || self.converged(&energies);
        }

        OptimizationOutcome {
            strategy: self.name().to_string(),
            parameters: scale_to_bounds(&population[best], bounds),
            cost: energies[best],
            iterations,
            evaluations,
            converged,
        }
    }
}
