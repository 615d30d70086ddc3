//! Weight estimation: a bounded, derivative-free global search over the
//! fusion weights, scored by ranking quality.

mod differential_evolution;
mod random_search;

pub use differential_evolution::DifferentialEvolution;
pub use random_search::RandomSearch;

use crate::fusion::SignalStack;
use crate::metrics::{average_precision, reciprocal_rank};
use crate::ranking::rank_of;
use bugrank_core::config::{OptimizerConfig, OptimizerStrategy};
use bugrank_core::error::EngineError;
use bugrank_core::types::{GroundTruth, WeightVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Best possible cost: MRR = MAP = 1 on every report.
pub const PERFECT_COST: f64 = -2.0;

/// Objective handed to a [`GlobalOptimizer`]; must be safe to call from
/// several worker threads at once.
pub type CostFn<'a> = dyn Fn(&[f64]) -> f64 + Sync + 'a;

/// A box-constrained minimization problem.
pub struct SearchProblem<'a> {
    pub bounds: Vec<(f64, f64)>,
    pub cost: &'a CostFn<'a>,
    /// Known lower bound of `cost`; reaching it ends the search early.
    pub cost_floor: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub strategy: String,
    pub parameters: Vec<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
}

/// Derivative-free global search over a bounded box.
///
/// Implementations must be deterministic for a fixed configuration
/// (including the seed), independent of how many workers evaluate costs.
pub trait GlobalOptimizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn minimize(&self, problem: &SearchProblem<'_>) -> OptimizationOutcome;
}

/// Build the optimizer selected by configuration.
pub fn build_optimizer(config: &OptimizerConfig) -> Box<dyn GlobalOptimizer> {
    match config.strategy_typed() {
        OptimizerStrategy::DifferentialEvolution => {
            Box::new(DifferentialEvolution::from_config(config))
        }
        OptimizerStrategy::RandomSearch => Box::new(RandomSearch::from_config(config)),
    }
}

/// Evaluate costs for a batch of candidates, in candidate order.
///
/// Falls back to serial evaluation when no pool is available; either way
/// the returned vector is identical.
pub(crate) fn evaluate_batch(
    pool: Option<&rayon::ThreadPool>,
    cost: &CostFn<'_>,
    candidates: &[Vec<f64>],
) -> Vec<f64> {
    match pool {
        Some(pool) => pool.install(|| {
            candidates
                .par_iter()
                .map(|candidate| cost(candidate))
                .collect()
        }),
        None => candidates.iter().map(|candidate| cost(candidate)).collect(),
    }
}

pub(crate) fn build_pool(workers: usize) -> Option<rayon::ThreadPool> {
    if workers <= 1 {
        return None;
    }
    match rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|idx| format!("bugrank-opt-{idx}"))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(err) => {
            tracing::warn!(workers, error = %err, "failed to start optimizer worker pool; evaluating serially");
            None
        }
    }
}

/// Map unit-cube coordinates onto the problem bounds.
pub(crate) fn scale_to_bounds(unit: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    unit.iter()
        .zip(bounds)
        .map(|(u, (low, high))| low + u * (high - low))
        .collect()
}

/// `-(mean reciprocal rank + mean average precision)` of the rankings
/// produced by fusing with `weights`.
///
/// Ranks come from [`rank_of`], which matches the stable sort of the rank
/// builder without sorting every candidate's rows.
pub fn ranking_cost(stack: &SignalStack<'_>, truth: &GroundTruth, weights: &[f64]) -> f64 {
    let reports = truth.reports();
    if reports.is_empty() || stack.check_weights(weights).is_err() {
        return f64::INFINITY;
    }
    let mut rr_sum = 0.0;
    let mut ap_sum = 0.0;
    for (report_idx, report) in reports.iter().enumerate() {
        let fused = stack.fuse_report(report_idx, weights);
        let mut ranks: Vec<usize> = report
            .fixed_positions()
            .iter()
            .map(|&position| rank_of(&fused, position))
            .collect();
        ranks.sort_unstable();
        rr_sum += reciprocal_rank(&ranks);
        ap_sum += average_precision(&ranks);
    }
    let total = reports.len() as f64;
    -(rr_sum / total + ap_sum / total)
}

/// Learned weights plus the search record that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEstimate {
    pub weights: WeightVector,
    pub outcome: OptimizationOutcome,
}

/// Fit one weight per signal in `[0, 1]` by minimizing [`ranking_cost`]
/// over the given reports.
///
/// `stack` must be aligned to `truth`'s report order. The same reports are
/// later used for evaluation; there is no held-out split.
pub fn estimate_weights(
    stack: &SignalStack<'_>,
    truth: &GroundTruth,
    optimizer: &dyn GlobalOptimizer,
) -> Result<WeightEstimate, EngineError> {
    if truth.is_empty() {
        return Err(EngineError::NoReports);
    }
    if stack.report_count() != truth.len() {
        return Err(EngineError::dimension_mismatch(
            "ground_truth",
            "*",
            stack.report_count(),
            truth.len(),
        ));
    }
    if let Some((bug_id, _)) = stack
        .bug_ids()
        .iter()
        .zip(truth.bug_ids())
        .find(|(stacked, truth_id)| **stacked != *truth_id)
    {
        return Err(EngineError::missing_score_row("ground_truth", *bug_id));
    }

    let cost = |weights: &[f64]| ranking_cost(stack, truth, weights);
    let problem = SearchProblem {
        bounds: vec![(0.0, 1.0); stack.signal_count()],
        cost: &cost,
        cost_floor: Some(PERFECT_COST),
    };

    tracing::info!(
        strategy = optimizer.name(),
        signals = stack.signal_count(),
        reports = truth.len(),
        "estimating fusion weights"
    );
    let outcome = optimizer.minimize(&problem);
    if outcome.converged {
        tracing::info!(
            cost = outcome.cost,
            iterations = outcome.iterations,
            evaluations = outcome.evaluations,
            "weight search converged"
        );
    } else {
        tracing::warn!(
            cost = outcome.cost,
            iterations = outcome.iterations,
            evaluations = outcome.evaluations,
            "weight search exhausted its budget without converging; using best weights found"
        );
    }

    Ok(WeightEstimate {
        weights: WeightVector::clamped(&outcome.parameters),
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bugrank_core::types::{ScoreMatrix, SourceFileIndex};

    fn fixture() -> (SourceFileIndex, Vec<ScoreMatrix>, GroundTruth) {
        let index = SourceFileIndex::new(["X", "Y", "Z"]).unwrap();
        let matrices = vec![
            ScoreMatrix::new("first", vec![("1".to_string(), vec![0.1, 0.9, 0.0])]).unwrap(),
            ScoreMatrix::new("second", vec![("1".to_string(), vec![0.9, 0.1, 0.0])]).unwrap(),
        ];
        let truth = GroundTruth::new(vec![("1".to_string(), vec!["Y"])], &index).unwrap();
        (index, matrices, truth)
    }

    #[test]
    fn cost_rewards_weights_that_rank_the_fix_first() {
        let (index, matrices, truth) = fixture();
        let stack = SignalStack::aligned_to(&matrices, &index, truth.bug_ids()).unwrap();
        assert_eq!(ranking_cost(&stack, &truth, &[1.0, 0.0]), PERFECT_COST);
        // Y second: RR = AP = 1/2
        assert_eq!(ranking_cost(&stack, &truth, &[0.0, 1.0]), -1.0);
        // all zero: ties keep index order, Y second
        assert_eq!(ranking_cost(&stack, &truth, &[0.0, 0.0]), -1.0);
    }

    #[test]
    fn cost_rejects_wrong_weight_count() {
        let (index, matrices, truth) = fixture();
        let stack = SignalStack::aligned_to(&matrices, &index, truth.bug_ids()).unwrap();
        assert_eq!(ranking_cost(&stack, &truth, &[1.0]), f64::INFINITY);
    }

    #[test]
    fn estimate_requires_stack_aligned_to_truth() {
        let index = SourceFileIndex::new(["X", "Y"]).unwrap();
        let matrices = vec![
            ScoreMatrix::new(
                "first",
                vec![("1".to_string(), vec![0.1, 0.9]), ("2".to_string(), vec![0.5, 0.5])],
            )
            .unwrap(),
        ];
        let truth = GroundTruth::new(
            vec![("1".to_string(), vec!["Y"]), ("2".to_string(), vec!["X"])],
            &index,
        )
        .unwrap();
        let reversed = SignalStack::aligned_to(&matrices, &index, ["2", "1"]).unwrap();
        let optimizer = RandomSearch::new(1, 1, 1);
        let err = estimate_weights(&reversed, &truth, &optimizer).unwrap_err();
        assert_eq!(err, EngineError::missing_score_row("ground_truth", "2"));
    }

    #[test]
    fn build_optimizer_follows_strategy() {
        let mut config = OptimizerConfig::default();
        assert_eq!(build_optimizer(&config).name(), "differential_evolution");
        config.strategy = "random_search".to_string();
        assert_eq!(build_optimizer(&config).name(), "random_search");
    }
}
