use crate::artifact::{RankingSink, SignalWeight};
use crate::dataset::Dataset;
use crate::fusion::FUSED_SIGNAL;
use crate::metrics::{AggregateMetrics, MetricsAccumulator, score_report};
use crate::optimizer::{GlobalOptimizer, OptimizationOutcome, WeightEstimate, estimate_weights};
use crate::ranking::build_ranked_list;
use bugrank_core::constants;
use bugrank_core::error::EngineError;
use bugrank_core::types::WeightVector;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to write ranking for bug_id={bug_id}: {source}")]
    Sink {
        bug_id: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEvaluation {
    pub bug_id: String,
    pub fixed_ranks: Vec<usize>,
    pub reciprocal_rank: f64,
    pub average_precision: f64,
    pub top_n_hit: Vec<bool>,
    pub precision_at_n: Vec<f64>,
    pub recall_at_n: Vec<f64>,
    pub f1_at_n: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub version: String,
    pub dataset: String,
    pub fingerprint: String,
    pub signals: Vec<SignalWeight>,
    #[serde(flatten)]
    pub metrics: AggregateMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization: Option<OptimizationOutcome>,
    pub per_report: Vec<ReportEvaluation>,
}

/// Fit fusion weights on every report of the dataset.
pub fn estimate(
    dataset: &Dataset,
    optimizer: &dyn GlobalOptimizer,
) -> Result<WeightEstimate, EngineError> {
    let stack = dataset.signal_stack()?;
    estimate_weights(&stack, dataset.truth(), optimizer)
}

/// Fuse with fixed weights, rank every report, score it, and stream the
/// ranking to `sink` in ground-truth report order.
///
/// Every report is processed; the first failure aborts the run and names
/// the report.
pub fn evaluate(
    dataset: &Dataset,
    weights: &WeightVector,
    top_n: &[usize],
    sink: &mut dyn RankingSink,
) -> Result<EvaluationReport, EvaluationError> {
    let stack = dataset.signal_stack()?;
    let fused = stack.fuse(weights)?;
    let index = dataset.index();

    let mut accumulator = MetricsAccumulator::new(top_n);
    let mut per_report = Vec::with_capacity(dataset.truth().len());
    for truth in dataset.truth().reports() {
        let bug_id = truth.bug_id();
        let row = fused
            .row(bug_id)
            .ok_or_else(|| EngineError::missing_score_row(FUSED_SIGNAL, bug_id))?;
        let ranked = build_ranked_list(row, index)?;
        let metrics = score_report(&ranked, truth, top_n)?;

        let files: Vec<&str> = ranked.files(index).collect();
        sink.write_ranking(bug_id, &files)
            .map_err(|source| EvaluationError::Sink {
                bug_id: bug_id.to_string(),
                source,
            })?;

        accumulator.push(&metrics);
        per_report.push(ReportEvaluation {
            bug_id: bug_id.to_string(),
            fixed_ranks: metrics.fixed_ranks,
            reciprocal_rank: metrics.reciprocal_rank,
            average_precision: metrics.average_precision,
            top_n_hit: metrics.top_n_hit,
            precision_at_n: metrics.precision_at_n,
            recall_at_n: metrics.recall_at_n,
            f1_at_n: metrics.f1_at_n,
        });
    }
    sink.finish().map_err(|source| EvaluationError::Sink {
        bug_id: "*".to_string(),
        source,
    })?;

    let metrics = accumulator.finish();
    tracing::info!(
        dataset = dataset.name(),
        reports = metrics.total_reports,
        mrr = metrics.mrr,
        map = metrics.map,
        "evaluation complete"
    );

    Ok(EvaluationReport {
        version: constants::EVALUATION_REPORT_VERSION.to_string(),
        dataset: dataset.name().to_string(),
        fingerprint: dataset.fingerprint().to_string(),
        signals: stack
            .signals()
            .iter()
            .zip(weights.as_slice())
            .map(|(name, weight)| SignalWeight {
                name: (*name).to_string(),
                weight: *weight,
            })
            .collect(),
        metrics,
        optimization: None,
        per_report,
    })
}

/// Estimate weights, then evaluate with them on the same reports.
///
/// There is no held-out split: the reported metrics are training-set
/// metrics.
pub fn run(
    dataset: &Dataset,
    optimizer: &dyn GlobalOptimizer,
    top_n: &[usize],
    sink: &mut dyn RankingSink,
) -> Result<(WeightEstimate, EvaluationReport), EvaluationError> {
    let fitted = estimate(dataset, optimizer)?;
    let mut report = evaluate(dataset, &fitted.weights, top_n, sink)?;
    report.optimization = Some(fitted.outcome.clone());
    Ok((fitted, report))
}

pub fn render_summary_table(report: &EvaluationReport) -> String {
    let metrics = &report.metrics;
    let mut output = String::new();
    output.push_str("Bug Localization Summary\n");
    output.push_str("========================\n");
    output.push_str(&format!(
        "dataset={} total_reports={} fingerprint={}\n",
        report.dataset,
        metrics.total_reports,
        report.fingerprint.chars().take(12).collect::<String>()
    ));
    output.push_str("weights=");
    output.push_str(
        &report
            .signals
            .iter()
            .map(|signal| format!("{}:{:.4}", signal.name, signal.weight))
            .collect::<Vec<_>>()
            .join(","),
    );
    output.push('\n');
    if let Some(optimization) = &report.optimization {
        output.push_str(&format!(
            "optimizer={} cost={:.4} iterations={} evaluations={} converged={}\n",
            optimization.strategy,
            optimization.cost,
            optimization.iterations,
            optimization.evaluations,
            optimization.converged
        ));
    }
    output.push_str(&format!("mrr={:.4} map={:.4}\n", metrics.mrr, metrics.map));
    output.push_str("\nTop-N:\n");
    output.push_str(&format!(
        "  {:<6} {:>6} {:>8} {:>10} {:>8} {:>8}\n",
        "N", "hits", "rate", "precision", "recall", "f1"
    ));
    for (k, n) in metrics.top_n.iter().enumerate() {
        output.push_str(&format!(
            "  {:<6} {:>6} {:>8.4} {:>10.4} {:>8.4} {:>8.4}\n",
            n,
            metrics.top_n_hits.get(k).copied().unwrap_or(0),
            metrics.top_n_rates.get(k).copied().unwrap_or(0.0),
            metrics.precision_at_n.get(k).copied().unwrap_or(0.0),
            metrics.recall_at_n.get(k).copied().unwrap_or(0.0),
            metrics.f1_at_n.get(k).copied().unwrap_or(0.0),
        ));
    }
    output
}
