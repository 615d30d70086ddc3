//! Per-report IR metrics and their aggregation across a report set.

use bugrank_core::error::EngineError;
use bugrank_core::types::{RankedList, ReportTruth};
use serde::{Deserialize, Serialize};

/// Metrics for one bug report; per-N vectors follow the configured cutoffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetrics {
    pub fixed_ranks: Vec<usize>,
    pub reciprocal_rank: f64,
    pub average_precision: f64,
    pub top_n_hit: Vec<bool>,
    pub precision_at_n: Vec<f64>,
    pub recall_at_n: Vec<f64>,
    pub f1_at_n: Vec<f64>,
}

/// Means across reports (hit counts are totals).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub total_reports: usize,
    pub top_n: Vec<usize>,
    pub top_n_hits: Vec<usize>,
    pub top_n_rates: Vec<f64>,
    pub mrr: f64,
    pub map: f64,
    pub precision_at_n: Vec<f64>,
    pub recall_at_n: Vec<f64>,
    pub f1_at_n: Vec<f64>,
}

/// 1-based ranks of the fixed files, ascending.
pub fn fixed_ranks(ranked: &RankedList, truth: &ReportTruth) -> Result<Vec<usize>, EngineError> {
    let ranks = ranked.ranks();
    let mut fixed = Vec::with_capacity(truth.fixed_positions().len());
    for (&position, file) in truth.fixed_positions().iter().zip(truth.fixed_files()) {
        match ranks.get(position) {
            Some(&rank) if rank > 0 => fixed.push(rank),
            _ => return Err(EngineError::missing_ground_truth_file(truth.bug_id(), file)),
        }
    }
    fixed.sort_unstable();
    Ok(fixed)
}

/// `1 / best rank`; 0 when no rank is known.
pub fn reciprocal_rank(sorted_ranks: &[usize]) -> f64 {
    sorted_ranks
        .first()
        .map(|&rank| 1.0 / rank as f64)
        .unwrap_or(0.0)
}

/// Mean of `(fixed files at or above this one) / rank` over the fixed files
/// in rank order.
pub fn average_precision(sorted_ranks: &[usize]) -> f64 {
    if sorted_ranks.is_empty() {
        return 0.0;
    }
    let sum: f64 = sorted_ranks
        .iter()
        .enumerate()
        .map(|(idx, &rank)| (idx + 1) as f64 / rank as f64)
        .sum();
    sum / sorted_ranks.len() as f64
}

/// Number of fixed files in the top `n`.
fn hits_within(sorted_ranks: &[usize], n: usize) -> usize {
    sorted_ranks.iter().take_while(|&&rank| rank <= n).count()
}

pub fn top_n_hit(sorted_ranks: &[usize], n: usize) -> bool {
    hits_within(sorted_ranks, n) > 0
}

/// Precision, recall and F1 at cutoff `n`. F1 is 0 when both are 0.
pub fn precision_recall_f1(sorted_ranks: &[usize], fixed_count: usize, n: usize) -> (f64, f64, f64) {
    if n == 0 || fixed_count == 0 {
        return (0.0, 0.0, 0.0);
    }
    let hits = hits_within(sorted_ranks, n) as f64;
    let precision = hits / n as f64;
    let recall = hits / fixed_count as f64;
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    (precision, recall, f1)
}

pub fn score_report(
    ranked: &RankedList,
    truth: &ReportTruth,
    top_n: &[usize],
) -> Result<ReportMetrics, EngineError> {
    let ranks = fixed_ranks(ranked, truth)?;
    Ok(score_ranks(ranks, top_n))
}

/// Metrics from already-computed fixed-file ranks (ascending).
pub fn score_ranks(fixed_ranks: Vec<usize>, top_n: &[usize]) -> ReportMetrics {
    let fixed_count = fixed_ranks.len();
    let mut metrics = ReportMetrics {
        reciprocal_rank: reciprocal_rank(&fixed_ranks),
        average_precision: average_precision(&fixed_ranks),
        top_n_hit: Vec::with_capacity(top_n.len()),
        precision_at_n: Vec::with_capacity(top_n.len()),
        recall_at_n: Vec::with_capacity(top_n.len()),
        f1_at_n: Vec::with_capacity(top_n.len()),
        fixed_ranks: Vec::new(),
    };
    for &n in top_n {
        let (precision, recall, f1) = precision_recall_f1(&fixed_ranks, fixed_count, n);
        metrics.top_n_hit.push(top_n_hit(&fixed_ranks, n));
        metrics.precision_at_n.push(precision);
        metrics.recall_at_n.push(recall);
        metrics.f1_at_n.push(f1);
    }
    metrics.fixed_ranks = fixed_ranks;
    metrics
}

/// Running sums for [`AggregateMetrics`].
#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    top_n: Vec<usize>,
    count: usize,
    hits: Vec<usize>,
    rr_sum: f64,
    ap_sum: f64,
    precision_sum: Vec<f64>,
    recall_sum: Vec<f64>,
    f1_sum: Vec<f64>,
}

impl MetricsAccumulator {
    pub fn new(top_n: &[usize]) -> Self {
        Self {
            top_n: top_n.to_vec(),
            count: 0,
            hits: vec![0; top_n.len()],
            rr_sum: 0.0,
            ap_sum: 0.0,
            precision_sum: vec![0.0; top_n.len()],
            recall_sum: vec![0.0; top_n.len()],
            f1_sum: vec![0.0; top_n.len()],
        }
    }

    pub fn push(&mut self, report: &ReportMetrics) {
        self.count += 1;
        self.rr_sum += report.reciprocal_rank;
        self.ap_sum += report.average_precision;
        for k in 0..self.top_n.len() {
            if report.top_n_hit.get(k).copied().unwrap_or(false) {
                self.hits[k] += 1;
            }
            self.precision_sum[k] += report.precision_at_n.get(k).copied().unwrap_or(0.0);
            self.recall_sum[k] += report.recall_at_n.get(k).copied().unwrap_or(0.0);
            self.f1_sum[k] += report.f1_at_n.get(k).copied().unwrap_or(0.0);
        }
    }

    pub fn finish(self) -> AggregateMetrics {
        let total = self.count.max(1) as f64;
        let mean = |values: Vec<f64>| values.into_iter().map(|v| v / total).collect::<Vec<_>>();
        AggregateMetrics {
            total_reports: self.count,
            top_n_rates: self.hits.iter().map(|&h| h as f64 / total).collect(),
            top_n_hits: self.hits,
            top_n: self.top_n,
            mrr: self.rr_sum / total,
            map: self.ap_sum / total,
            precision_at_n: mean(self.precision_sum),
            recall_at_n: mean(self.recall_sum),
            f1_at_n: mean(self.f1_sum),
        }
    }
}
