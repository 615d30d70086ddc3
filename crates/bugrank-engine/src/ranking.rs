use crate::fusion::FUSED_SIGNAL;
use bugrank_core::error::EngineError;
use bugrank_core::types::{RankedList, SourceFileIndex};
use std::cmp::Ordering;

/// `total_cmp` orders `-0.0` below `0.0`; equal scores must tie.
fn tie_key(score: f64) -> f64 {
    if score == 0.0 { 0.0 } else { score }
}

/// Descending score order; NaN-free rows are assumed (scores are validated
/// on load), `total_cmp` keeps the comparison total regardless.
fn by_score_desc(scores: &[f64], a: usize, b: usize) -> Ordering {
    tie_key(scores[b]).total_cmp(&tie_key(scores[a]))
}

/// Rank every file of the index by one combined score row.
///
/// Ties keep index order (stable sort), so the result is reproducible
/// across runs and platforms.
pub fn build_ranked_list(
    scores: &[f64],
    index: &SourceFileIndex,
) -> Result<RankedList, EngineError> {
    if index.is_empty() {
        return Err(EngineError::EmptyIndex);
    }
    if scores.len() != index.len() {
        return Err(EngineError::dimension_mismatch(
            FUSED_SIGNAL,
            "*",
            index.len(),
            scores.len(),
        ));
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| by_score_desc(scores, a, b));
    Ok(RankedList::from_order(order))
}

/// 1-based rank `position` would get from [`build_ranked_list`], computed in
/// one pass without sorting: files scoring higher, plus tied files earlier
/// in the index, come first.
pub fn rank_of(scores: &[f64], position: usize) -> usize {
    let Some(target) = scores.get(position) else {
        return scores.len() + 1;
    };
    let target = tie_key(*target);
    let ahead = scores
        .iter()
        .enumerate()
        .filter(|(idx, score)| match tie_key(**score).total_cmp(&target) {
            Ordering::Greater => true,
            Ordering::Equal => *idx < position,
            Ordering::Less => false,
        })
        .count();
    ahead + 1
}
