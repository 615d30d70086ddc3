use bugrank_core::error::EngineError;
use bugrank_core::types::ScoreMatrix;

/// Min-max rescale one report's scores into [0, 1].
///
/// A flat row (`max == min`, including all zeros) maps to all zeros, so a
/// signal with nothing to say about a report contributes nothing to fusion.
pub fn min_max_normalize(scores: &[f64]) -> Vec<f64> {
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if scores.is_empty() || max <= min {
        return vec![0.0; scores.len()];
    }
    let range = max - min;
    if range.is_finite() {
        return scores
            .iter()
            .map(|score| ((score - min) / range).clamp(0.0, 1.0))
            .collect();
    }
    // Finite endpoints far apart overflow `max - min`; halving first cannot.
    let half_range = max / 2.0 - min / 2.0;
    scores
        .iter()
        .map(|score| ((score / 2.0 - min / 2.0) / half_range).clamp(0.0, 1.0))
        .collect()
}

fn is_flat(scores: &[f64]) -> bool {
    scores.windows(2).all(|pair| pair[0] == pair[1])
}

/// Normalize every report row of a matrix independently.
///
/// Raw scores may be any finite value; NaN or infinite entries are rejected.
pub fn normalize_matrix(matrix: &ScoreMatrix) -> Result<ScoreMatrix, EngineError> {
    let mut rows = Vec::with_capacity(matrix.len());
    for (bug_id, row) in matrix.iter() {
        if let Some((index, &value)) = row.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(EngineError::InvalidScore {
                signal: matrix.signal().to_string(),
                bug_id: bug_id.to_string(),
                index,
                value,
            });
        }
        let normalized = min_max_normalize(row);
        if !row.is_empty() && is_flat(row) {
            tracing::debug!(
                signal = matrix.signal(),
                bug_id,
                "degenerate score row; signal contributes nothing for this report"
            );
        }
        rows.push((bug_id.to_string(), normalized));
    }
    ScoreMatrix::new(matrix.signal(), rows)
}
