use bugrank_core::error::EngineError;
use bugrank_core::types::{ScoreMatrix, SourceFileIndex, WeightVector};
use std::collections::HashSet;

/// Name used for the combined matrix produced by fusion.
pub const FUSED_SIGNAL: &str = "fused";

/// K score matrices validated against one index and aligned to one report
/// order. Rows are borrowed, never copied.
#[derive(Debug, Clone)]
pub struct SignalStack<'a> {
    signals: Vec<&'a str>,
    bug_ids: Vec<&'a str>,
    // rows[report][signal]
    rows: Vec<Vec<&'a [f64]>>,
    file_count: usize,
}

impl<'a> SignalStack<'a> {
    /// Align `matrices` to the given report order.
    ///
    /// Every matrix must hold exactly one row per report, every row must
    /// match the index length, and every value must lie in [0, 1].
    pub fn aligned_to<I>(
        matrices: &'a [ScoreMatrix],
        index: &SourceFileIndex,
        report_order: I,
    ) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if matrices.is_empty() {
            return Err(EngineError::NoSignals);
        }
        if index.is_empty() {
            return Err(EngineError::EmptyIndex);
        }

        let mut seen = HashSet::new();
        for matrix in matrices {
            if !seen.insert(matrix.signal()) {
                return Err(EngineError::DuplicateSignal {
                    signal: matrix.signal().to_string(),
                });
            }
            matrix.validate_against(index)?;
        }

        let bug_ids: Vec<&'a str> = report_order.into_iter().collect();
        if bug_ids.is_empty() {
            return Err(EngineError::NoReports);
        }

        let mut rows = Vec::with_capacity(bug_ids.len());
        for bug_id in &bug_ids {
            let mut report_rows = Vec::with_capacity(matrices.len());
            for matrix in matrices {
                let row = matrix
                    .row(bug_id)
                    .ok_or_else(|| EngineError::missing_score_row(matrix.signal(), *bug_id))?;
                report_rows.push(row);
            }
            rows.push(report_rows);
        }

        for matrix in matrices {
            if matrix.len() != bug_ids.len() {
                let extra = matrix
                    .bug_ids()
                    .iter()
                    .find(|id| !bug_ids.contains(&id.as_str()))
                    .map(String::as_str)
                    .unwrap_or("*");
                return Err(EngineError::dimension_mismatch(
                    matrix.signal(),
                    extra,
                    bug_ids.len(),
                    matrix.len(),
                ));
            }
        }

        Ok(Self {
            signals: matrices.iter().map(ScoreMatrix::signal).collect(),
            bug_ids,
            rows,
            file_count: index.len(),
        })
    }

    /// Align to the report order of the first matrix.
    pub fn new(matrices: &'a [ScoreMatrix], index: &SourceFileIndex) -> Result<Self, EngineError> {
        let first = matrices.first().ok_or(EngineError::NoSignals)?;
        Self::aligned_to(
            matrices,
            index,
            first.bug_ids().iter().map(String::as_str),
        )
    }

    pub fn signals(&self) -> &[&'a str] {
        &self.signals
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn report_count(&self) -> usize {
        self.bug_ids.len()
    }

    pub fn bug_ids(&self) -> &[&'a str] {
        &self.bug_ids
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn check_weights(&self, weights: &[f64]) -> Result<(), EngineError> {
        if weights.len() != self.signals.len() {
            return Err(EngineError::WeightCountMismatch {
                expected: self.signals.len(),
                actual: weights.len(),
            });
        }
        Ok(())
    }

    /// Weighted sum of one report's rows. `weights` must have one entry per
    /// signal; callers go through [`SignalStack::check_weights`] first.
    pub fn fuse_report(&self, report: usize, weights: &[f64]) -> Vec<f64> {
        let mut fused = vec![0.0; self.file_count];
        if let Some(report_rows) = self.rows.get(report) {
            for (row, weight) in report_rows.iter().zip(weights) {
                for (acc, score) in fused.iter_mut().zip(row.iter()) {
                    *acc += weight * score;
                }
            }
        }
        fused
    }

    /// Fuse every report into one combined matrix. No renormalization is
    /// applied after the weighted sum.
    pub fn fuse(&self, weights: &WeightVector) -> Result<ScoreMatrix, EngineError> {
        self.check_weights(weights.as_slice())?;
        let rows = (0..self.report_count())
            .map(|report| {
                (
                    self.bug_ids[report].to_string(),
                    self.fuse_report(report, weights.as_slice()),
                )
            })
            .collect();
        ScoreMatrix::new(FUSED_SIGNAL, rows)
    }
}

/// Combine K aligned matrices with one weight per matrix.
pub fn fuse(
    matrices: &[ScoreMatrix],
    weights: &WeightVector,
    index: &SourceFileIndex,
) -> Result<ScoreMatrix, EngineError> {
    if !matrices.is_empty() && weights.len() != matrices.len() {
        return Err(EngineError::WeightCountMismatch {
            expected: matrices.len(),
            actual: weights.len(),
        });
    }
    SignalStack::new(matrices, index)?.fuse(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(files: &[&str]) -> SourceFileIndex {
        SourceFileIndex::new(files.iter().copied()).expect("index")
    }

    fn matrix(signal: &str, rows: &[(&str, &[f64])]) -> ScoreMatrix {
        ScoreMatrix::new(
            signal,
            rows.iter()
                .map(|(id, row)| (id.to_string(), row.to_vec()))
                .collect(),
        )
        .expect("matrix")
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn fused_row_is_elementwise_weighted_sum() {
        let index = index(&["A", "B"]);
        let matrices = vec![
            matrix("vsm_similarity", &[("1", &[0.2, 0.8])]),
            matrix("semantic_similarity", &[("1", &[0.6, 0.4])]),
        ];
        let weights = WeightVector::new(vec![0.5, 0.5]).unwrap();
        let fused = fuse(&matrices, &weights, &index).expect("fuse");
        assert_eq!(fused.signal(), FUSED_SIGNAL);
        assert_close(fused.row("1").unwrap(), &[0.4, 0.6]);
    }

    #[test]
    fn weights_are_a_free_combination_not_convex() {
        let index = index(&["A", "B"]);
        let matrices = vec![
            matrix("a", &[("1", &[1.0, 0.5])]),
            matrix("b", &[("1", &[1.0, 0.0])]),
        ];
        let weights = WeightVector::new(vec![1.0, 1.0]).unwrap();
        let fused = fuse(&matrices, &weights, &index).unwrap();
        assert_close(fused.row("1").unwrap(), &[2.0, 0.5]);
    }

    #[test]
    fn stack_aligns_rows_by_bug_id() {
        let index = index(&["A", "B"]);
        let matrices = vec![
            matrix("a", &[("1", &[1.0, 0.0]), ("2", &[0.0, 1.0])]),
            matrix("b", &[("2", &[0.5, 0.5]), ("1", &[0.25, 0.75])]),
        ];
        let stack = SignalStack::aligned_to(&matrices, &index, ["2", "1"]).unwrap();
        assert_eq!(stack.bug_ids(), &["2", "1"]);
        assert_close(&stack.fuse_report(0, &[1.0, 1.0]), &[0.5, 1.5]);
        assert_close(&stack.fuse_report(1, &[1.0, 1.0]), &[1.25, 0.75]);
    }

    #[test]
    fn weight_count_must_match_signal_count() {
        let index = index(&["A"]);
        let matrices = vec![matrix("a", &[("1", &[1.0])])];
        let weights = WeightVector::new(vec![0.5, 0.5]).unwrap();
        assert_eq!(
            fuse(&matrices, &weights, &index).unwrap_err(),
            EngineError::WeightCountMismatch {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn short_rows_are_a_dimension_mismatch() {
        let index = index(&["A", "B", "C"]);
        let matrices = vec![
            matrix("a", &[("1", &[1.0, 0.0, 0.0])]),
            matrix("stack_trace", &[("1", &[1.0, 0.0])]),
        ];
        let err = SignalStack::new(&matrices, &index).unwrap_err();
        assert_eq!(err, EngineError::dimension_mismatch("stack_trace", "1", 3, 2));
    }

    #[test]
    fn report_count_disagreement_is_fatal() {
        let index = index(&["A"]);
        let matrices = vec![
            matrix("a", &[("1", &[1.0])]),
            matrix("b", &[("1", &[1.0]), ("9", &[0.0])]),
        ];
        let err = SignalStack::new(&matrices, &index).unwrap_err();
        assert_eq!(err, EngineError::dimension_mismatch("b", "9", 1, 2));

        let matrices = vec![
            matrix("a", &[("1", &[1.0]), ("2", &[0.0])]),
            matrix("b", &[("1", &[1.0])]),
        ];
        let err = SignalStack::new(&matrices, &index).unwrap_err();
        assert_eq!(err, EngineError::missing_score_row("b", "2"));
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let index = index(&["A"]);
        assert_eq!(SignalStack::new(&[], &index).unwrap_err(), EngineError::NoSignals);
        let matrices = vec![matrix("a", &[("1", &[1.0])])];
        let empty = SourceFileIndex::new(Vec::<String>::new()).unwrap();
        assert_eq!(
            SignalStack::new(&matrices, &empty).unwrap_err(),
            EngineError::EmptyIndex
        );
        let duplicated = vec![matrix("a", &[("1", &[1.0])]), matrix("a", &[("1", &[0.0])])];
        assert!(matches!(
            SignalStack::new(&duplicated, &index).unwrap_err(),
            EngineError::DuplicateSignal { .. }
        ));
    }
}
