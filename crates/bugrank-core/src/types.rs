use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Canonical form of a source-file identifier: trimmed, forward slashes,
/// no leading `./`.
pub fn normalize_file_id(raw: &str) -> String {
    let mut normalized = raw.trim().replace('\\', "/");
    while let Some(stripped) = normalized.strip_prefix("./") {
        normalized = stripped.to_string();
    }
    normalized
}

/// Ordered, immutable list of source files shared by every score row and
/// every ranking of a run. Position `i` always denotes the same file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFileIndex {
    files: Vec<String>,
    positions: HashMap<String, usize>,
}

impl SourceFileIndex {
    pub fn new<I, S>(files: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered = Vec::new();
        let mut positions = HashMap::new();
        for raw in files {
            let file = normalize_file_id(raw.as_ref());
            if positions.insert(file.clone(), ordered.len()).is_some() {
                return Err(EngineError::DuplicateSourceFile { file });
            }
            ordered.push(file);
        }
        Ok(Self {
            files: ordered,
            positions,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&str> {
        self.files.get(position).map(String::as_str)
    }

    /// Position of a file, looked up by its normalized identifier.
    pub fn position(&self, file: &str) -> Option<usize> {
        self.positions.get(&normalize_file_id(file)).copied()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.files
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }
}

/// One collaborator's scores: bug id -> one score per source file.
///
/// Report order is insertion order and is never changed after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    signal: String,
    bug_ids: Vec<String>,
    rows: Vec<Vec<f64>>,
    positions: HashMap<String, usize>,
}

impl ScoreMatrix {
    pub fn new(
        signal: impl Into<String>,
        rows: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, EngineError> {
        let mut bug_ids = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len());
        let mut positions = HashMap::with_capacity(rows.len());
        for (bug_id, row) in rows {
            if positions.insert(bug_id.clone(), bug_ids.len()).is_some() {
                return Err(EngineError::DuplicateReport { bug_id });
            }
            bug_ids.push(bug_id);
            values.push(row);
        }
        Ok(Self {
            signal: signal.into(),
            bug_ids,
            rows: values,
            positions,
        })
    }

    pub fn signal(&self) -> &str {
        &self.signal
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn bug_ids(&self) -> &[String] {
        &self.bug_ids
    }

    pub fn row(&self, bug_id: &str) -> Option<&[f64]> {
        self.positions
            .get(bug_id)
            .map(|&position| self.rows[position].as_slice())
    }

    pub fn row_at(&self, position: usize) -> Option<&[f64]> {
        self.rows.get(position).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.bug_ids
            .iter()
            .map(String::as_str)
            .zip(self.rows.iter().map(Vec::as_slice))
    }

    /// Check row lengths against the index and every value against [0, 1].
    pub fn validate_against(&self, index: &SourceFileIndex) -> Result<(), EngineError> {
        for (bug_id, row) in self.iter() {
            if row.len() != index.len() {
                return Err(EngineError::dimension_mismatch(
                    &self.signal,
                    bug_id,
                    index.len(),
                    row.len(),
                ));
            }
            if let Some((position, &value)) = row
                .iter()
                .enumerate()
                .find(|(_, value)| !value.is_finite() || **value < 0.0 || **value > 1.0)
            {
                return Err(EngineError::InvalidScore {
                    signal: self.signal.clone(),
                    bug_id: bug_id.to_string(),
                    index: position,
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Free linear-combination weights, one per signal, each in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct WeightVector(Vec<f64>);

impl WeightVector {
    pub fn new(weights: Vec<f64>) -> Result<Self, EngineError> {
        if let Some((index, &value)) = weights
            .iter()
            .enumerate()
            .find(|(_, value)| !value.is_finite() || **value < 0.0 || **value > 1.0)
        {
            return Err(EngineError::InvalidWeight { index, value });
        }
        Ok(Self(weights))
    }

    /// Build from raw optimizer output, clamping into the unit box.
    pub fn clamped(weights: &[f64]) -> Self {
        Self(
            weights
                .iter()
                .map(|w| if w.is_finite() { w.clamp(0.0, 1.0) } else { 0.0 })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl TryFrom<Vec<f64>> for WeightVector {
    type Error = EngineError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WeightVector> for Vec<f64> {
    fn from(value: WeightVector) -> Self {
        value.0
    }
}

/// Known fixed files for one bug report, validated against the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTruth {
    bug_id: String,
    // Both sorted by index position and kept pairwise aligned.
    fixed_files: Vec<String>,
    fixed_positions: Vec<usize>,
}

impl ReportTruth {
    pub fn bug_id(&self) -> &str {
        &self.bug_id
    }

    /// Fixed files in index order, aligned with [`ReportTruth::fixed_positions`].
    pub fn fixed_files(&self) -> &[String] {
        &self.fixed_files
    }

    pub fn contains(&self, file: &str) -> bool {
        let file = normalize_file_id(file);
        self.fixed_files.iter().any(|fixed| *fixed == file)
    }

    /// Index positions of the fixed files, ascending.
    pub fn fixed_positions(&self) -> &[usize] {
        &self.fixed_positions
    }
}

/// Ground truth for a run, in canonical report order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundTruth {
    reports: Vec<ReportTruth>,
    positions: HashMap<String, usize>,
}

impl GroundTruth {
    pub fn new<F, S>(reports: Vec<(String, F)>, index: &SourceFileIndex) -> Result<Self, EngineError>
    where
        F: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut validated = Vec::with_capacity(reports.len());
        let mut positions = HashMap::with_capacity(reports.len());
        for (bug_id, files) in reports {
            if positions.contains_key(&bug_id) {
                return Err(EngineError::DuplicateReport { bug_id });
            }
            let mut seen = BTreeSet::new();
            let mut fixed = Vec::new();
            for raw in files {
                let file = normalize_file_id(raw.as_ref());
                if !seen.insert(file.clone()) {
                    continue;
                }
                let position = index
                    .position(&file)
                    .ok_or_else(|| EngineError::missing_ground_truth_file(&bug_id, &file))?;
                fixed.push((position, file));
            }
            if fixed.is_empty() {
                return Err(EngineError::EmptyGroundTruth { bug_id });
            }
            fixed.sort_unstable_by_key(|(position, _)| *position);
            let (fixed_positions, fixed_files) = fixed.into_iter().unzip();
            positions.insert(bug_id.clone(), validated.len());
            validated.push(ReportTruth {
                bug_id,
                fixed_files,
                fixed_positions,
            });
        }
        Ok(Self {
            reports: validated,
            positions,
        })
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn get(&self, bug_id: &str) -> Option<&ReportTruth> {
        self.positions
            .get(bug_id)
            .map(|&position| &self.reports[position])
    }

    pub fn reports(&self) -> &[ReportTruth] {
        &self.reports
    }

    pub fn bug_ids(&self) -> impl Iterator<Item = &str> {
        self.reports.iter().map(|report| report.bug_id.as_str())
    }
}

/// A permutation of the source index positions, most relevant first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedList {
    order: Vec<usize>,
}

impl RankedList {
    /// Wrap an already-sorted permutation of index positions.
    pub fn from_order(order: Vec<usize>) -> Self {
        Self { order }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn positions(&self) -> &[usize] {
        &self.order
    }

    /// 1-based rank of every index position (`ranks[position]`).
    pub fn ranks(&self) -> Vec<usize> {
        let mut ranks = vec![0; self.order.len()];
        for (idx, &position) in self.order.iter().enumerate() {
            ranks[position] = idx + 1;
        }
        ranks
    }

    pub fn files<'a>(&'a self, index: &'a SourceFileIndex) -> impl Iterator<Item = &'a str> + 'a {
        self.order
            .iter()
            .filter_map(move |&position| index.get(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(files: &[&str]) -> SourceFileIndex {
        SourceFileIndex::new(files.iter().copied()).expect("valid index")
    }

    #[test]
    fn normalize_file_id_unifies_separators_and_prefix() {
        assert_eq!(normalize_file_id(" ./src\\a\\B.java "), "src/a/B.java");
        assert_eq!(normalize_file_id("././x.java"), "x.java");
        assert_eq!(normalize_file_id("org.Foo.java"), "org.Foo.java");
    }

    #[test]
    fn source_index_rejects_duplicates_after_normalization() {
        let err = SourceFileIndex::new(["src/A.java", "./src/A.java"]).expect_err("duplicate");
        assert_eq!(
            err,
            EngineError::DuplicateSourceFile {
                file: "src/A.java".to_string()
            }
        );
    }

    #[test]
    fn source_index_positions_follow_input_order() {
        let index = index(&["A", "B", "C"]);
        assert_eq!(index.position("C"), Some(2));
        assert_eq!(index.get(1), Some("B"));
        assert_eq!(index.position("D"), None);
    }

    #[test]
    fn score_matrix_validation_reports_offending_row() {
        let index = index(&["A", "B"]);
        let matrix = ScoreMatrix::new(
            "vsm_similarity",
            vec![
                ("1".to_string(), vec![0.1, 0.2]),
                ("2".to_string(), vec![0.3]),
            ],
        )
        .expect("matrix");
        let err = matrix.validate_against(&index).expect_err("short row");
        assert_eq!(err, EngineError::dimension_mismatch("vsm_similarity", "2", 2, 1));

        let matrix =
            ScoreMatrix::new("stack_trace", vec![("1".to_string(), vec![0.1, 1.5])]).expect("matrix");
        let err = matrix.validate_against(&index).expect_err("out of range");
        assert!(matches!(err, EngineError::InvalidScore { index: 1, .. }));
    }

    #[test]
    fn score_matrix_preserves_insertion_order() {
        let matrix = ScoreMatrix::new(
            "token_matching",
            vec![
                ("z".to_string(), vec![0.0]),
                ("a".to_string(), vec![1.0]),
            ],
        )
        .expect("matrix");
        assert_eq!(matrix.bug_ids(), &["z".to_string(), "a".to_string()]);
        assert_eq!(matrix.row("a"), Some(&[1.0][..]));
        assert_eq!(matrix.row_at(0), Some(&[0.0][..]));
    }

    #[test]
    fn weight_vector_enforces_unit_box() {
        assert!(WeightVector::new(vec![0.0, 0.5, 1.0]).is_ok());
        assert_eq!(
            WeightVector::new(vec![0.2, 1.2]).expect_err("too large"),
            EngineError::InvalidWeight {
                index: 1,
                value: 1.2
            }
        );
        assert_eq!(WeightVector::clamped(&[-0.1, 2.0, f64::NAN]).as_slice(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn weight_vector_serializes_as_plain_array() {
        let weights = WeightVector::new(vec![0.25, 0.75]).expect("weights");
        let json = serde_json::to_string(&weights).expect("serialize");
        assert_eq!(json, "[0.25,0.75]");
        let parsed: Result<WeightVector, _> = serde_json::from_str("[0.5, 3.0]");
        assert!(parsed.is_err());
    }

    #[test]
    fn ground_truth_validates_membership_and_emptiness() {
        let index = index(&["src/A.java", "src/B.java"]);
        let truth = GroundTruth::new(
            vec![("1".to_string(), vec!["./src/B.java", "src/A.java", "src/B.java"])],
            &index,
        )
        .expect("truth");
        assert_eq!(truth.reports()[0].fixed_positions(), &[0, 1]);
        assert_eq!(truth.reports()[0].fixed_files(), &["src/A.java", "src/B.java"]);
        assert!(truth.reports()[0].contains("./src/A.java"));

        let err = GroundTruth::new(vec![("2".to_string(), vec!["src/C.java"])], &index)
            .expect_err("missing file");
        assert_eq!(err, EngineError::missing_ground_truth_file("2", "src/C.java"));

        let err = GroundTruth::new(vec![("3".to_string(), Vec::<String>::new())], &index)
            .expect_err("empty");
        assert_eq!(
            err,
            EngineError::EmptyGroundTruth {
                bug_id: "3".to_string()
            }
        );
    }

    #[test]
    fn ranked_list_inverts_to_one_based_ranks() {
        let ranked = RankedList::from_order(vec![2, 0, 1]);
        assert_eq!(ranked.ranks(), vec![2, 3, 1]);
        let index = index(&["A", "B", "C"]);
        assert_eq!(ranked.files(&index).collect::<Vec<_>>(), vec!["C", "A", "B"]);
    }
}
