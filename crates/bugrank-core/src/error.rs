use thiserror::Error;

/// Fatal conditions raised while fusing, ranking and scoring reports.
///
/// Every variant names the bug report and/or signal that triggered it so a
/// failed run points straight at the offending input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error(
        "dimension mismatch: signal={signal}, bug_id={bug_id}, expected={expected}, actual={actual}"
    )]
    DimensionMismatch {
        signal: String,
        bug_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("weight count mismatch: expected {expected} weights (one per signal), got {actual}")]
    WeightCountMismatch { expected: usize, actual: usize },

    #[error("invalid weight at index {index}: {value} (must be finite and within [0, 1])")]
    InvalidWeight { index: usize, value: f64 },

    #[error("source file index is empty")]
    EmptyIndex,

    #[error("missing ground truth file: bug_id={bug_id}, file={file} is not in the source index")]
    MissingGroundTruthFile { bug_id: String, file: String },

    #[error("empty ground truth: bug_id={bug_id} has no fixed files")]
    EmptyGroundTruth { bug_id: String },

    #[error("missing score row: signal={signal}, bug_id={bug_id}")]
    MissingScoreRow { signal: String, bug_id: String },

    #[error("invalid score: signal={signal}, bug_id={bug_id}, index={index}, value={value}")]
    InvalidScore {
        signal: String,
        bug_id: String,
        index: usize,
        value: f64,
    },

    #[error("duplicate source file in index: {file}")]
    DuplicateSourceFile { file: String },

    #[error("duplicate bug report: {bug_id}")]
    DuplicateReport { bug_id: String },

    #[error("duplicate signal name: {signal}")]
    DuplicateSignal { signal: String },

    #[error("at least one signal is required")]
    NoSignals,

    #[error("at least one bug report is required")]
    NoReports,
}

impl EngineError {
    pub fn dimension_mismatch(
        signal: impl Into<String>,
        bug_id: impl Into<String>,
        expected: usize,
        actual: usize,
    ) -> Self {
        Self::DimensionMismatch {
            signal: signal.into(),
            bug_id: bug_id.into(),
            expected,
            actual,
        }
    }

    pub fn missing_ground_truth_file(bug_id: impl Into<String>, file: impl Into<String>) -> Self {
        Self::MissingGroundTruthFile {
            bug_id: bug_id.into(),
            file: file.into(),
        }
    }

    pub fn missing_score_row(signal: impl Into<String>, bug_id: impl Into<String>) -> Self {
        Self::MissingScoreRow {
            signal: signal.into(),
            bug_id: bug_id.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("dataset validation error: {0}")]
    Validation(String),

    #[error("unknown dataset preset: {name}")]
    UnknownPreset { name: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config value: {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_name_the_offending_report_and_signal() {
        let err = EngineError::dimension_mismatch("stack_trace", "BUG-42", 3, 2);
        let message = err.to_string();
        assert!(message.contains("stack_trace"));
        assert!(message.contains("BUG-42"));
        assert!(message.contains("expected=3"));

        let err = EngineError::missing_ground_truth_file("BUG-7", "a/B.java");
        assert!(err.to_string().contains("BUG-7"));
        assert!(err.to_string().contains("a/B.java"));
    }

    #[test]
    fn dataset_error_wraps_engine_error_transparently() {
        let err: DatasetError = EngineError::EmptyIndex.into();
        assert_eq!(err.to_string(), "source file index is empty");
    }
}
