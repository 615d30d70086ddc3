//! On-disk dataset: a manifest binding the source index, ground truth and
//! the per-signal score files written by the scoring collaborators.

use crate::fusion::SignalStack;
use crate::normalize::normalize_matrix;
use bugrank_core::config::Config;
use bugrank_core::constants;
use bugrank_core::error::{DatasetError, EngineError};
use bugrank_core::types::{GroundTruth, ScoreMatrix, SourceFileIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportEntry {
    pub bug_id: String,
    pub fixed_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignalSpec {
    pub name: String,
    /// Score file relative to the manifest directory; `<name>.json` if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Min-max normalize each report row on load.
    #[serde(default)]
    pub normalize: bool,
}

impl SignalSpec {
    pub fn file_name(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("{}.json", self.name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub version: String,
    pub name: String,
    pub source_files: Vec<String>,
    pub reports: Vec<ReportEntry>,
    #[serde(default)]
    pub signals: Vec<SignalSpec>,
}

impl DatasetManifest {
    pub fn load_from_path(path: &Path) -> Result<Self, DatasetError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DatasetError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let manifest =
            serde_json::from_str::<Self>(&raw).map_err(|source| DatasetError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.version != constants::DATASET_MANIFEST_VERSION {
            return Err(DatasetError::Validation(format!(
                "unsupported manifest version '{}' (expected {})",
                self.version,
                constants::DATASET_MANIFEST_VERSION
            )));
        }
        if self.name.trim().is_empty() {
            return Err(DatasetError::Validation(
                "dataset name must be non-empty".to_string(),
            ));
        }
        if self.source_files.is_empty() {
            return Err(EngineError::EmptyIndex.into());
        }
        if self.reports.is_empty() {
            return Err(EngineError::NoReports.into());
        }
        for report in &self.reports {
            if report.bug_id.trim().is_empty() {
                return Err(DatasetError::Validation(
                    "bug_id must be non-empty".to_string(),
                ));
            }
        }

        let mut names = BTreeSet::new();
        for signal in &self.signals {
            if signal.name.trim().is_empty() {
                return Err(DatasetError::Validation(
                    "signal name must be non-empty".to_string(),
                ));
            }
            if !names.insert(signal.name.as_str()) {
                return Err(EngineError::DuplicateSignal {
                    signal: signal.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Declared signals, or the standard five in their standard order.
    pub fn effective_signals(&self) -> Vec<SignalSpec> {
        if !self.signals.is_empty() {
            return self.signals.clone();
        }
        constants::DEFAULT_SIGNALS
            .iter()
            .map(|name| SignalSpec {
                name: (*name).to_string(),
                path: None,
                normalize: false,
            })
            .collect()
    }
}

/// Score file layouts accepted on load.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignalFile {
    /// One row per report, in manifest report order.
    Positional(Vec<Vec<f64>>),
    Keyed(BTreeMap<String, Vec<f64>>),
}

/// Key a parsed score file by the manifest's report order.
fn align_rows(
    signal: &str,
    file: SignalFile,
    reports: &[ReportEntry],
) -> Result<Vec<(String, Vec<f64>)>, EngineError> {
    match file {
        SignalFile::Positional(rows) => {
            if rows.len() != reports.len() {
                return Err(EngineError::dimension_mismatch(
                    signal,
                    "*",
                    reports.len(),
                    rows.len(),
                ));
            }
            Ok(reports
                .iter()
                .map(|report| report.bug_id.clone())
                .zip(rows)
                .collect())
        }
        SignalFile::Keyed(mut rows) => {
            let mut aligned = Vec::with_capacity(reports.len());
            for report in reports {
                let row = rows
                    .remove(&report.bug_id)
                    .ok_or_else(|| EngineError::missing_score_row(signal, &report.bug_id))?;
                aligned.push((report.bug_id.clone(), row));
            }
            if let Some(extra) = rows.keys().next() {
                return Err(EngineError::dimension_mismatch(
                    signal,
                    extra,
                    reports.len(),
                    reports.len() + rows.len(),
                ));
            }
            Ok(aligned)
        }
    }
}

/// A validated dataset, ready for fusion.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    root: Option<PathBuf>,
    index: SourceFileIndex,
    truth: GroundTruth,
    signals: Vec<ScoreMatrix>,
    fingerprint: String,
}

impl Dataset {
    /// Load a manifest and every signal file it names.
    ///
    /// Any inconsistency (unknown fixed file, missing row, wrong row length,
    /// score outside [0, 1]) fails the whole load and names the offender.
    pub fn load(manifest_path: &Path) -> Result<Self, DatasetError> {
        let manifest = DatasetManifest::load_from_path(manifest_path)?;
        let root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let index = SourceFileIndex::new(&manifest.source_files)?;
        let truth = GroundTruth::new(
            manifest
                .reports
                .iter()
                .map(|report| (report.bug_id.clone(), report.fixed_files.iter()))
                .collect(),
            &index,
        )?;

        let specs = manifest.effective_signals();
        let mut signals = Vec::with_capacity(specs.len());
        for spec in &specs {
            let path = root.join(spec.file_name());
            let raw = std::fs::read_to_string(&path).map_err(|source| DatasetError::Read {
                path: path.display().to_string(),
                source,
            })?;
            let file =
                serde_json::from_str::<SignalFile>(&raw).map_err(|source| DatasetError::Parse {
                    path: path.display().to_string(),
                    source,
                })?;
            let rows = align_rows(&spec.name, file, &manifest.reports)?;
            let mut matrix = ScoreMatrix::new(spec.name.clone(), rows)?;
            if spec.normalize {
                matrix = normalize_matrix(&matrix)?;
            }
            matrix.validate_against(&index)?;
            tracing::debug!(
                signal = %spec.name,
                path = %path.display(),
                normalized = spec.normalize,
                "loaded signal scores"
            );
            signals.push(matrix);
        }

        let mut dataset = Self::from_parts(manifest.name, index, truth, signals)?;
        dataset.root = Some(root);
        tracing::info!(
            dataset = %dataset.name,
            files = dataset.index.len(),
            reports = dataset.truth.len(),
            signals = dataset.signals.len(),
            fingerprint = %dataset.fingerprint,
            "dataset loaded"
        );
        Ok(dataset)
    }

    /// Assemble a dataset from in-memory parts, validating that the signals
    /// line up with the index and the ground-truth report order.
    pub fn from_parts(
        name: impl Into<String>,
        index: SourceFileIndex,
        truth: GroundTruth,
        signals: Vec<ScoreMatrix>,
    ) -> Result<Self, EngineError> {
        if truth.is_empty() {
            return Err(EngineError::NoReports);
        }
        SignalStack::aligned_to(&signals, &index, truth.bug_ids())?;
        let name = name.into();
        let fingerprint = fingerprint(&name, &index, &truth, &signals);
        Ok(Self {
            name,
            root: None,
            index,
            truth,
            signals,
            fingerprint,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory the manifest was loaded from, if any.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn index(&self) -> &SourceFileIndex {
        &self.index
    }

    pub fn truth(&self) -> &GroundTruth {
        &self.truth
    }

    pub fn signals(&self) -> &[ScoreMatrix] {
        &self.signals
    }

    pub fn signal_names(&self) -> Vec<&str> {
        self.signals.iter().map(ScoreMatrix::signal).collect()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Signals aligned to the ground-truth report order.
    pub fn signal_stack(&self) -> Result<SignalStack<'_>, EngineError> {
        SignalStack::aligned_to(&self.signals, &self.index, self.truth.bug_ids())
    }
}

/// blake3 over the parsed content, so equivalent score file layouts hash
/// the same.
fn fingerprint(
    name: &str,
    index: &SourceFileIndex,
    truth: &GroundTruth,
    signals: &[ScoreMatrix],
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(name.as_bytes());
    hasher.update(&[0]);
    for file in index.iter() {
        hasher.update(file.as_bytes());
        hasher.update(&[0]);
    }
    for report in truth.reports() {
        hasher.update(report.bug_id().as_bytes());
        hasher.update(&[1]);
        for file in report.fixed_files() {
            hasher.update(file.as_bytes());
            hasher.update(&[0]);
        }
    }
    for matrix in signals {
        hasher.update(matrix.signal().as_bytes());
        hasher.update(&[2]);
        for (bug_id, row) in matrix.iter() {
            hasher.update(bug_id.as_bytes());
            hasher.update(&[0]);
            for score in row {
                hasher.update(&score.to_le_bytes());
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// Resolve `--dataset`: an existing manifest file, a directory holding
/// `dataset.json`, or a named preset under the configured data root.
pub fn resolve_manifest_path(dataset: &str, config: &Config) -> Result<PathBuf, DatasetError> {
    let path = Path::new(dataset);
    if path.is_dir() {
        return Ok(path.join(constants::DATASET_MANIFEST_FILE));
    }
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(root) = config.preset_root(dataset) {
        return Ok(root.join(constants::DATASET_MANIFEST_FILE));
    }
    if path.extension().is_some() || path.components().count() > 1 {
        // Looks like a path; let the loader report it as unreadable.
        return Ok(path.to_path_buf());
    }
    Err(DatasetError::UnknownPreset {
        name: dataset.to_string(),
    })
}
