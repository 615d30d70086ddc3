//! Run outputs: the per-report ranking listing and the learned-weights file.

use crate::optimizer::WeightEstimate;
use bugrank_core::constants;
use bugrank_core::error::EngineError;
use bugrank_core::types::WeightVector;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to read weights file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse weights file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to serialize weights file {path}: {source}")]
    Serialize {
        path: String,
        source: serde_json::Error,
    },
    #[error("unsupported weights file version '{found}' in {path} (expected {expected})")]
    Version {
        path: String,
        found: String,
        expected: &'static str,
    },
    #[error("weights file signals {found:?} do not match dataset signals {expected:?}")]
    SignalMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Destination for the ranked file list of each report, in report order.
pub trait RankingSink {
    fn write_ranking(&mut self, bug_id: &str, files: &[&str]) -> std::io::Result<()>;

    fn finish(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// `bug_id,file_1,file_2,...` per line, most relevant file first.
pub struct CsvRankingWriter<W: Write> {
    inner: W,
}

impl CsvRankingWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, ArtifactError> {
        let write_err = |source| ArtifactError::Write {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let file = File::create(path).map_err(write_err)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> CsvRankingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> RankingSink for CsvRankingWriter<W> {
    fn write_ranking(&mut self, bug_id: &str, files: &[&str]) -> std::io::Result<()> {
        self.inner.write_all(bug_id.as_bytes())?;
        for file in files {
            self.inner.write_all(b",")?;
            self.inner.write_all(file.as_bytes())?;
        }
        self.inner.write_all(b"\n")
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Ranking listing written to `<path>.partial` and renamed onto `path` by
/// [`StagedRankingFile::commit`]. Dropped without a commit, the staging file
/// is removed and `path` is left untouched.
pub struct StagedRankingFile {
    target: PathBuf,
    staging: PathBuf,
    writer: Option<CsvRankingWriter<BufWriter<File>>>,
}

impl StagedRankingFile {
    pub fn create(path: &Path) -> Result<Self, ArtifactError> {
        let mut staging = path.as_os_str().to_owned();
        staging.push(".partial");
        let staging = PathBuf::from(staging);
        let writer = CsvRankingWriter::create(&staging)?;
        Ok(Self {
            target: path.to_path_buf(),
            staging,
            writer: Some(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.target
    }

    pub fn commit(mut self) -> Result<(), ArtifactError> {
        let write_err = |source| ArtifactError::Write {
            path: self.target.display().to_string(),
            source,
        };
        if let Some(mut writer) = self.writer.take() {
            writer.finish().map_err(write_err)?;
        }
        std::fs::rename(&self.staging, &self.target).map_err(write_err)
    }
}

impl RankingSink for StagedRankingFile {
    fn write_ranking(&mut self, bug_id: &str, files: &[&str]) -> std::io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_ranking(bug_id, files),
            None => Err(std::io::Error::other("ranking listing already committed")),
        }
    }

    fn finish(&mut self) -> std::io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.finish(),
            None => Ok(()),
        }
    }
}

impl Drop for StagedRankingFile {
    fn drop(&mut self) {
        self.writer.take();
        if self.staging.exists() {
            let _ = std::fs::remove_file(&self.staging);
        }
    }
}

/// Keeps rankings in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySink {
    pub rankings: Vec<(String, Vec<String>)>,
}

impl RankingSink for MemorySink {
    fn write_ranking(&mut self, bug_id: &str, files: &[&str]) -> std::io::Result<()> {
        self.rankings.push((
            bug_id.to_string(),
            files.iter().map(|file| (*file).to_string()).collect(),
        ));
        Ok(())
    }
}

/// Discards rankings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RankingSink for NullSink {
    fn write_ranking(&mut self, _bug_id: &str, _files: &[&str]) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalWeight {
    pub name: String,
    pub weight: f64,
}

/// Learned weights persisted between `estimate` and `evaluate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsFile {
    pub version: String,
    #[serde(default)]
    pub dataset: String,
    pub signals: Vec<SignalWeight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default)]
    pub converged: bool,
}

impl WeightsFile {
    pub fn from_estimate(
        dataset: &str,
        signal_names: &[&str],
        estimate: &WeightEstimate,
        seed: u64,
    ) -> Self {
        Self {
            version: constants::WEIGHTS_FILE_VERSION.to_string(),
            dataset: dataset.to_string(),
            signals: signal_names
                .iter()
                .zip(estimate.weights.as_slice())
                .map(|(name, weight)| SignalWeight {
                    name: (*name).to_string(),
                    weight: *weight,
                })
                .collect(),
            seed: Some(seed),
            strategy: Some(estimate.outcome.strategy.clone()),
            cost: Some(estimate.outcome.cost),
            converged: estimate.outcome.converged,
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ArtifactError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ArtifactError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let file: Self = serde_json::from_str(&raw).map_err(|source| ArtifactError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        if file.version != constants::WEIGHTS_FILE_VERSION {
            return Err(ArtifactError::Version {
                path: path.display().to_string(),
                found: file.version,
                expected: constants::WEIGHTS_FILE_VERSION,
            });
        }
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let write_err = |source| ArtifactError::Write {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|source| ArtifactError::Serialize {
                path: path.display().to_string(),
                source,
            })?;
        std::fs::write(path, json).map_err(write_err)
    }

    /// Weights in dataset signal order; names and order must match exactly.
    pub fn weights_for(&self, signal_names: &[&str]) -> Result<WeightVector, ArtifactError> {
        let found: Vec<&str> = self.signals.iter().map(|s| s.name.as_str()).collect();
        if found != signal_names {
            return Err(ArtifactError::SignalMismatch {
                expected: signal_names.iter().map(|name| (*name).to_string()).collect(),
                found: found.into_iter().map(str::to_string).collect(),
            });
        }
        Ok(WeightVector::new(
            self.signals.iter().map(|signal| signal.weight).collect(),
        )?)
    }
}
