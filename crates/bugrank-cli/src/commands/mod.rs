pub mod estimate;
pub mod evaluate;
pub mod run;
pub mod validate;

use anyhow::{Context, Result};
use bugrank_core::config::Config;
use bugrank_engine::dataset::{Dataset, resolve_manifest_path};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(clap::Args, Debug, Clone)]
pub struct DatasetArgs {
    /// Dataset manifest, a directory holding dataset.json, or a preset
    /// name (aspectj, swt, zxing, codec)
    #[arg(short, long)]
    pub dataset: String,

    /// Directory presets are resolved under (overrides storage.data_root)
    #[arg(long)]
    pub data_root: Option<String>,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Search strategy: differential_evolution or random_search
    #[arg(long)]
    pub strategy: Option<String>,

    /// Random seed for the weight search
    #[arg(long)]
    pub seed: Option<u64>,

    /// Maximum optimizer generations
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Worker threads for candidate evaluation (0 = all CPUs)
    #[arg(long)]
    pub workers: Option<usize>,
}

impl SearchArgs {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(strategy) = &self.strategy {
            config.optimizer.strategy = strategy.clone();
        }
        if let Some(seed) = self.seed {
            config.optimizer.seed = seed;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.optimizer.max_iterations = max_iterations;
        }
        if let Some(workers) = self.workers {
            config.optimizer.workers = workers;
        }
        config.normalize()?;
        Ok(())
    }
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Ranking listing, one `bug_id,file,...` line per report
    /// (default: evaluation.results_file)
    #[arg(long)]
    pub results: Option<String>,

    /// Write the full evaluation report as JSON
    #[arg(long)]
    pub report: Option<String>,

    /// Top-N cutoffs, comma separated (default: evaluation.top_n)
    #[arg(long, value_delimiter = ',')]
    pub top_n: Vec<usize>,
}

impl OutputArgs {
    fn results_path(&self, config: &Config) -> PathBuf {
        PathBuf::from(
            self.results
                .as_deref()
                .unwrap_or(&config.evaluation.results_file),
        )
    }

    fn report_path(&self, config: &Config) -> Option<PathBuf> {
        self.report
            .as_deref()
            .or(config.evaluation.report_file.as_deref())
            .map(PathBuf::from)
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        if !self.top_n.is_empty() {
            config.evaluation.top_n = self.top_n.clone();
        }
        config.normalize()?;
        Ok(())
    }
}

/// Resolve the dataset argument, load configuration layered with the
/// dataset's own `.bugrank/config.toml`, then load and validate the data.
pub fn load_dataset(args: &DatasetArgs, config_file: Option<&Path>) -> Result<(Config, Dataset)> {
    let mut config = Config::load_with_file(None, config_file)?;
    override_data_root(&mut config, args)?;
    let manifest = resolve_manifest_path(&args.dataset, &config)?;

    let dataset_root = manifest.parent().filter(|dir| dir.is_dir());
    let mut config = Config::load_with_file(dataset_root, config_file)?;
    override_data_root(&mut config, args)?;

    let dataset = Dataset::load(&manifest)
        .with_context(|| format!("failed to load dataset {}", manifest.display()))?;
    Ok((config, dataset))
}

fn override_data_root(config: &mut Config, args: &DatasetArgs) -> Result<()> {
    if let Some(root) = &args.data_root {
        config.storage.data_root = root.clone();
        config.normalize()?;
    }
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
