use super::{DatasetArgs, OutputArgs, load_dataset, write_json};
use anyhow::{Context, Result};
use bugrank_engine::artifact::{StagedRankingFile, WeightsFile};
use bugrank_engine::evaluation::{self, render_summary_table};
use std::path::Path;

/// Score a dataset with previously estimated weights.
pub fn run(
    dataset_args: &DatasetArgs,
    weights_path: &Path,
    output: &OutputArgs,
    config_file: Option<&Path>,
) -> Result<()> {
    let (mut config, dataset) = load_dataset(dataset_args, config_file)?;
    output.apply(&mut config)?;

    let weights = WeightsFile::load_from_path(weights_path)?
        .weights_for(&dataset.signal_names())
        .with_context(|| {
            format!(
                "weights file {} does not fit dataset {}",
                weights_path.display(),
                dataset.name()
            )
        })?;

    let results_path = output.results_path(&config);
    let mut sink = StagedRankingFile::create(&results_path)?;
    let report = evaluation::evaluate(&dataset, &weights, &config.evaluation.top_n, &mut sink)
        .with_context(|| format!("evaluation of dataset {} failed", dataset.name()))?;
    sink.commit()?;
    println!("results: {}", results_path.display());

    if let Some(path) = output.report_path(&config) {
        write_json(&path, &report)?;
        println!("report: {}", path.display());
    }

    println!("{}", render_summary_table(&report));
    Ok(())
}
