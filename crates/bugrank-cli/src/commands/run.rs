use super::{DatasetArgs, OutputArgs, SearchArgs, load_dataset, write_json};
use anyhow::{Context, Result};
use bugrank_engine::artifact::{StagedRankingFile, WeightsFile};
use bugrank_engine::evaluation::{self, render_summary_table};
use bugrank_engine::optimizer::build_optimizer;
use std::path::{Path, PathBuf};

/// Estimate weights and evaluate them on the same reports, writing the
/// ranking listing, and optionally the report and weights files.
pub fn run(
    dataset_args: &DatasetArgs,
    search: &SearchArgs,
    output: &OutputArgs,
    weights_out: Option<&str>,
    config_file: Option<&Path>,
) -> Result<()> {
    let (mut config, dataset) = load_dataset(dataset_args, config_file)?;
    search.apply(&mut config)?;
    output.apply(&mut config)?;

    let optimizer = build_optimizer(&config.optimizer);
    let results_path = output.results_path(&config);
    let mut sink = StagedRankingFile::create(&results_path)?;
    let (estimate, report) =
        evaluation::run(&dataset, optimizer.as_ref(), &config.evaluation.top_n, &mut sink)
            .with_context(|| format!("evaluation of dataset {} failed", dataset.name()))?;
    sink.commit()?;
    println!("results: {}", results_path.display());

    if let Some(path) = weights_out.map(PathBuf::from) {
        WeightsFile::from_estimate(
            dataset.name(),
            &dataset.signal_names(),
            &estimate,
            config.optimizer.seed,
        )
        .save(&path)?;
        println!("weights: {}", path.display());
    }
    if let Some(path) = output.report_path(&config) {
        write_json(&path, &report)?;
        println!("report: {}", path.display());
    }

    println!("{}", render_summary_table(&report));
    Ok(())
}
