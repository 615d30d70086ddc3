use super::{DatasetArgs, SearchArgs, load_dataset};
use anyhow::{Context, Result};
use bugrank_engine::artifact::WeightsFile;
use bugrank_engine::evaluation;
use bugrank_engine::optimizer::build_optimizer;
use std::path::Path;

pub fn run(
    dataset_args: &DatasetArgs,
    search: &SearchArgs,
    weights_out: &Path,
    config_file: Option<&Path>,
) -> Result<()> {
    let (mut config, dataset) = load_dataset(dataset_args, config_file)?;
    search.apply(&mut config)?;

    let optimizer = build_optimizer(&config.optimizer);
    let estimate = evaluation::estimate(&dataset, optimizer.as_ref())
        .with_context(|| format!("weight estimation for dataset {} failed", dataset.name()))?;
    let file = WeightsFile::from_estimate(
        dataset.name(),
        &dataset.signal_names(),
        &estimate,
        config.optimizer.seed,
    );
    file.save(weights_out)?;

    for signal in &file.signals {
        println!("{:<24} {:.6}", signal.name, signal.weight);
    }
    println!(
        "cost={:.6} iterations={} evaluations={} converged={}",
        estimate.outcome.cost,
        estimate.outcome.iterations,
        estimate.outcome.evaluations,
        estimate.outcome.converged
    );
    println!("weights: {}", weights_out.display());
    Ok(())
}
