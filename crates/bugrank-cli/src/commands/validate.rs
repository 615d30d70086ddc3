use super::{DatasetArgs, load_dataset};
use anyhow::Result;
use std::path::Path;

pub fn run(dataset_args: &DatasetArgs, config_file: Option<&Path>) -> Result<()> {
    let (_, dataset) = load_dataset(dataset_args, config_file)?;
    dataset.signal_stack()?;

    println!("dataset: {}", dataset.name());
    println!("source_files: {}", dataset.index().len());
    println!("reports: {}", dataset.truth().len());
    println!("signals: {}", dataset.signal_names().join(","));
    println!("fingerprint: {}", dataset.fingerprint());
    println!("status: ok");
    Ok(())
}
