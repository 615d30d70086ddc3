mod commands;

use bugrank_core::config::Config;
use clap::{Parser, Subcommand};
use commands::{DatasetArgs, OutputArgs, SearchArgs};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bugrank",
    version,
    about = "Fuse bug-localization relevance signals, learn their weights, and score the rankings",
    long_about = "bugrank combines per-file relevance scores from several signals (VSM similarity,\n\
        token matching, similar fixed reports, semantic similarity, stack traces) into one\n\
        ranking per bug report, learns the fusion weights with a seeded global search, and\n\
        reports Top-N, MRR, MAP and precision/recall/F1@N.\n\n\
        Quick start:\n  \
        bugrank validate --dataset data/zxing\n  \
        bugrank run --dataset data/zxing --report report.json\n  \
        bugrank estimate --dataset zxing --weights-out weights.json\n  \
        bugrank evaluate --dataset zxing --weights weights.json"
)]
struct Cli {
    /// Enable verbose logging (set log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (default: <dataset>/.bugrank/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate weights, then evaluate them on the same reports
    ///
    /// Weights are fitted and scored on one report set; there is no
    /// held-out split, so the metrics are training-set metrics.
    ///
    /// Example: bugrank run --dataset zxing --report report.json
    Run {
        #[command(flatten)]
        dataset: DatasetArgs,

        #[command(flatten)]
        search: SearchArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Also save the learned weights
        #[arg(long)]
        weights_out: Option<String>,
    },
    /// Estimate fusion weights only
    ///
    /// Example: bugrank estimate --dataset swt --weights-out swt-weights.json
    Estimate {
        #[command(flatten)]
        dataset: DatasetArgs,

        #[command(flatten)]
        search: SearchArgs,

        /// Where to save the learned weights
        #[arg(long)]
        weights_out: String,
    },
    /// Evaluate previously estimated weights
    ///
    /// The weights file must list the dataset's signals in the same order.
    ///
    /// Example: bugrank evaluate --dataset swt --weights swt-weights.json
    Evaluate {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Weights file written by `estimate` or `run --weights-out`
        #[arg(long)]
        weights: String,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Load and validate a dataset without running anything
    Validate {
        #[command(flatten)]
        dataset: DatasetArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_file = cli.config.as_deref().map(std::path::Path::new);

    // Only the logging level is taken from this pass; commands reload with
    // the dataset layer once the dataset is known.
    let configured_level = Config::load_with_file(None, config_file)
        .map(|config| config.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        configured_level
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            dataset,
            search,
            output,
            weights_out,
        } => {
            commands::run::run(
                &dataset,
                &search,
                &output,
                weights_out.as_deref(),
                config_file,
            )?;
        }
        Commands::Estimate {
            dataset,
            search,
            weights_out,
        } => {
            commands::estimate::run(
                &dataset,
                &search,
                std::path::Path::new(&weights_out),
                config_file,
            )?;
        }
        Commands::Evaluate {
            dataset,
            weights,
            output,
        } => {
            commands::evaluate::run(
                &dataset,
                std::path::Path::new(&weights),
                &output,
                config_file,
            )?;
        }
        Commands::Validate { dataset } => {
            commands::validate::run(&dataset, config_file)?;
        }
    }

    Ok(())
}
