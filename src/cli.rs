use std::path::PathBuf;

use clap::{Args, Parser};

use crate::logging::LogArgs;

#[derive(Debug, Args)]
pub struct SamplingArgs {
    /// Number of histogram bins, even (default: 20)
    #[arg(short = 'b', long)]
    pub bins: Option<usize>,

    /// Tick value where bins turn exponential; larger deltas are outliers (default: 50)
    #[arg(short = 'k', long)]
    pub knee: Option<u64>,

    /// Expected minimum tick delta (default: 10)
    #[arg(short = 'm', long)]
    pub min: Option<u64>,

    /// Outlier buffer capacity in entries (default: 10000)
    #[arg(short = 'o', long)]
    pub outbuf: Option<usize>,

    /// Pause before each sample block in milliseconds (default: 0)
    #[arg(short = 'p', long)]
    pub pause: Option<u64>,

    /// Run time in seconds (default: 1)
    #[arg(short = 'r', long)]
    pub runtime: Option<u64>,

    /// Report line width in characters (default: 79)
    #[arg(short = 'w', long)]
    pub width: Option<usize>,

    /// Write outliers as "<ms>, <us>" lines to this file
    #[arg(short = 'f', long)]
    pub outfile: Option<PathBuf>,

    /// Pin to these CPUs (e.g. 0 or 1-3,6)
    #[arg(short = 'c', long)]
    pub cpu: Option<String>,
}

#[derive(Debug, Parser)]
#[command(name = "tickjitter", about = "Measure and visualize system latency jitter")]
pub struct Cli {
    /// Configuration file path (default: /etc/tickjitter.toml)
    #[arg(long = "config")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    #[command(flatten)]
    pub log: LogArgs,
}
