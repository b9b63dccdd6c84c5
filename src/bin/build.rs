use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;
use puzzle_packer::{build_dataset, BuildOptions, IdentifierRegistry};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Build augmented puzzle dataset chunks (.npy arrays + metadata)"
)]
struct Cli {
    /// Source directories containing puzzle .json files (processed in order)
    #[arg(long = "dataset-dir", value_name = "DIR", required = true)]
    dataset_dirs: Vec<PathBuf>,

    /// Output directory for chunk arrays, chunk metadata, identifiers.json
    #[arg(long, value_name = "DIR")]
    output: PathBuf,

    /// RNG seed, re-applied per source directory
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Augmented variants to generate per puzzle
    #[arg(long, default_value_t = 5)]
    num_aug: usize,

    /// Overwrite existing outputs if present
    #[arg(long)]
    overwrite: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let registry = IdentifierRegistry::build(&cli.dataset_dirs);
    let options = BuildOptions {
        dataset_dirs: cli.dataset_dirs,
        output_dir: cli.output,
        seed: cli.seed,
        num_aug: cli.num_aug,
        overwrite: cli.overwrite,
    };

    let summaries = build_dataset(&options, &registry)?;
    let groups: usize = summaries.iter().map(|s| s.groups).sum();
    let examples: usize = summaries.iter().map(|s| s.examples).sum();
    info!(
        "Completed packing: {} chunk(s), {} groups, {} examples",
        summaries.len(),
        groups,
        examples
    );
    Ok(())
}
