use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;
use puzzle_packer::{stitch_dataset, StitchOptions};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Stitch dataset chunks into one final dataset per split"
)]
struct Cli {
    /// Chunk root produced by build-chunks
    #[arg(long, value_name = "DIR")]
    source: PathBuf,

    /// Output directory for the final arrays and metadata
    #[arg(long, value_name = "DIR")]
    output: PathBuf,

    /// Overwrite existing outputs if present
    #[arg(long)]
    overwrite: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let options = StitchOptions {
        source_dir: cli.source,
        output_dir: cli.output,
        overwrite: cli.overwrite,
    };

    let summaries = stitch_dataset(&options)?;
    for summary in &summaries {
        info!(
            "Split '{}': {} chunk(s) -> {} groups, {} puzzles, {} examples",
            summary.split, summary.chunks, summary.groups, summary.puzzles, summary.examples
        );
    }
    Ok(())
}
