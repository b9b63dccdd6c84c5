//! Dataset metadata documents.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Metadata persisted next to each chunk and each stitched split.
///
/// The field set is the contract with the training-side consumer; every
/// chunk records the same `seq_len`/`vocab_size` constants so the stitcher
/// can sanity-check that chunks come from one pipeline configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PuzzleDatasetMetadata {
    pub seq_len: usize,
    pub vocab_size: usize,
    pub pad_id: u8,
    pub ignore_label_id: u8,
    pub blank_identifier_id: i32,
    pub num_puzzle_identifiers: usize,
    pub total_groups: usize,
    pub mean_puzzle_examples: f64,
    pub sets: Vec<String>,
}

impl PuzzleDatasetMetadata {
    pub fn write(&self, path: &Path, overwrite: bool) -> Result<()> {
        if path.exists() && !overwrite {
            bail!("{} already exists (use overwrite option)", path.display());
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))
    }
}
