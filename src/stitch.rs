//! Stitcher: merge per-directory chunks into one dataset per split.
//!
//! Plain arrays are concatenated row-wise through the mmap-backed writer
//! without ever holding more than one row in memory. Index arrays are
//! offset-corrected: every chunk after the first drops its leading 0 and has
//! the running boundary offset added, reconstructing the array a single-pass
//! build over the concatenated puzzle list would have produced.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{info, warn};

use crate::metadata::PuzzleDatasetMetadata;
use crate::registry::IdentifierRegistry;
use crate::writer::{
    append_rows_from, probe_2d, read_index_array, write_index_array, SequenceWriter,
};
use crate::{default_progress_bar, PAD_ID, SEQ_LEN, VOCAB_SIZE};

const ARRAY_FIELDS: [&str; 5] = [
    "inputs",
    "labels",
    "puzzle_identifiers",
    "puzzle_indices",
    "group_indices",
];

/// Stitch configuration supplied by the CLI.
#[derive(Clone, Debug)]
pub struct StitchOptions {
    /// Chunk root produced by the builder (`<root>/<split>/*_chunk_*.npy`).
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub overwrite: bool,
}

/// Per-split result counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitSummary {
    pub split: String,
    pub chunks: usize,
    pub examples: usize,
    pub puzzles: usize,
    pub groups: usize,
}

/// Stitch every split present under the source directory and copy the
/// global identifier map alongside the final arrays.
pub fn stitch_dataset(opts: &StitchOptions) -> Result<Vec<SplitSummary>> {
    fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("failed to create {}", opts.output_dir.display()))?;

    let identifiers_path = opts.source_dir.join("identifiers.json");
    let names = IdentifierRegistry::load_names(&identifiers_path)?;

    let mut summaries = Vec::new();
    for split in ["train", "test"] {
        let split_dir = opts.source_dir.join(split);
        if !split_dir.is_dir() {
            info!("no '{split}' split under {}, skipping", opts.source_dir.display());
            continue;
        }
        let summary = stitch_split(split, &split_dir, opts, names.len())?;
        info!(
            "stitched {} '{}' chunk(s): {} groups, {} puzzles, {} examples",
            summary.chunks, split, summary.groups, summary.puzzles, summary.examples
        );
        summaries.push(summary);
    }

    let dest = opts.output_dir.join("identifiers.json");
    if dest.exists() && !opts.overwrite {
        bail!("{} already exists (use overwrite option)", dest.display());
    }
    fs::copy(&identifiers_path, &dest)
        .with_context(|| format!("failed to copy identifier map to {}", dest.display()))?;
    Ok(summaries)
}

fn parse_chunk_name(name: &str) -> Option<(String, String)> {
    let rest = name.strip_suffix(".npy")?;
    let (_subset, rest) = rest.split_once("__")?;
    let (field, slug) = rest.rsplit_once("_chunk_")?;
    Some((field.to_string(), slug.to_string()))
}

/// Group chunk array files by field, each sorted by file name so merge
/// order is reproducible.
fn collect_chunk_files(split_dir: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for entry in fs::read_dir(split_dir)
        .with_context(|| format!("failed to read {}", split_dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(".npy") {
            continue;
        }
        match parse_chunk_name(name) {
            Some((field, _)) if ARRAY_FIELDS.contains(&field.as_str()) => {
                groups.entry(field).or_default().push(entry.path());
            }
            _ => warn!("ignoring unrecognized array file {name}"),
        }
    }
    for files in groups.values_mut() {
        files.sort();
    }
    Ok(groups)
}

fn chunk_slugs(files: &[PathBuf]) -> BTreeSet<String> {
    files
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .filter_map(|n| parse_chunk_name(n).map(|(_, slug)| slug))
        .collect()
}

fn stitch_split(
    split: &str,
    split_dir: &Path,
    opts: &StitchOptions,
    num_puzzle_identifiers: usize,
) -> Result<SplitSummary> {
    let groups = collect_chunk_files(split_dir)?;
    for field in ARRAY_FIELDS {
        if !groups.contains_key(field) {
            bail!(
                "split '{split}' has no {field} chunks under {}",
                split_dir.display()
            );
        }
    }
    let reference_slugs = chunk_slugs(&groups["inputs"]);
    for field in ARRAY_FIELDS {
        if chunk_slugs(&groups[field]) != reference_slugs {
            bail!("split '{split}': {field} chunks do not match the inputs chunk set");
        }
    }

    let out_path = |field: &str| opts.output_dir.join(format!("{split}__{field}.npy"));

    let example_rows = stitch_sequences(&groups["inputs"], &out_path("inputs"), opts.overwrite)?;
    let label_rows = stitch_sequences(&groups["labels"], &out_path("labels"), opts.overwrite)?;

    let mut identifiers: Vec<i32> = Vec::new();
    for path in &groups["puzzle_identifiers"] {
        identifiers.extend(read_index_array(path)?);
    }
    write_index_array(&out_path("puzzle_identifiers"), &identifiers, opts.overwrite)?;

    let puzzle_indices = stitch_indices(&groups["puzzle_indices"])?;
    write_index_array(&out_path("puzzle_indices"), &puzzle_indices, opts.overwrite)?;
    let group_indices = stitch_indices(&groups["group_indices"])?;
    write_index_array(&out_path("group_indices"), &group_indices, opts.overwrite)?;

    let total_examples = *puzzle_indices.last().unwrap_or(&0) as usize;
    if total_examples != example_rows || total_examples != label_rows {
        bail!(
            "split '{split}': puzzle_indices end at {total_examples} but arrays hold \
             {example_rows} input / {label_rows} label rows"
        );
    }
    let total_puzzles = *group_indices.last().unwrap_or(&0) as usize;
    if total_puzzles != identifiers.len() || total_puzzles + 1 != puzzle_indices.len() {
        bail!(
            "split '{split}': group_indices end at {total_puzzles} but found \
             {} identifiers and {} puzzle boundaries",
            identifiers.len(),
            puzzle_indices.len()
        );
    }

    let metadata = aggregate_metadata(split, split_dir, num_puzzle_identifiers)?;
    let total_groups = metadata.total_groups;
    metadata.write(
        &opts.output_dir.join(format!("{split}_dataset.json")),
        opts.overwrite,
    )?;

    Ok(SplitSummary {
        split: split.to_string(),
        chunks: reference_slugs.len(),
        examples: total_examples,
        puzzles: total_puzzles,
        groups: total_groups,
    })
}

/// Concatenate 2D chunk arrays row-wise after a header-only sizing pass.
fn stitch_sequences(files: &[PathBuf], out: &Path, overwrite: bool) -> Result<usize> {
    let mut total_rows = 0usize;
    let mut row_len: Option<usize> = None;
    for path in files {
        let (rows, width) = probe_2d(path)?;
        match row_len {
            None => row_len = Some(width),
            Some(expected) if expected != width => bail!(
                "{} holds rows of {width}, other chunks hold {expected}",
                path.display()
            ),
            _ => {}
        }
        total_rows += rows;
    }
    let row_len = row_len.unwrap_or(SEQ_LEN);

    let mut writer = SequenceWriter::create(out, total_rows, row_len, overwrite)?;
    let pb = default_progress_bar(total_rows as u64);
    for path in files {
        append_rows_from(path, &mut writer, Some(&pb))?;
    }
    pb.finish_and_clear();
    let written = writer.finish()?;
    if written != total_rows {
        bail!(
            "expected {total_rows} rows in {} but copied {written}",
            out.display()
        );
    }
    Ok(written)
}

/// Merge cumulative-boundary arrays with offset correction.
fn stitch_indices(files: &[PathBuf]) -> Result<Vec<i32>> {
    let mut merged: Vec<i32> = Vec::new();
    let mut offset: i32 = 0;
    for path in files {
        let chunk = read_index_array(path)?;
        match chunk.first() {
            Some(0) => {}
            _ => bail!(
                "{} is not a boundary array (must start at 0)",
                path.display()
            ),
        }
        let last = *chunk.last().unwrap();
        if merged.is_empty() {
            merged.extend(chunk);
        } else {
            merged.extend(chunk[1..].iter().map(|v| v + offset));
        }
        offset += last;
    }
    Ok(merged)
}

fn aggregate_metadata(
    split: &str,
    split_dir: &Path,
    num_puzzle_identifiers: usize,
) -> Result<PuzzleDatasetMetadata> {
    let mut meta_files: Vec<PathBuf> = fs::read_dir(split_dir)
        .with_context(|| format!("failed to read {}", split_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("metadata_chunk_") && n.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect();
    meta_files.sort();
    if meta_files.is_empty() {
        bail!("split '{split}' has no chunk metadata under {}", split_dir.display());
    }

    let mut total_groups = 0usize;
    // Approximation: chunk means are per-puzzle, weights are per-group, so
    // the reconstructed total drifts when augmentation shortfall makes group
    // sizes uneven. Exact counts remain recoverable from puzzle_indices.
    let mut total_examples = 0f64;
    let mut sets: BTreeSet<String> = BTreeSet::new();
    for path in &meta_files {
        let meta = PuzzleDatasetMetadata::read(path)?;
        if meta.seq_len != SEQ_LEN || meta.vocab_size != VOCAB_SIZE {
            bail!(
                "{} was built with seq_len {} / vocab {}, this pipeline uses {SEQ_LEN} / {VOCAB_SIZE}",
                path.display(),
                meta.seq_len,
                meta.vocab_size
            );
        }
        total_groups += meta.total_groups;
        total_examples += meta.mean_puzzle_examples * meta.total_groups as f64;
        sets.extend(meta.sets);
    }

    Ok(PuzzleDatasetMetadata {
        seq_len: SEQ_LEN,
        vocab_size: VOCAB_SIZE,
        pad_id: PAD_ID,
        ignore_label_id: PAD_ID,
        blank_identifier_id: 0,
        num_puzzle_identifiers,
        total_groups,
        mean_puzzle_examples: if total_groups == 0 {
            0.0
        } else {
            total_examples / total_groups as f64
        },
        sets: sets.into_iter().collect(),
    })
}
