//! Chunk Builder: stream one source directory into index-addressed arrays.
//!
//! Each directory yields one self-contained chunk under
//! `<output>/<split>/`: `inputs`/`labels` token arrays, the
//! `puzzle_identifiers` array, the `puzzle_indices`/`group_indices`
//! cumulative-boundary arrays, and a metadata document. The pass is strictly
//! sequential; index arrays are built by append, so puzzle order is the
//! correctness contract, not an implementation detail.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::augment::augment_puzzle;
use crate::error::PackError;
use crate::grid::encode_pair;
use crate::metadata::PuzzleDatasetMetadata;
use crate::puzzle::{discover_puzzle_files, parse_puzzle_file};
use crate::registry::IdentifierRegistry;
use crate::writer::{write_index_array, SequenceWriter};
use crate::{default_progress_bar, PAD_ID, SEQ_LEN, VOCAB_SIZE};

/// Build configuration supplied by the CLI.
#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub dataset_dirs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    /// RNG seed, re-applied at the start of every source directory so each
    /// chunk reproduces independently.
    pub seed: u64,
    /// Augmented variants requested per puzzle.
    pub num_aug: usize,
    pub overwrite: bool,
}

/// Per-chunk result counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkSummary {
    pub split: String,
    pub slug: String,
    pub groups: usize,
    pub puzzles: usize,
    pub examples: usize,
    pub augmentation_shortfall: usize,
}

/// Build one chunk per existing source directory, after persisting the
/// identifier map. Missing and empty directories are skipped with a warning.
pub fn build_dataset(
    opts: &BuildOptions,
    registry: &IdentifierRegistry,
) -> Result<Vec<ChunkSummary>> {
    fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("failed to create {}", opts.output_dir.display()))?;
    registry.write(&opts.output_dir.join("identifiers.json"), opts.overwrite)?;

    let mut summaries = Vec::new();
    for dir in &opts.dataset_dirs {
        if !dir.is_dir() {
            warn!("directory {} not found, skipping", dir.display());
            continue;
        }
        if let Some(summary) = build_chunk(dir, opts, registry)? {
            info!(
                "chunk {} ({}): {} groups, {} puzzles, {} examples",
                summary.slug, summary.split, summary.groups, summary.puzzles, summary.examples
            );
            summaries.push(summary);
        }
    }
    Ok(summaries)
}

/// Whether a directory feeds the train split, by path convention.
fn infer_split(dir: &Path) -> &'static str {
    let has_train = |p: &Path| {
        p.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_ascii_lowercase().contains("train"))
            .unwrap_or(false)
    };
    if has_train(dir) || dir.parent().map(has_train).unwrap_or(false) {
        "train"
    } else {
        "test"
    }
}

/// Stable chunk name derived from the corpus (parent) directory name.
fn chunk_slug(dir: &Path) -> String {
    let name = dir
        .parent()
        .and_then(|p| p.file_name())
        .or_else(|| dir.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("chunk");
    let mut slug = String::with_capacity(name.len());
    for ch in name.to_ascii_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("chunk");
    }
    slug
}

fn build_chunk(
    dir: &Path,
    opts: &BuildOptions,
    registry: &IdentifierRegistry,
) -> Result<Option<ChunkSummary>> {
    let files = discover_puzzle_files(dir);
    if files.is_empty() {
        warn!("no puzzle files under {}, skipping", dir.display());
        return Ok(None);
    }

    let split = infer_split(dir);
    let translate = split == "train";
    let slug = chunk_slug(dir);

    // Pre-pass: count examples per file so backing storage can be allocated
    // once. Estimates are an upper bound; augmentation shortfall only ever
    // shrinks the actual counts, and the writers truncate on finish.
    let mut counted_files: Vec<(PathBuf, usize)> = Vec::with_capacity(files.len());
    for file in files {
        match parse_puzzle_file(&file) {
            Ok(puzzle) => counted_files.push((file, puzzle.examples.len())),
            Err(err) => warn!("skipping {}: {err}", file.display()),
        }
    }
    if counted_files.is_empty() {
        warn!("no parseable puzzles under {}, skipping", dir.display());
        return Ok(None);
    }
    let per_puzzle = opts.num_aug + 1;
    let est_examples: usize = counted_files.iter().map(|(_, n)| n * per_puzzle).sum();
    let est_puzzles = counted_files.len() * per_puzzle;

    let split_dir = opts.output_dir.join(split);
    fs::create_dir_all(&split_dir)
        .with_context(|| format!("failed to create {}", split_dir.display()))?;
    let array_path =
        |field: &str| split_dir.join(format!("all__{field}_chunk_{slug}.npy"));

    let mut inputs =
        SequenceWriter::create(&array_path("inputs"), est_examples, SEQ_LEN, opts.overwrite)?;
    let mut labels =
        SequenceWriter::create(&array_path("labels"), est_examples, SEQ_LEN, opts.overwrite)?;
    let mut puzzle_identifiers: Vec<i32> = Vec::with_capacity(est_puzzles);
    let mut puzzle_indices: Vec<i32> = Vec::with_capacity(est_puzzles + 1);
    let mut group_indices: Vec<i32> = Vec::with_capacity(counted_files.len() + 1);
    puzzle_indices.push(0);
    group_indices.push(0);

    // One seed per directory: same seed + same traversal order reproduces
    // the same chunk bit for bit.
    let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);
    let mut example_cursor: i32 = 0;
    let mut puzzle_cursor: i32 = 0;
    let mut shortfall_total = 0usize;

    let pb = default_progress_bar(counted_files.len() as u64);
    pb.set_message(format!("{slug}/{split}"));
    for (file, _) in &counted_files {
        let puzzle = match parse_puzzle_file(file) {
            Ok(p) => p,
            Err(err) => {
                warn!("skipping {}: {err}", file.display());
                pb.inc(1);
                continue;
            }
        };
        let group = augment_puzzle(&puzzle, opts.num_aug, &mut rng);
        shortfall_total += group.shortfall;

        for member in &group.puzzles {
            let id = registry
                .lookup(&member.base_id)
                .ok_or_else(|| PackError::UnknownIdentifier {
                    name: member.base_id.clone(),
                })?;
            for (input, output) in &member.examples {
                let (input_seq, label_seq) = encode_pair(input, output, translate, &mut rng);
                inputs.push_row(&input_seq)?;
                labels.push_row(&label_seq)?;
                example_cursor += 1;
            }
            puzzle_identifiers.push(id);
            puzzle_indices.push(example_cursor);
            puzzle_cursor += 1;
        }
        group_indices.push(puzzle_cursor);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let examples = inputs.finish()?;
    labels.finish()?;
    write_index_array(&array_path("puzzle_identifiers"), &puzzle_identifiers, opts.overwrite)?;
    write_index_array(&array_path("puzzle_indices"), &puzzle_indices, opts.overwrite)?;
    write_index_array(&array_path("group_indices"), &group_indices, opts.overwrite)?;

    let total_puzzles = puzzle_identifiers.len();
    let total_groups = group_indices.len() - 1;
    let metadata = PuzzleDatasetMetadata {
        seq_len: SEQ_LEN,
        vocab_size: VOCAB_SIZE,
        pad_id: PAD_ID,
        ignore_label_id: PAD_ID,
        blank_identifier_id: 0,
        num_puzzle_identifiers: registry.len(),
        total_groups,
        mean_puzzle_examples: if total_puzzles == 0 {
            0.0
        } else {
            examples as f64 / total_puzzles as f64
        },
        sets: vec!["all".to_string()],
    };
    metadata.write(
        &split_dir.join(format!("metadata_chunk_{slug}.json")),
        opts.overwrite,
    )?;

    Ok(Some(ChunkSummary {
        split: split.to_string(),
        slug,
        groups: total_groups,
        puzzles: total_puzzles,
        examples,
        augmentation_shortfall: shortfall_total,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{read_2d_u8, read_index_array};
    use crate::{COLOR_OFFSET, EOS_ID, MAX_GRID_SIZE};
    use std::path::Path;
    use tempfile::tempdir;

    fn write_puzzle(dir: &Path, file: &str, examples: &[(i64, i64)]) {
        let pairs: Vec<serde_json::Value> = examples
            .iter()
            .map(|(i, o)| serde_json::json!({"input": [[i]], "output": [[o]]}))
            .collect();
        fs::write(
            dir.join(file),
            serde_json::to_string(&serde_json::json!({"train": pairs})).unwrap(),
        )
        .unwrap();
    }

    fn options(root: &Path, dirs: Vec<PathBuf>, num_aug: usize) -> BuildOptions {
        BuildOptions {
            dataset_dirs: dirs,
            output_dir: root.join("out"),
            seed: 42,
            num_aug,
            overwrite: false,
        }
    }

    #[test]
    fn split_is_inferred_from_directory_names() {
        assert_eq!(infer_split(Path::new("/raw/corpus-training/data")), "train");
        assert_eq!(infer_split(Path::new("/raw/corpus/train")), "train");
        assert_eq!(infer_split(Path::new("/raw/corpus-eval/data")), "test");
    }

    #[test]
    fn chunk_slug_comes_from_the_parent_directory() {
        assert_eq!(chunk_slug(Path::new("/raw/ARC (v2)!/data")), "arc-v2");
        assert_eq!(chunk_slug(Path::new("solo")), "solo");
    }

    #[test]
    fn chunk_arrays_follow_the_csr_contract() {
        let tmp = tempdir().unwrap();
        let data_dir = tmp.path().join("corpus-eval/data");
        fs::create_dir_all(&data_dir).unwrap();
        write_puzzle(&data_dir, "a.json", &[(1, 2)]);
        write_puzzle(&data_dir, "b.json", &[(3, 4), (5, 6)]);

        let opts = options(tmp.path(), vec![data_dir.clone()], 0);
        let registry = IdentifierRegistry::build(&[data_dir]);
        let summaries = build_dataset(&opts, &registry).unwrap();
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert_eq!(summary.split, "test");
        assert_eq!((summary.groups, summary.puzzles, summary.examples), (2, 2, 3));

        let split_dir = opts.output_dir.join("test");
        let slug = &summary.slug;
        let puzzle_indices =
            read_index_array(&split_dir.join(format!("all__puzzle_indices_chunk_{slug}.npy")))
                .unwrap();
        let group_indices =
            read_index_array(&split_dir.join(format!("all__group_indices_chunk_{slug}.npy")))
                .unwrap();
        let identifiers = read_index_array(
            &split_dir.join(format!("all__puzzle_identifiers_chunk_{slug}.npy")),
        )
        .unwrap();
        assert_eq!(puzzle_indices, vec![0, 1, 3]);
        assert_eq!(group_indices, vec![0, 1, 2]);
        assert_eq!(identifiers, vec![1, 2]);

        // test split encodes without translation: grid lands at the origin
        let (rows, row_len, data) =
            read_2d_u8(&split_dir.join(format!("all__inputs_chunk_{slug}.npy"))).unwrap();
        assert_eq!((rows, row_len), (3, SEQ_LEN));
        assert_eq!(data[0], 1 + COLOR_OFFSET);
        assert_eq!(data[1], EOS_ID);
        assert_eq!(data[MAX_GRID_SIZE], EOS_ID);
        let (label_rows, _, label_data) =
            read_2d_u8(&split_dir.join(format!("all__labels_chunk_{slug}.npy"))).unwrap();
        assert_eq!(label_rows, 3);
        assert_eq!(label_data[0], 2 + COLOR_OFFSET);

        let metadata = PuzzleDatasetMetadata::read(
            &split_dir.join(format!("metadata_chunk_{slug}.json")),
        )
        .unwrap();
        assert_eq!(metadata.seq_len, SEQ_LEN);
        assert_eq!(metadata.vocab_size, VOCAB_SIZE);
        assert_eq!(metadata.total_groups, 2);
        assert_eq!(metadata.num_puzzle_identifiers, 3);
        assert!((metadata.mean_puzzle_examples - 1.5).abs() < 1e-9);
        assert_eq!(metadata.sets, vec!["all".to_string()]);
    }

    #[test]
    fn augmented_groups_share_the_base_identifier() {
        let tmp = tempdir().unwrap();
        let data_dir = tmp.path().join("corpus/data");
        fs::create_dir_all(&data_dir).unwrap();
        // Asymmetric grid so augmentations exist.
        fs::write(
            data_dir.join("p1.json"),
            serde_json::to_string(&serde_json::json!({
                "train": [{"input": [[1, 2], [3, 4]], "output": [[5, 6], [7, 8]]}],
            }))
            .unwrap(),
        )
        .unwrap();

        let opts = options(tmp.path(), vec![data_dir.clone()], 3);
        let registry = IdentifierRegistry::build(&[data_dir]);
        let summaries = build_dataset(&opts, &registry).unwrap();
        let summary = &summaries[0];
        assert_eq!(summary.groups, 1);
        assert!(summary.puzzles >= 1 && summary.puzzles <= 4);
        assert_eq!(summary.puzzles + summary.augmentation_shortfall, 4);

        let split_dir = opts.output_dir.join("test");
        let slug = &summary.slug;
        let identifiers = read_index_array(
            &split_dir.join(format!("all__puzzle_identifiers_chunk_{slug}.npy")),
        )
        .unwrap();
        assert!(identifiers.iter().all(|&id| id == 1));
        let group_indices =
            read_index_array(&split_dir.join(format!("all__group_indices_chunk_{slug}.npy")))
                .unwrap();
        assert_eq!(group_indices, vec![0, summary.puzzles as i32]);
        let puzzle_indices =
            read_index_array(&split_dir.join(format!("all__puzzle_indices_chunk_{slug}.npy")))
                .unwrap();
        assert!(puzzle_indices.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*puzzle_indices.last().unwrap() as usize, summary.examples);
    }

    #[test]
    fn malformed_file_aborts_only_that_puzzle() {
        let tmp = tempdir().unwrap();
        let data_dir = tmp.path().join("corpus/data");
        fs::create_dir_all(&data_dir).unwrap();
        write_puzzle(&data_dir, "good.json", &[(1, 2)]);
        fs::write(data_dir.join("bad.json"), "{broken").unwrap();

        let opts = options(tmp.path(), vec![data_dir.clone()], 0);
        let registry = IdentifierRegistry::build(&[data_dir]);
        let summaries = build_dataset(&opts, &registry).unwrap();
        assert_eq!(summaries[0].groups, 1);
        assert_eq!(summaries[0].examples, 1);
    }

    #[test]
    fn empty_directory_produces_no_chunk() {
        let tmp = tempdir().unwrap();
        let data_dir = tmp.path().join("corpus/data");
        fs::create_dir_all(&data_dir).unwrap();

        let opts = options(tmp.path(), vec![data_dir.clone()], 0);
        let registry = IdentifierRegistry::build(&[data_dir]);
        let summaries = build_dataset(&opts, &registry).unwrap();
        assert!(summaries.is_empty());
        assert!(!opts.output_dir.join("test").exists());
    }

    #[test]
    fn registry_miss_aborts_the_run() {
        let tmp = tempdir().unwrap();
        let data_dir = tmp.path().join("corpus/data");
        let other_dir = tmp.path().join("other/data");
        fs::create_dir_all(&data_dir).unwrap();
        fs::create_dir_all(&other_dir).unwrap();
        write_puzzle(&data_dir, "a.json", &[(1, 2)]);
        write_puzzle(&other_dir, "elsewhere.json", &[(1, 2)]);

        let opts = options(tmp.path(), vec![data_dir], 0);
        // Registry built over a different directory set.
        let registry = IdentifierRegistry::build(&[other_dir]);
        let err = build_dataset(&opts, &registry).unwrap_err();
        assert!(err.to_string().contains("identifier registry"));
    }

    #[test]
    fn train_split_stays_reproducible_across_runs() {
        let tmp = tempdir().unwrap();
        let data_dir = tmp.path().join("corpus-train/data");
        fs::create_dir_all(&data_dir).unwrap();
        write_puzzle(&data_dir, "a.json", &[(1, 2), (3, 4)]);
        fs::write(
            data_dir.join("b.json"),
            serde_json::to_string(&serde_json::json!({
                "train": [{"input": [[1, 2], [3, 4]], "output": [[5]]}],
            }))
            .unwrap(),
        )
        .unwrap();

        let registry = IdentifierRegistry::build(&[data_dir.clone()]);
        let mut opts = options(tmp.path(), vec![data_dir], 2);
        let first = build_dataset(&opts, &registry).unwrap();
        opts.overwrite = true;
        let second = build_dataset(&opts, &registry).unwrap();
        assert_eq!(first, second);

        let split_dir = opts.output_dir.join("train");
        let slug = &first[0].slug;
        let (_, _, run_a) =
            read_2d_u8(&split_dir.join(format!("all__inputs_chunk_{slug}.npy"))).unwrap();
        assert!(!run_a.is_empty());
    }
}
