//! Puzzle source-file parsing and stable file discovery.
//!
//! A puzzle file is a JSON object mapping example-bucket labels (for example
//! `"train"` / `"test"`) to lists of `{input, output}` grid pairs, with an
//! optional top-level `name`. Buckets are traversed in lexicographic label
//! order so example order is deterministic regardless of JSON key order.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use crate::error::PackError;
use crate::grid::Grid;

/// A named puzzle: an ordered set of (input, output) example grids.
///
/// `base_id` is the identity the puzzle resolves to in the identifier
/// registry. For parsed puzzles it equals `id`; augmented variants keep the
/// base name while `id` carries the transform lineage.
#[derive(Clone, Debug)]
pub struct Puzzle {
    pub id: String,
    pub base_id: String,
    pub examples: Vec<(Grid, Grid)>,
}

#[derive(Debug, Deserialize)]
struct RawExample {
    input: Vec<Vec<i64>>,
    output: Vec<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
struct RawPuzzleFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(flatten)]
    buckets: BTreeMap<String, serde_json::Value>,
}

/// Parse one puzzle file. Grid violations and malformed JSON are fatal for
/// this file only.
pub fn parse_puzzle_file(path: &Path) -> Result<Puzzle, PackError> {
    let content = fs::read_to_string(path).map_err(|source| PackError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawPuzzleFile =
        serde_json::from_str(&content).map_err(|source| PackError::ParseFile {
            path: path.to_path_buf(),
            source,
        })?;

    let name = raw.name.unwrap_or_else(|| file_stem(path));
    let mut examples = Vec::new();
    for (_, value) in raw.buckets {
        if !value.is_array() {
            continue;
        }
        let bucket: Vec<RawExample> =
            serde_json::from_value(value).map_err(|source| PackError::ParseFile {
                path: path.to_path_buf(),
                source,
            })?;
        for example in bucket {
            examples.push((Grid::parse(&example.input)?, Grid::parse(&example.output)?));
        }
    }

    Ok(Puzzle {
        id: name.clone(),
        base_id: name,
        examples,
    })
}

/// Read the name a puzzle file declares, falling back to the file stem.
pub fn declared_name(path: &Path) -> Result<String, PackError> {
    #[derive(Deserialize)]
    struct NameOnly {
        #[serde(default)]
        name: Option<String>,
    }
    let content = fs::read_to_string(path).map_err(|source| PackError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: NameOnly = serde_json::from_str(&content).map_err(|source| PackError::ParseFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(raw.name.unwrap_or_else(|| file_stem(path)))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Discover puzzle files up to two directory levels deep, in sorted order.
///
/// Traversal order is part of the observable contract: the identifier
/// registry and the chunk builder must see files in the same order.
pub fn discover_puzzle_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(2)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}
