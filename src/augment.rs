//! Symmetry/color-permutation augmentation with content-hash deduplication.
//!
//! Each candidate variant composes one of the 8 dihedral symmetries with a
//! color permutation that fixes the background color 0. Candidates whose
//! canonical content hash collides with an already-accepted member of the
//! group are discarded; the draw budget is `AUGMENT_RETRY_FACTOR` trials per
//! requested variant, so a shortfall is possible and non-fatal.

use std::collections::HashSet;

use log::warn;
use rand::seq::SliceRandom;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::grid::Grid;
use crate::puzzle::Puzzle;
use crate::AUGMENT_RETRY_FACTOR;

/// A base puzzle plus its accepted variants, original first.
#[derive(Clone, Debug)]
pub struct AugmentedGroup {
    pub puzzles: Vec<Puzzle>,
    /// Requested variants that could not be produced uniquely.
    pub shortfall: usize,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn grid_hash(grid: &Grid) -> String {
    let mut hasher = Sha256::new();
    hasher.update([grid.rows() as u8]);
    hasher.update(b".");
    hasher.update([grid.cols() as u8]);
    hasher.update(b".");
    hasher.update(grid.cells());
    hex(&hasher.finalize())
}

/// Canonical content hash of a puzzle's example set.
///
/// Example hash-pairs are sorted before the final digest, so two puzzles
/// with the same examples in a different order hash identically.
pub fn puzzle_hash(puzzle: &Puzzle) -> String {
    let mut pairs: Vec<String> = puzzle
        .examples
        .iter()
        .map(|(input, output)| format!("{}|{}", grid_hash(input), grid_hash(output)))
        .collect();
    pairs.sort();
    let mut hasher = Sha256::new();
    hasher.update(pairs.join("|").as_bytes());
    hex(&hasher.finalize())
}

/// Generate up to `aug_count` deduplicated variants of `base`.
///
/// The base puzzle's own hash seeds the seen-set, so a variant identical to
/// the original is rejected too. Returns the partial group and the shortfall
/// count when the retry budget runs out.
pub fn augment_puzzle<R: Rng>(base: &Puzzle, aug_count: usize, rng: &mut R) -> AugmentedGroup {
    let mut puzzles = vec![base.clone()];
    if aug_count == 0 {
        return AugmentedGroup {
            puzzles,
            shortfall: 0,
        };
    }

    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(puzzle_hash(base));

    for _ in 0..AUGMENT_RETRY_FACTOR * aug_count {
        if puzzles.len() > aug_count {
            break;
        }
        let tid: u8 = rng.gen_range(0..8);
        let mut mapping = [0u8; 10];
        let mut colors: Vec<u8> = (1..=9).collect();
        colors.shuffle(rng);
        mapping[1..].copy_from_slice(&colors);

        let examples = base
            .examples
            .iter()
            .map(|(input, output)| {
                (
                    input.map_colors(&mapping).dihedral(tid),
                    output.map_colors(&mapping).dihedral(tid),
                )
            })
            .collect();
        let tag: String = mapping.iter().map(|d| d.to_string()).collect();
        let candidate = Puzzle {
            id: format!("{}_t{}_{}", base.id, tid, tag),
            base_id: base.base_id.clone(),
            examples,
        };
        if seen.insert(puzzle_hash(&candidate)) {
            puzzles.push(candidate);
        }
    }

    let shortfall = aug_count + 1 - puzzles.len();
    if shortfall > 0 {
        warn!(
            "puzzle {}: only {}/{} unique augmentations found",
            base.id,
            puzzles.len() - 1,
            aug_count
        );
    }
    AugmentedGroup { puzzles, shortfall }
}
