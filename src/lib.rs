//! Convert directories of grid-transformation puzzles into flat,
//! index-addressable `.npy` training arrays.
//!
//! The pipeline runs in three phases: the [`registry`] scans every source
//! directory once and assigns a stable global id to each puzzle name, the
//! [`builder`] turns one source directory into a self-contained chunk of
//! token arrays plus CSR-style index arrays, and the [`stitch`] stage merges
//! all chunks of a split into one final dataset with offset-corrected
//! indices.

use indicatif::{ProgressBar, ProgressStyle};

pub mod augment;
pub mod builder;
pub mod error;
pub mod grid;
pub mod metadata;
pub mod puzzle;
pub mod registry;
pub mod stitch;
pub mod writer;

pub use builder::{build_dataset, BuildOptions, ChunkSummary};
pub use error::PackError;
pub use metadata::PuzzleDatasetMetadata;
pub use registry::IdentifierRegistry;
pub use stitch::{stitch_dataset, StitchOptions};

/// Maximum puzzle grid dimension. Grids are encoded onto a square canvas of
/// this size, so every token sequence has length [`SEQ_LEN`].
pub const MAX_GRID_SIZE: usize = 30;

/// Flattened length of one encoded grid.
pub const SEQ_LEN: usize = MAX_GRID_SIZE * MAX_GRID_SIZE;

/// Token alphabet: pad, end-of-grid marker, and the ten colors shifted by
/// [`COLOR_OFFSET`].
pub const VOCAB_SIZE: usize = 12;

/// Canvas fill value for cells outside the grid.
pub const PAD_ID: u8 = 0;

/// Marker written along the row below and the column right of a grid.
pub const EOS_ID: u8 = 1;

/// Shift applied to color values so they never collide with pad/marker.
pub const COLOR_OFFSET: u8 = 2;

/// Identifier id 0 is reserved and renders as this sentinel label.
pub const BLANK_IDENTIFIER: &str = "<blank>";

/// Candidate draws per requested augmentation before giving up.
pub const AUGMENT_RETRY_FACTOR: usize = 5;

pub(crate) fn default_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})",
        )
        .unwrap()
        .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    pb
}
