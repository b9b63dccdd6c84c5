//! Domain error taxonomy.
//!
//! Grid and file errors are fatal only for the puzzle file that produced
//! them; callers log and move on. An identifier miss means the registry was
//! built over a different directory set than chunk building and aborts the
//! run, since emitting an unassigned id would corrupt the identifier space.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("grid has no cells")]
    EmptyGrid,

    #[error("grid row {row} has {got} columns, expected {expected}")]
    RaggedGrid {
        row: usize,
        got: usize,
        expected: usize,
    },

    #[error("grid is {rows}x{cols}, limit is {max}x{max}")]
    OversizedGrid { rows: usize, cols: usize, max: usize },

    #[error("grid cell ({row}, {col}) holds {value}, outside 0..=9")]
    CellOutOfRange { row: usize, col: usize, value: i64 },

    #[error("failed to read puzzle file {path}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse puzzle file {path}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("puzzle '{name}' is missing from the identifier registry")]
    UnknownIdentifier { name: String },
}
