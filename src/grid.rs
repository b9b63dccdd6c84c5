//! Grid validation, dihedral transforms, and fixed-width pair encoding.
//!
//! A validated [`Grid`] is immutable; transforms return new grids. Encoding
//! places a grid on a zeroed `MAX_GRID_SIZE × MAX_GRID_SIZE` canvas with the
//! cell values shifted by [`COLOR_OFFSET`], writes [`EOS_ID`] markers along
//! the row below and the column right of the grid, and flattens row-major.
//! The result is self-delimiting: pad fills unused canvas, the marker says
//! "grid ends here", values 2..=11 are colors.

use rand::Rng;

use crate::error::PackError;
use crate::{COLOR_OFFSET, EOS_ID, MAX_GRID_SIZE, PAD_ID, SEQ_LEN};

/// A rectangular grid of colors 0..=9, at most `MAX_GRID_SIZE` per side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<u8>,
}

impl Grid {
    /// Validate a raw 2D array into a `Grid`.
    pub fn parse(raw: &[Vec<i64>]) -> Result<Self, PackError> {
        let rows = raw.len();
        if rows == 0 {
            return Err(PackError::EmptyGrid);
        }
        let cols = raw[0].len();
        if cols == 0 {
            return Err(PackError::EmptyGrid);
        }
        for (row, values) in raw.iter().enumerate() {
            if values.len() != cols {
                return Err(PackError::RaggedGrid {
                    row,
                    got: values.len(),
                    expected: cols,
                });
            }
        }
        if rows > MAX_GRID_SIZE || cols > MAX_GRID_SIZE {
            return Err(PackError::OversizedGrid {
                rows,
                cols,
                max: MAX_GRID_SIZE,
            });
        }
        let mut cells = Vec::with_capacity(rows * cols);
        for (row, values) in raw.iter().enumerate() {
            for (col, &value) in values.iter().enumerate() {
                if !(0..=9).contains(&value) {
                    return Err(PackError::CellOutOfRange { row, col, value });
                }
                cells.push(value as u8);
            }
        }
        Ok(Self { rows, cols, cells })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row-major cell bytes.
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.cells[row * self.cols + col]
    }

    /// Apply one of the 8 square symmetries.
    ///
    /// 0 identity, 1..=3 CCW rotations by 90/180/270 degrees, 4 horizontal
    /// flip, 5 vertical flip, 6 transpose, 7 anti-transpose.
    pub fn dihedral(&self, tid: u8) -> Grid {
        let (rows, cols) = (self.rows, self.cols);
        let (out_rows, out_cols) = match tid {
            0 | 2 | 4 | 5 => (rows, cols),
            _ => (cols, rows),
        };
        let mut cells = vec![0u8; rows * cols];
        for r in 0..out_rows {
            for c in 0..out_cols {
                let value = match tid {
                    0 => self.get(r, c),
                    1 => self.get(c, cols - 1 - r),
                    2 => self.get(rows - 1 - r, cols - 1 - c),
                    3 => self.get(rows - 1 - c, r),
                    4 => self.get(r, cols - 1 - c),
                    5 => self.get(rows - 1 - r, c),
                    6 => self.get(c, r),
                    7 => self.get(rows - 1 - c, cols - 1 - r),
                    _ => unreachable!("dihedral transform ids are 0..8"),
                };
                cells[r * out_cols + c] = value;
            }
        }
        Grid {
            rows: out_rows,
            cols: out_cols,
            cells,
        }
    }

    /// Remap every cell through a 10-entry color table.
    pub fn map_colors(&self, mapping: &[u8; 10]) -> Grid {
        Grid {
            rows: self.rows,
            cols: self.cols,
            cells: self.cells.iter().map(|&c| mapping[c as usize]).collect(),
        }
    }
}

/// Encode an (input, output) pair into two fixed-width token sequences.
///
/// When `translate` is set, a uniform row/column offset is drawn once and
/// shared by both grids so the pair stays spatially aligned; randomness is
/// consumed only in that case.
pub fn encode_pair<R: Rng>(
    input: &Grid,
    output: &Grid,
    translate: bool,
    rng: &mut R,
) -> ([u8; SEQ_LEN], [u8; SEQ_LEN]) {
    let (off_r, off_c) = if translate {
        let max_rows = input.rows.max(output.rows);
        let max_cols = input.cols.max(output.cols);
        (
            rng.gen_range(0..=MAX_GRID_SIZE - max_rows),
            rng.gen_range(0..=MAX_GRID_SIZE - max_cols),
        )
    } else {
        (0, 0)
    };
    (
        encode_grid(input, off_r, off_c),
        encode_grid(output, off_r, off_c),
    )
}

fn encode_grid(grid: &Grid, off_r: usize, off_c: usize) -> [u8; SEQ_LEN] {
    let mut seq = [PAD_ID; SEQ_LEN];
    for r in 0..grid.rows {
        for c in 0..grid.cols {
            seq[(off_r + r) * MAX_GRID_SIZE + off_c + c] = grid.get(r, c) + COLOR_OFFSET;
        }
    }
    let eos_r = off_r + grid.rows;
    let eos_c = off_c + grid.cols;
    if eos_r < MAX_GRID_SIZE {
        for c in off_c..eos_c {
            seq[eos_r * MAX_GRID_SIZE + c] = EOS_ID;
        }
    }
    if eos_c < MAX_GRID_SIZE {
        for r in off_r..eos_r {
            seq[r * MAX_GRID_SIZE + eos_c] = EOS_ID;
        }
    }
    seq
}
