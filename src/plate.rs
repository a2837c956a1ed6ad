//! Well-grid addressing for multi-well containers.
//!
//! A [`WellGrid`] represents one plate (or tube rack) as an addressable 2-D
//! grid of integer cells. Each position is reachable three ways: by linear
//! index, by `(row, column)` pair, and by the alphanumeric label a
//! technician reads off the plate (`"A1"` through `"H12"` on a 96-well
//! plate). Cells hold occupant ids; the reserved sentinel (conventionally
//! [`EMPTY_WELL`]) means "no occupant".
//!
//! Grids are pure data: no I/O, no blocking, created empty at the start of
//! a run step and discarded when the step completes.
//!
//! # Label grammar
//!
//! A label is one uppercase row letter followed by a 1- or 2-digit column
//! number: `^[A-Z][0-9]{1,2}$`. Lowercase letters are rejected rather than
//! normalized, so a typo in a hand-entered label surfaces instead of
//! silently landing in the wrong well. Zero-padded columns are accepted
//! (`"A01"` addresses the same cell as `"A1"`) because instrument exports
//! zero-pad well coordinates in filenames.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, CytoError};

/// Sentinel value stored in cells with no occupant.
pub const EMPTY_WELL: i64 = -1;

/// Supported plate layouts: (total wells, rows, columns).
const PLATE_LAYOUTS: &[(usize, usize, usize)] = &[
    (6, 2, 3),
    (12, 3, 4),
    (24, 4, 6),
    (48, 6, 8),
    (96, 8, 12),
    (384, 16, 24),
];

/// Largest row count a label can address (`A` through `Z`).
const MAX_ROWS: usize = 26;
/// Largest column count a 2-digit label can address.
const MAX_COLS: usize = 99;

static WELL_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z])([0-9]{1,2})$").expect("well label pattern is valid"));

/// An addressable 2-D grid of wells with integer occupants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellGrid {
    rows: usize,
    cols: usize,
    cells: Vec<i64>,
    sentinel: i64,
}

impl WellGrid {
    /// Creates a grid of `size` wells with every cell set to `sentinel`.
    ///
    /// `size` must be one of the supported plate sizes (6, 12, 24, 48, 96,
    /// 384); anything else fails with [`CytoError::Shape`].
    pub fn create_empty(size: usize, sentinel: i64) -> AppResult<Self> {
        let (rows, cols) = PLATE_LAYOUTS
            .iter()
            .find(|(total, _, _)| *total == size)
            .map(|(_, rows, cols)| (*rows, *cols))
            .ok_or_else(|| CytoError::Shape(format!("unsupported plate size {size}")))?;
        Ok(Self {
            rows,
            cols,
            cells: vec![sentinel; size],
            sentinel,
        })
    }

    /// Builds a grid from an existing row-major 2-D array of occupants.
    ///
    /// The array must be non-empty and rectangular, and its dimensions must
    /// be addressable by the label grammar (at most 26 rows and 99
    /// columns). The sentinel is [`EMPTY_WELL`].
    pub fn from_array(matrix: Vec<Vec<i64>>) -> AppResult<Self> {
        if matrix.is_empty() || matrix[0].is_empty() {
            return Err(CytoError::Shape("empty well matrix".to_string()));
        }
        let rows = matrix.len();
        let cols = matrix[0].len();
        if let Some(bad) = matrix.iter().position(|row| row.len() != cols) {
            return Err(CytoError::Shape(format!(
                "ragged well matrix: row 0 has {cols} columns, row {bad} has {}",
                matrix[bad].len()
            )));
        }
        if rows > MAX_ROWS || cols > MAX_COLS {
            return Err(CytoError::Shape(format!(
                "{rows}x{cols} exceeds the addressable label range"
            )));
        }
        Ok(Self {
            rows,
            cols,
            cells: matrix.into_iter().flatten().collect(),
            sentinel: EMPTY_WELL,
        })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of wells.
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    /// The value meaning "no occupant" in this grid.
    pub fn sentinel(&self) -> i64 {
        self.sentinel
    }

    /// Sets the well addressed by `label` to `value`.
    pub fn set(&mut self, label: &str, value: i64) -> AppResult<()> {
        let index = self.index_of(label)?;
        self.cells[index] = value;
        Ok(())
    }

    /// Returns the value of the well addressed by `label`.
    ///
    /// Unset wells read back as the sentinel.
    pub fn get(&self, label: &str) -> AppResult<i64> {
        let index = self.index_of(label)?;
        Ok(self.cells[index])
    }

    /// Returns the row-major 2-D array form of the grid.
    pub fn to_array(&self) -> Vec<Vec<i64>> {
        self.cells
            .chunks(self.cols)
            .map(|row| row.to_vec())
            .collect()
    }

    /// Lazily yields the labels of wells whose value satisfies `predicate`,
    /// in stable row-major order.
    ///
    /// The iterator borrows the grid; call the method again to restart.
    pub fn occupied_labels<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = String> + 'a
    where
        P: Fn(i64) -> bool + 'a,
    {
        self.cells
            .iter()
            .enumerate()
            .filter(move |(_, value)| predicate(**value))
            .map(move |(index, _)| self.label_of(index))
    }

    /// Resolves a label to a linear index, enforcing grammar and bounds.
    fn index_of(&self, label: &str) -> AppResult<usize> {
        let caps = WELL_LABEL.captures(label).ok_or_else(|| {
            CytoError::InvalidLabel(format!(
                "'{label}' is not an uppercase row letter followed by a column number"
            ))
        })?;
        let row = (caps[1].as_bytes()[0] - b'A') as usize;
        let col: usize = caps[2]
            .parse()
            .map_err(|_| CytoError::InvalidLabel(format!("'{label}' has no column number")))?;
        if row >= self.rows || col < 1 || col > self.cols {
            return Err(CytoError::InvalidLabel(format!(
                "'{label}' is outside this {}x{} grid",
                self.rows, self.cols
            )));
        }
        Ok(row * self.cols + (col - 1))
    }

    /// Label of the well at `index`, e.g. `0 -> "A1"`.
    fn label_of(&self, index: usize) -> String {
        let row = index / self.cols;
        let col = index % self.cols + 1;
        format!("{}{col}", char::from(b'A' + row as u8))
    }
}
