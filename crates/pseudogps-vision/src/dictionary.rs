//! Classic ArUco 5×5 marker dictionary.
//!
//! Each marker encodes a 10-bit id (0..1023) as five rows of five cells.
//! A row carries 2 data bits, expanded into one of four 5-bit codewords:
//!
//! | Data bits | Codeword |
//! |---|---|
//! | `00` | `10000` |
//! | `01` | `10111` |
//! | `10` | `01001` |
//! | `11` | `01110` |
//!
//! The codewords are pairwise hamming distance ≥ 3, which is what lets the
//! decoder reject arbitrary dark quadrilaterals: a candidate grid is accepted
//! only when *every* row matches a codeword exactly in one of the four
//! rotations.
//!
//! Cell convention: `true` is a white cell, `false` a black cell.

use pseudogps_types::{GpsError, MarkerId};

/// Number of data cells per marker side (the printed marker adds a one-cell
/// black border around this grid).
pub const GRID_SIZE: usize = 5;

/// Number of distinct ids in the family.
pub const FAMILY_SIZE: u16 = 1024;

/// A 5×5 grid of marker cells, row-major, `true` = white.
pub type MarkerBits = [[bool; GRID_SIZE]; GRID_SIZE];

/// The four row codewords, indexed by the 2 data bits they encode.
const CODEWORDS: [[bool; GRID_SIZE]; 4] = [
    [true, false, false, false, false],  // 00
    [true, false, true, true, true],     // 01
    [false, true, false, false, true],   // 10
    [false, true, true, true, false],    // 11
];

/// Expand a marker id into its 5×5 cell grid.
///
/// Row 0 carries the two most significant bits of the id.
///
/// # Errors
///
/// Returns [`GpsError::Detection`] when `id` is outside the family
/// (`0..1024`).
pub fn bits(id: MarkerId) -> Result<MarkerBits, GpsError> {
    if id >= FAMILY_SIZE {
        return Err(GpsError::Detection(format!(
            "marker id {id} outside family (0..{FAMILY_SIZE})"
        )));
    }
    let mut grid = [[false; GRID_SIZE]; GRID_SIZE];
    for (row, cells) in grid.iter_mut().enumerate() {
        let data = (id >> (2 * (GRID_SIZE - 1 - row))) & 0b11;
        *cells = CODEWORDS[data as usize];
    }
    Ok(grid)
}

/// Decode a sampled cell grid.
///
/// Tries all four rotations of `grid`; a rotation is accepted only when every
/// row equals one of the four codewords (hamming distance 0, matching the
/// reference detector). Returns the id together with the number of 90°
/// clockwise rotations that were applied to reach the canonical orientation,
/// so the caller can re-order its quad corners accordingly.
///
/// Returns `None` when no rotation yields a valid codeword in every row.
pub fn decode(grid: &MarkerBits) -> Option<(MarkerId, usize)> {
    let mut candidate = *grid;
    for rotation in 0..4 {
        if let Some(id) = decode_upright(&candidate) {
            return Some((id, rotation));
        }
        candidate = rotate_cw(&candidate);
    }
    None
}

/// Hamming distance between a grid and the nearest valid marker of the
/// family, minimised over the four rotations. Zero for every well-formed
/// marker; useful for diagnosing borderline camera frames.
pub fn distance(grid: &MarkerBits) -> u32 {
    let mut candidate = *grid;
    let mut best = u32::MAX;
    for _ in 0..4 {
        let d: u32 = candidate.iter().map(|row| row_distance(row)).sum();
        best = best.min(d);
        candidate = rotate_cw(&candidate);
    }
    best
}

/// Rotate a grid 90° clockwise.
pub fn rotate_cw(grid: &MarkerBits) -> MarkerBits {
    let mut out = [[false; GRID_SIZE]; GRID_SIZE];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = grid[GRID_SIZE - 1 - j][i];
        }
    }
    out
}

// Decode without trying rotations: every row must be an exact codeword.
fn decode_upright(grid: &MarkerBits) -> Option<MarkerId> {
    let mut id: MarkerId = 0;
    for row in grid {
        let data = CODEWORDS.iter().position(|w| w == row)?;
        id = (id << 2) | data as MarkerId;
    }
    Some(id)
}

// Hamming distance from one row to its nearest codeword.
fn row_distance(row: &[bool; GRID_SIZE]) -> u32 {
    CODEWORDS
        .iter()
        .map(|w| {
            w.iter()
                .zip(row.iter())
                .filter(|(a, b)| a != b)
                .count() as u32
        })
        .min()
        .expect("CODEWORDS is non-empty")
}
