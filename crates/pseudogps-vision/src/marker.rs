//! Marker image generation.
//!
//! A printed marker is the 5×5 data grid surrounded by a one-cell black
//! border (7×7 cells total), scaled to a requested pixel width and framed by
//! a white quiet zone so the detector can find the outer contour against any
//! backdrop.

use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use pseudogps_types::{GpsError, MarkerId};
use tracing::info;

use crate::dictionary::{self, GRID_SIZE};

/// Cells per printed marker side: data grid plus the black border.
pub const BORDERED_GRID_SIZE: usize = GRID_SIZE + 2;

/// Quiet-zone width in pixels added around the marker square.
pub const QUIET_ZONE_PX: u32 = 5;

const BLACK: Luma<u8> = Luma([0u8]);
const WHITE: Luma<u8> = Luma([255u8]);

/// Expand a marker id into its printed 7×7 cell grid (border included).
/// `true` = white cell.
pub fn bordered_bits(id: MarkerId) -> Result<[[bool; BORDERED_GRID_SIZE]; BORDERED_GRID_SIZE], GpsError> {
    let data = dictionary::bits(id)?;
    let mut grid = [[false; BORDERED_GRID_SIZE]; BORDERED_GRID_SIZE];
    for (row, cells) in data.iter().enumerate() {
        for (col, &cell) in cells.iter().enumerate() {
            grid[row + 1][col + 1] = cell;
        }
    }
    Ok(grid)
}

/// Render a marker to a greyscale image.
///
/// `width_px` is the side length of the marker square (border cells
/// included); the returned image is `width_px + 2 * QUIET_ZONE_PX` on each
/// side.
///
/// # Errors
///
/// Returns [`GpsError::Detection`] for an out-of-family id and
/// [`GpsError::Config`] when `width_px` is too small to resolve the cell
/// grid.
pub fn render(id: MarkerId, width_px: u32) -> Result<GrayImage, GpsError> {
    if (width_px as usize) < BORDERED_GRID_SIZE {
        return Err(GpsError::Config(format!(
            "marker width {width_px}px cannot resolve a {BORDERED_GRID_SIZE}-cell grid"
        )));
    }
    let grid = bordered_bits(id)?;
    let total = width_px + 2 * QUIET_ZONE_PX;

    let img = GrayImage::from_fn(total, total, |x, y| {
        let in_marker = x >= QUIET_ZONE_PX
            && y >= QUIET_ZONE_PX
            && x < QUIET_ZONE_PX + width_px
            && y < QUIET_ZONE_PX + width_px;
        if !in_marker {
            return WHITE;
        }
        let col = ((x - QUIET_ZONE_PX) as usize * BORDERED_GRID_SIZE) / width_px as usize;
        let row = ((y - QUIET_ZONE_PX) as usize * BORDERED_GRID_SIZE) / width_px as usize;
        if grid[row][col] { WHITE } else { BLACK }
    });
    Ok(img)
}

/// Generate markers `1..=count` and save each as `aruco_marker_<id>.png`
/// under `dir`. Returns the written paths.
///
/// # Errors
///
/// Returns [`GpsError::Config`] when `count` exceeds the marker family (no
/// files are written in that case) and [`GpsError::Io`] when the directory
/// cannot be created or a PNG cannot be written.
pub fn generate_batch(
    dir: impl AsRef<Path>,
    count: u16,
    width_px: u32,
) -> Result<Vec<PathBuf>, GpsError> {
    if count >= dictionary::FAMILY_SIZE {
        return Err(GpsError::Config(format!(
            "count {count} exceeds the marker family (ids 1..={})",
            dictionary::FAMILY_SIZE - 1
        )));
    }
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .map_err(|e| GpsError::Io(format!("creating {}: {e}", dir.display())))?;

    let mut paths = Vec::with_capacity(count as usize);
    for id in 1..=count {
        let img = render(id, width_px)?;
        let path = dir.join(format!("aruco_marker_{id}.png"));
        img.save(&path)
            .map_err(|e| GpsError::Io(format!("writing {}: {e}", path.display())))?;
        info!(marker_id = id, path = %path.display(), "generated marker");
        paths.push(path);
    }
    Ok(paths)
}
