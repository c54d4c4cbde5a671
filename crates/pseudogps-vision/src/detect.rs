//! Frame detection pipeline.
//!
//! Turns a greyscale camera frame into a list of decoded marker
//! [`Detection`]s:
//!
//! 1. Binarise with an Otsu threshold (markers are dark on a light table).
//! 2. Trace outer contours of dark regions and approximate each with
//!    Douglas-Peucker; keep convex quadrilaterals above a minimum edge
//!    length.
//! 3. Project the 7×7 cell grid onto each quad and sample the cells.
//! 4. Require an all-black border, then decode the inner 5×5 grid against
//!    the dictionary; re-order the quad corners so corner 0 is the marker's
//!    canonical top-left.
//!
//! Blank frames and frames full of non-marker rectangles produce an empty
//! list, never an error: the border and codeword checks reject everything
//! that is not a marker of the family.

use std::collections::HashMap;

use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::contrast::otsu_level;
use imageproc::geometric_transformations::Projection;
use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point;
use tracing::{debug, trace};

use pseudogps_types::MarkerId;

use crate::dictionary;
use crate::marker::BORDERED_GRID_SIZE;

/// A decoded marker observation in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Decoded marker id.
    pub id: MarkerId,
    /// Quad corners in image pixels, clockwise, corner 0 = the marker's
    /// canonical top-left cell corner.
    pub corners: [(f64, f64); 4],
    /// Centre of the quad (mean of the corners).
    pub center_px: (f64, f64),
    /// Mean side length of the quad in pixels; used for the px→mm scale.
    pub edge_px: f64,
}

/// Tuning knobs for the detection pipeline.
#[derive(Debug, Clone, Copy)]
pub struct DetectorParams {
    /// Minimum quad edge length in pixels; smaller candidates are noise.
    pub min_edge_px: f64,
    /// Douglas-Peucker epsilon as a fraction of the contour perimeter.
    pub epsilon_frac: f64,
    /// Sub-samples per cell axis when reading the grid (n × n points).
    pub cell_samples: u32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            min_edge_px: 15.0,
            epsilon_frac: 0.05,
            cell_samples: 3,
        }
    }
}

/// Marker detector. Stateless apart from its parameters; one instance can be
/// reused across frames.
#[derive(Debug, Default)]
pub struct Detector {
    params: DetectorParams,
}

impl Detector {
    /// Create a detector with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detector with explicit parameters.
    pub fn with_params(params: DetectorParams) -> Self {
        Self { params }
    }

    /// Detect and decode every marker in `gray`.
    ///
    /// Returns at most one detection per id (the largest candidate wins when
    /// a frame produces duplicates), sorted by id.
    pub fn detect(&self, gray: &GrayImage) -> Vec<Detection> {
        let min_side = BORDERED_GRID_SIZE as u32;
        if gray.width() < min_side || gray.height() < min_side {
            return Vec::new();
        }

        let level = otsu_level(gray);
        // Invert during binarisation: contour tracing follows bright regions,
        // and the regions of interest here are the dark marker squares.
        let binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            if gray.get_pixel(x, y).0[0] <= level {
                image::Luma([255u8])
            } else {
                image::Luma([0u8])
            }
        });

        let contours = find_contours::<i32>(&binary);
        trace!(contours = contours.len(), otsu = level, "frame binarised");

        let mut best: HashMap<MarkerId, Detection> = HashMap::new();
        for contour in &contours {
            if contour.border_type != BorderType::Outer || contour.points.len() < 16 {
                continue;
            }
            let Some(quad) = self.quad_from_contour(&contour.points) else {
                continue;
            };
            let Some(detection) = self.decode_quad(&binary, quad) else {
                continue;
            };
            match best.get(&detection.id) {
                Some(existing) if existing.edge_px >= detection.edge_px => {}
                _ => {
                    best.insert(detection.id, detection);
                }
            }
        }

        let mut detections: Vec<Detection> = best.into_values().collect();
        detections.sort_by_key(|d| d.id);
        debug!(markers = detections.len(), "frame processed");
        detections
    }

    // ------------------------------------------------------------------
    // Quad extraction
    // ------------------------------------------------------------------

    /// Reduce a contour to a convex clockwise quad, or reject it.
    fn quad_from_contour(&self, points: &[Point<i32>]) -> Option<[(f64, f64); 4]> {
        let perimeter = polygon_perimeter(points);
        let epsilon = self.params.epsilon_frac * perimeter;
        let approx = approximate_polygon_dp(points, epsilon, true);
        if approx.len() != 4 {
            return None;
        }

        let mut corners = [(0.0f64, 0.0f64); 4];
        for (corner, p) in corners.iter_mut().zip(approx.iter()) {
            *corner = (p.x as f64, p.y as f64);
        }

        if !is_convex(&corners) {
            return None;
        }
        let min_edge = (0..4)
            .map(|i| edge_length(corners[i], corners[(i + 1) % 4]))
            .fold(f64::INFINITY, f64::min);
        if min_edge < self.params.min_edge_px {
            return None;
        }

        // Enforce clockwise winding (image coordinates, +Y down) while
        // keeping corner 0 in place; the decode step fixes the rotation.
        if shoelace(&corners) < 0.0 {
            corners.swap(1, 3);
        }
        Some(corners)
    }

    // ------------------------------------------------------------------
    // Grid sampling + decode
    // ------------------------------------------------------------------

    /// Sample the 7×7 grid inside `quad`, verify the border, decode the data
    /// cells, and canonicalise the corner order.
    fn decode_quad(&self, binary: &GrayImage, mut quad: [(f64, f64); 4]) -> Option<Detection> {
        let n = BORDERED_GRID_SIZE as f32;
        let from = [(0.0, 0.0), (n, 0.0), (n, n), (0.0, n)];
        let to = [
            (quad[0].0 as f32, quad[0].1 as f32),
            (quad[1].0 as f32, quad[1].1 as f32),
            (quad[2].0 as f32, quad[2].1 as f32),
            (quad[3].0 as f32, quad[3].1 as f32),
        ];
        let projection = Projection::from_control_points(from, to)?;

        // black[r][c] = the sampled cell is dark in the source frame.
        let mut black = [[false; BORDERED_GRID_SIZE]; BORDERED_GRID_SIZE];
        for (row, cells) in black.iter_mut().enumerate() {
            for (col, cell) in cells.iter_mut().enumerate() {
                *cell = self.sample_cell(binary, projection, row, col);
            }
        }

        // Every border cell must be black, or this is not a marker.
        for i in 0..BORDERED_GRID_SIZE {
            if !black[0][i]
                || !black[BORDERED_GRID_SIZE - 1][i]
                || !black[i][0]
                || !black[i][BORDERED_GRID_SIZE - 1]
            {
                return None;
            }
        }

        let mut bits = [[false; dictionary::GRID_SIZE]; dictionary::GRID_SIZE];
        for (row, cells) in bits.iter_mut().enumerate() {
            for (col, bit) in cells.iter_mut().enumerate() {
                *bit = !black[row + 1][col + 1];
            }
        }

        let (id, rotation) = dictionary::decode(&bits)?;
        // Shift the clockwise corner ring so index 0 is the canonical
        // top-left of the decoded marker.
        quad.rotate_right(rotation % 4);

        let center_px = (
            quad.iter().map(|c| c.0).sum::<f64>() / 4.0,
            quad.iter().map(|c| c.1).sum::<f64>() / 4.0,
        );
        let edge_px = (0..4)
            .map(|i| edge_length(quad[i], quad[(i + 1) % 4]))
            .sum::<f64>()
            / 4.0;

        Some(Detection {
            id,
            corners: quad,
            center_px,
            edge_px,
        })
    }

    /// Majority-vote the binarised pixels inside one grid cell.
    /// Returns `true` when the cell is dark in the source frame.
    fn sample_cell(&self, binary: &GrayImage, projection: Projection, row: usize, col: usize) -> bool {
        let k = self.params.cell_samples.max(1);
        let mut dark = 0u32;
        for sy in 0..k {
            for sx in 0..k {
                let u = col as f32 + (sx as f32 + 0.5) / k as f32;
                let v = row as f32 + (sy as f32 + 0.5) / k as f32;
                let (x, y) = projection * (u, v);
                let xi = (x.round() as i64).clamp(0, binary.width() as i64 - 1) as u32;
                let yi = (y.round() as i64).clamp(0, binary.height() as i64 - 1) as u32;
                // The binarised image is inverted: dark source pixels are 255.
                if binary.get_pixel(xi, yi).0[0] > 127 {
                    dark += 1;
                }
            }
        }
        dark * 2 > k * k
    }
}

// ---------------------------------------------------------------------------
// Geometry helpers
// ---------------------------------------------------------------------------

fn edge_length(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

fn polygon_perimeter(points: &[Point<i32>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        total += edge_length((a.x as f64, a.y as f64), (b.x as f64, b.y as f64));
    }
    total
}

/// Signed area × 2 (shoelace). Positive for clockwise winding in image
/// coordinates (+Y down).
fn shoelace(corners: &[(f64, f64); 4]) -> f64 {
    let mut sum = 0.0;
    for i in 0..4 {
        let (x1, y1) = corners[i];
        let (x2, y2) = corners[(i + 1) % 4];
        sum += x1 * y2 - x2 * y1;
    }
    sum
}

fn is_convex(corners: &[(f64, f64); 4]) -> bool {
    let mut sign = 0.0f64;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        let c = corners[(i + 2) % 4];
        let cross = (b.0 - a.0) * (c.1 - b.1) - (b.1 - a.1) * (c.0 - b.0);
        if cross.abs() < f64::EPSILON {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker;

    /// White canvas with a rendered marker composited at (x, y).
    fn scene(width: u32, height: u32, markers: &[(MarkerId, u32, u32, u32)]) -> GrayImage {
        let mut canvas = GrayImage::from_pixel(width, height, image::Luma([255u8]));
        for &(id, x, y, side) in markers {
            let rendered = marker::render(id, side).expect("render");
            image::imageops::overlay(&mut canvas, &rendered, x as i64, y as i64);
        }
        canvas
    }

    #[test]
    fn blank_frame_yields_no_detections() {
        let canvas = GrayImage::from_pixel(320, 240, image::Luma([255u8]));
        assert!(Detector::new().detect(&canvas).is_empty());
    }

    #[test]
    fn tiny_frame_yields_no_detections() {
        let canvas = GrayImage::from_pixel(3, 3, image::Luma([0u8]));
        assert!(Detector::new().detect(&canvas).is_empty());
    }

    #[test]
    fn detects_single_marker_position_and_id() {
        // Marker square spans (55, 45)..(125, 115): 70 px side after the
        // 5 px quiet zone offset.
        let canvas = scene(320, 240, &[(7, 50, 40, 70)]);
        let detections = Detector::new().detect(&canvas);
        assert_eq!(detections.len(), 1);

        let d = &detections[0];
        assert_eq!(d.id, 7);
        assert!((d.center_px.0 - 90.0).abs() < 3.0, "cx = {}", d.center_px.0);
        assert!((d.center_px.1 - 80.0).abs() < 3.0, "cy = {}", d.center_px.1);
        assert!((d.edge_px - 70.0).abs() < 4.0, "edge = {}", d.edge_px);
        // Corner 0 is the canonical top-left.
        assert!((d.corners[0].0 - 55.0).abs() < 4.0, "c0.x = {}", d.corners[0].0);
        assert!((d.corners[0].1 - 45.0).abs() < 4.0, "c0.y = {}", d.corners[0].1);
    }

    #[test]
    fn detects_multiple_markers_sorted_by_id() {
        let canvas = scene(480, 240, &[(9, 260, 60, 70), (2, 30, 30, 70)]);
        let detections = Detector::new().detect(&canvas);
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].id, 2);
        assert_eq!(detections[1].id, 9);
    }

    #[test]
    fn decodes_rotated_marker_with_canonical_corners() {
        let canvas = scene(320, 240, &[(42, 50, 40, 70)]);
        let rotated = image::imageops::rotate90(&canvas);

        let detections = Detector::new().detect(&rotated);
        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d.id, 42);
        // rotate90 maps (x, y) → (h − 1 − y, x); the canonical top-left
        // corner was at (55, 45).
        assert!((d.corners[0].0 - 194.0).abs() < 4.0, "c0.x = {}", d.corners[0].0);
        assert!((d.corners[0].1 - 55.0).abs() < 4.0, "c0.y = {}", d.corners[0].1);
    }

    #[test]
    fn rejects_plain_dark_square() {
        // A solid dark square has no white data cells and must not decode.
        let mut canvas = GrayImage::from_pixel(320, 240, image::Luma([255u8]));
        for y in 40..110u32 {
            for x in 50..120u32 {
                canvas.put_pixel(x, y, image::Luma([0u8]));
            }
        }
        assert!(Detector::new().detect(&canvas).is_empty());
    }

    #[test]
    fn rejects_marker_smaller_than_min_edge() {
        let params = DetectorParams {
            min_edge_px: 100.0,
            ..Default::default()
        };
        let canvas = scene(320, 240, &[(7, 50, 40, 70)]);
        assert!(Detector::with_params(params).detect(&canvas).is_empty());
    }

    #[test]
    fn duplicate_ids_keep_largest_candidate() {
        let canvas = scene(640, 240, &[(5, 30, 30, 49), (5, 300, 30, 98)]);
        let detections = Detector::new().detect(&canvas);
        assert_eq!(detections.len(), 1);
        assert!(detections[0].edge_px > 80.0, "edge = {}", detections[0].edge_px);
    }
}
