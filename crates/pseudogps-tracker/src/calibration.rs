//! Pixel-to-millimetre calibration.
//!
//! The overhead rig is planar, so the scale is a single ratio: the known
//! printed marker size over its size in pixels, times an operator-trimmed
//! correction factor.  The factor absorbs lens and mounting-height effects
//! and is adjustable at runtime in ±0.1 steps from the station.

/// Smallest factor the runtime trim can reach.
const MIN_FACTOR: f64 = 0.1;

/// The planar px→mm scale model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Physical side length of the printed marker square, millimetres.
    pub marker_size_mm: f64,
    /// Side length of the marker square in pixels as printed/rendered.
    pub marker_width_px: f64,
    /// Operator-trimmed correction factor.
    pub factor: f64,
}

impl Calibration {
    /// Create a calibration from the printed marker geometry and an initial
    /// correction factor.
    pub fn new(marker_size_mm: f64, marker_width_px: f64, factor: f64) -> Self {
        Self {
            marker_size_mm,
            marker_width_px,
            factor: factor.max(MIN_FACTOR),
        }
    }

    /// Millimetres represented by one image pixel.
    pub fn mm_per_px(&self) -> f64 {
        (self.marker_size_mm / self.marker_width_px) * self.factor
    }

    /// Convert a pixel offset to millimetres.
    pub fn px_to_mm(&self, (dx_px, dy_px): (f64, f64)) -> (f64, f64) {
        let scale = self.mm_per_px();
        (dx_px * scale, dy_px * scale)
    }

    /// Apply a runtime trim step. The factor never drops below 0.1, so a
    /// run of `-` keypresses cannot invert or zero the scale.
    pub fn adjust(&mut self, delta: f64) {
        self.factor = (self.factor + delta).max(MIN_FACTOR);
    }
}

impl Default for Calibration {
    fn default() -> Self {
        // The deployed rig: a 3.5 in (88.9 mm) marker printed at 100 px,
        // with the empirically tuned correction factor.
        Self::new(88.9, 100.0, 2.755)
    }
}
