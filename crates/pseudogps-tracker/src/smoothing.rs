//! Per-marker exponential smoothing of position fixes.
//!
//! Raw centroids jitter by a pixel or two frame to frame, which at table
//! scale is a few millimetres of noise. An exponential moving average per
//! marker damps that out. The two axes use different alphas: the x axis is
//! noisier on the deployed rig (rolling-shutter skew along the table) and
//! gets a heavier filter.

use std::collections::HashMap;

use pseudogps_types::MarkerId;

/// EMA coefficients, one per axis. Higher alpha trusts the new sample more.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    pub alpha_x: f64,
    pub alpha_y: f64,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            alpha_x: 0.05,
            alpha_y: 0.65,
        }
    }
}

/// Stateful per-marker position smoother.
///
/// Heading is deliberately left unsmoothed: EMA across the ±180° wrap
/// produces garbage, and heading noise is small compared to position noise.
#[derive(Debug, Default)]
pub struct PoseSmoother {
    params: SmoothingParams,
    history: HashMap<MarkerId, (f64, f64)>,
}

impl PoseSmoother {
    pub fn new(params: SmoothingParams) -> Self {
        Self {
            params,
            history: HashMap::new(),
        }
    }

    /// Blend a new raw position into the running average for `marker_id`.
    ///
    /// The first sample for a marker passes through unchanged so a robot
    /// entering the frame does not appear to slide in from the origin.
    pub fn apply(&mut self, marker_id: MarkerId, x_mm: f64, y_mm: f64) -> (f64, f64) {
        let smoothed = match self.history.get(&marker_id) {
            Some(&(px, py)) => (
                self.params.alpha_x * x_mm + (1.0 - self.params.alpha_x) * px,
                self.params.alpha_y * y_mm + (1.0 - self.params.alpha_y) * py,
            ),
            None => (x_mm, y_mm),
        };
        self.history.insert(marker_id, smoothed);
        smoothed
    }

    /// Forget all history, e.g. after the origin marker re-anchors the frame.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_passes_through() {
        let mut smoother = PoseSmoother::default();
        let (x, y) = smoother.apply(7, 120.0, -45.0);
        assert!((x - 120.0).abs() < 1e-9);
        assert!((y + 45.0).abs() < 1e-9);
    }

    #[test]
    fn second_sample_is_blended_per_axis() {
        let mut smoother = PoseSmoother::default();
        smoother.apply(7, 100.0, 100.0);
        let (x, y) = smoother.apply(7, 200.0, 200.0);
        // alpha_x = 0.05 -> 105, alpha_y = 0.65 -> 165
        assert!((x - 105.0).abs() < 1e-9);
        assert!((y - 165.0).abs() < 1e-9);
    }

    #[test]
    fn markers_are_smoothed_independently() {
        let mut smoother = PoseSmoother::default();
        smoother.apply(7, 0.0, 0.0);
        let (x, _) = smoother.apply(9, 500.0, 500.0);
        assert!((x - 500.0).abs() < 1e-9, "marker 9 must not inherit marker 7 state");
    }

    #[test]
    fn static_target_converges_to_itself() {
        let mut smoother = PoseSmoother::default();
        let mut pose = (0.0, 0.0);
        for _ in 0..50 {
            pose = smoother.apply(7, 300.0, 300.0);
        }
        // Heavy x filter: 50 iterations of alpha 0.05 from 300 stays at 300
        // because the first sample seeds the history with the target itself.
        assert!((pose.0 - 300.0).abs() < 1e-9);
        assert!((pose.1 - 300.0).abs() < 1e-9);
    }

    #[test]
    fn reset_forgets_history() {
        let mut smoother = PoseSmoother::default();
        smoother.apply(7, 100.0, 100.0);
        smoother.reset();
        let (x, y) = smoother.apply(7, 500.0, 500.0);
        assert!((x - 500.0).abs() < 1e-9);
        assert!((y - 500.0).abs() < 1e-9);
    }
}
