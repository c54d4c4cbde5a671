//! Frame-to-fix pipeline: detect markers, anchor the world frame, convert
//! to millimetres, smooth, and emit [`RobotFix`]es.

use chrono::{DateTime, Utc};
use image::GrayImage;
use pseudogps_types::{MarkerId, RobotFix};
use pseudogps_vision::{Detection, Detector, DetectorParams};

use crate::calibration::Calibration;
use crate::smoothing::{PoseSmoother, SmoothingParams};
use crate::world::OriginTracker;

/// Everything one frame produced.
#[derive(Debug, Default)]
pub struct FrameResult {
    /// Set when the origin marker was visible and the anchor was refreshed.
    pub origin_update: Option<(MarkerId, (f64, f64))>,
    /// One fix per visible non-origin marker.
    pub fixes: Vec<RobotFix>,
}

/// Owns all per-frame state: the detector, calibration, origin anchor and
/// smoothing history.
pub struct FixPipeline {
    detector: Detector,
    calibration: Calibration,
    origin: OriginTracker,
    smoother: PoseSmoother,
}

impl FixPipeline {
    pub fn new(
        params: DetectorParams,
        calibration: Calibration,
        origin_id: MarkerId,
        smoothing: SmoothingParams,
    ) -> Self {
        Self {
            detector: Detector::with_params(params),
            calibration,
            origin: OriginTracker::new(origin_id),
            smoother: PoseSmoother::new(smoothing),
        }
    }

    /// Run one grayscale frame through the pipeline.
    ///
    /// While the origin marker has never been seen, `fixes` stays empty no
    /// matter how many robots are visible.
    pub fn process(&mut self, frame: &GrayImage, timestamp: DateTime<Utc>) -> FrameResult {
        let detections = self.detector.detect(frame);
        self.process_detections(&detections, timestamp)
    }

    fn process_detections(
        &mut self,
        detections: &[Detection],
        timestamp: DateTime<Utc>,
    ) -> FrameResult {
        let origin_update = self
            .origin
            .observe(detections)
            .map(|state| (self.origin.origin_id(), state.center_px));

        let mut fixes = Vec::new();
        for detection in detections {
            let Some((offset_px, heading_deg)) = self.origin.relative(detection) else {
                continue;
            };
            let (x_raw, y_raw) = self.calibration.px_to_mm(offset_px);
            let (x_mm, y_mm) = self.smoother.apply(detection.id, x_raw, y_raw);
            fixes.push(RobotFix {
                marker_id: detection.id,
                x_mm,
                y_mm,
                heading_deg,
                timestamp,
            });
        }

        FrameResult {
            origin_update,
            fixes,
        }
    }

    /// Trim the calibration factor by `delta` (clamped at the floor) and
    /// drop smoothing history, which was accumulated at the old scale.
    pub fn adjust_calibration(&mut self, delta: f64) {
        self.calibration.adjust(delta);
        self.smoother.reset();
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }
}
