//! World-frame anchoring.
//!
//! All fixes are reported relative to a designated origin marker taped to
//! the table. The origin is re-anchored every frame it is visible, so
//! nudging the tape (or the camera) does not require a restart; while the
//! origin has never been seen, no fixes are produced at all.

use pseudogps_types::MarkerId;
use pseudogps_vision::Detection;

/// Default origin marker for the deployed rig.
pub const DEFAULT_ORIGIN_ID: MarkerId = 1;

/// Last known pose of the origin marker, in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OriginState {
    pub center_px: (f64, f64),
    pub heading_deg: f64,
}

/// Tracks the origin marker and converts detections into origin-relative
/// poses.
#[derive(Debug)]
pub struct OriginTracker {
    origin_id: MarkerId,
    state: Option<OriginState>,
}

impl OriginTracker {
    pub fn new(origin_id: MarkerId) -> Self {
        Self {
            origin_id,
            state: None,
        }
    }

    pub fn origin_id(&self) -> MarkerId {
        self.origin_id
    }

    /// Whether the origin has been seen at least once.
    pub fn is_anchored(&self) -> bool {
        self.state.is_some()
    }

    /// Scan a frame's detections for the origin marker and re-anchor if it
    /// is present. Returns the new state when the anchor was updated.
    pub fn observe(&mut self, detections: &[Detection]) -> Option<OriginState> {
        let origin = detections.iter().find(|d| d.id == self.origin_id)?;
        let state = OriginState {
            center_px: origin.center_px,
            heading_deg: marker_heading_deg(origin),
        };
        self.state = Some(state);
        Some(state)
    }

    /// Pixel offset and relative heading of `detection` with respect to the
    /// anchored origin. `None` until the origin has been seen, and for the
    /// origin marker itself.
    pub fn relative(&self, detection: &Detection) -> Option<((f64, f64), f64)> {
        if detection.id == self.origin_id {
            return None;
        }
        let origin = self.state?;
        let offset = (
            detection.center_px.0 - origin.center_px.0,
            detection.center_px.1 - origin.center_px.1,
        );
        let heading = normalize_deg(marker_heading_deg(detection) - origin.heading_deg);
        Some((offset, heading))
    }
}

/// Heading of a detection in the image plane: the angle of its canonical
/// top edge (corner 0 to corner 1), clockwise-positive in degrees because
/// image y grows downward. An upright marker reads 0°.
pub fn marker_heading_deg(detection: &Detection) -> f64 {
    let (x0, y0) = detection.corners[0];
    let (x1, y1) = detection.corners[1];
    (y1 - y0).atan2(x1 - x0).to_degrees()
}

/// Wrap an angle difference into (-180, 180].
pub fn normalize_deg(mut deg: f64) -> f64 {
    while deg > 180.0 {
        deg -= 360.0;
    }
    while deg <= -180.0 {
        deg += 360.0;
    }
    deg
}
