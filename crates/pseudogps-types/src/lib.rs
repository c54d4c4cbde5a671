use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a fiducial marker (classic ArUco 5x5 family, 0..1023).
pub type MarkerId = u16;

/// One localisation sample for a single robot, expressed in the table frame
/// anchored at the origin marker.
///
/// Positions are in millimetres; heading is in degrees, measured relative to
/// the origin marker's orientation and normalised to `(-180, 180]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotFix {
    /// Marker id taped to the robot.
    pub marker_id: MarkerId,
    /// Millimetres right of the origin marker (image +X).
    pub x_mm: f64,
    /// Millimetres below the origin marker (image +Y).
    pub y_mm: f64,
    /// Heading relative to the origin marker, degrees in `(-180, 180]`.
    pub heading_deg: f64,
    /// When the frame containing this fix was captured.
    pub timestamp: DateTime<Utc>,
}

/// Unified event wrapper routed over the internal event bus and, as JSON,
/// over the station WebSocket to robot clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. "pseudogps-tracker::loop"
    pub source: String,
    pub payload: EventPayload,
}

/// Variants of data that can be routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum EventPayload {
    /// A smoothed position/heading fix for one robot marker.
    Fix(RobotFix),
    /// The origin marker was re-observed; the table frame has been re-anchored.
    OriginUpdate {
        marker_id: MarkerId,
        /// New origin centre in image pixels.
        center_px: (f64, f64),
    },
    /// Runtime adjustment of the pixel-to-millimetre calibration factor
    /// (the station forwards these from operator keypresses).
    CalibrationAdjust { delta: f64 },
    /// The camera failed to deliver a frame.
    CameraFault { component: String, details: String },
    /// Operator-initiated shutdown (Ctrl-C on the CLI).
    Shutdown { reason: String },
}

impl Event {
    /// Build an event stamped with a fresh id and the current time.
    pub fn now(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Global error type spanning camera faults, detection failures, bus
/// channel errors, and configuration problems.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum GpsError {
    #[error("Camera Fault on {component}: {details}")]
    CameraFault { component: String, details: String },

    #[error("Detection Error: {0}")]
    Detection(String),

    #[error("Event Bus Error: {0}")]
    Channel(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("I/O Error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fix() -> RobotFix {
        RobotFix {
            marker_id: 7,
            x_mm: 123.4,
            y_mm: -56.7,
            heading_deg: 90.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn robot_fix_serialization_roundtrip() {
        let fix = sample_fix();
        let json = serde_json::to_string(&fix).unwrap();
        let back: RobotFix = serde_json::from_str(&json).unwrap();
        assert_eq!(fix, back);
    }

    #[test]
    fn fix_payload_roundtrip() {
        let event = Event::now("pseudogps-tracker::loop", EventPayload::Fix(sample_fix()));
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        match back.payload {
            EventPayload::Fix(fix) => assert_eq!(fix.marker_id, 7),
            _ => panic!("unexpected variant"),
        }
    }

    #[test]
    fn calibration_adjust_roundtrip() {
        let event = Event::now("station", EventPayload::CalibrationAdjust { delta: -0.1 });
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        match back.payload {
            EventPayload::CalibrationAdjust { delta } => {
                assert!((delta - (-0.1)).abs() < f64::EPSILON)
            }
            _ => panic!("unexpected variant"),
        }
    }

    #[test]
    fn payload_json_is_tagged_by_kind() {
        let json = serde_json::to_string(&EventPayload::OriginUpdate {
            marker_id: 1,
            center_px: (320.0, 240.0),
        })
        .unwrap();
        // Robot clients dispatch on the "kind" field.
        assert!(json.contains("\"kind\":\"OriginUpdate\""));
    }

    #[test]
    fn gps_error_display() {
        let err = GpsError::CameraFault {
            component: "overhead_cam".to_string(),
            details: "frame buffer unavailable".to_string(),
        };
        assert!(err.to_string().contains("overhead_cam"));

        let err2 = GpsError::Channel("no subscribers".to_string());
        assert!(err2.to_string().contains("Event Bus"));
    }
}
