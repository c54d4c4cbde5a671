//! Simulated overhead camera for headless testing.
//!
//! [`SimCamera`] renders a synthetic table scene – a white background with
//! real rendered markers composited at configured positions – so the entire
//! detect → localise → broadcast stack runs in tests and CI without a
//! physical rig.
//!
//! # Example
//!
//! ```rust
//! use pseudogps_hal::sim::SimCamera;
//! use pseudogps_hal::camera::Camera;
//!
//! let mut cam = SimCamera::new(640, 480)
//!     .with_marker(1, 80, 60, 70)   // origin marker
//!     .with_marker(7, 400, 300, 70) // a robot
//!     .build();
//!
//! let frame = cam.capture().expect("sim capture must succeed");
//! assert_eq!(frame.width, 640);
//! ```

use image::GrayImage;
use pseudogps_types::{GpsError, MarkerId};
use pseudogps_vision::marker;
use tracing::warn;

use crate::camera::{Camera, CameraFrame, PixelFormat};

/// One marker placed on the simulated table.
#[derive(Debug, Clone, Copy)]
struct PlacedMarker {
    id: MarkerId,
    /// Top-left corner of the rendered marker image (quiet zone included).
    x: u32,
    y: u32,
    /// Marker square side length in pixels.
    side_px: u32,
}

/// Builder for [`SimCamera`]. Call [`with_marker`][Self::with_marker] for
/// every marker on the table, then [`build`][Self::build].
#[derive(Debug)]
pub struct SimCameraBuilder {
    width: u32,
    height: u32,
    markers: Vec<PlacedMarker>,
}

impl SimCameraBuilder {
    /// Place a marker with its rendered image's top-left at `(x, y)`.
    pub fn with_marker(mut self, id: MarkerId, x: u32, y: u32, side_px: u32) -> Self {
        self.markers.push(PlacedMarker { id, x, y, side_px });
        self
    }

    /// Render the scene once and wrap it in a [`SimCamera`].
    pub fn build(self) -> SimCamera {
        let mut canvas =
            GrayImage::from_pixel(self.width, self.height, image::Luma([255u8]));
        for placed in &self.markers {
            match marker::render(placed.id, placed.side_px) {
                Ok(rendered) => {
                    image::imageops::overlay(
                        &mut canvas,
                        &rendered,
                        placed.x as i64,
                        placed.y as i64,
                    );
                }
                Err(e) => {
                    warn!(marker_id = placed.id, error = %e, "skipping unrenderable sim marker");
                }
            }
        }
        SimCamera {
            id: "sim_overhead".to_string(),
            scene: canvas,
        }
    }
}

/// A camera that returns the same rendered scene on every capture.
pub struct SimCamera {
    id: String,
    scene: GrayImage,
}

impl SimCamera {
    /// Start building a simulated scene of the given frame size.
    pub fn new(width: u32, height: u32) -> SimCameraBuilder {
        SimCameraBuilder {
            width,
            height,
            markers: Vec::new(),
        }
    }

    /// Replace the rendered scene, e.g. to move markers between captures in
    /// a test.
    pub fn set_scene(&mut self, scene: GrayImage) {
        self.scene = scene;
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraFrame, GpsError> {
        Ok(CameraFrame {
            width: self.scene.width(),
            height: self.scene.height(),
            format: PixelFormat::Gray8,
            data: self.scene.as_raw().clone(),
        })
    }
}

/// A camera that always fails; exercises the tracking loop's fault path.
pub struct FaultyCamera;

impl Camera for FaultyCamera {
    fn id(&self) -> &str {
        "faulty_cam"
    }

    fn capture(&mut self) -> Result<CameraFrame, GpsError> {
        Err(GpsError::CameraFault {
            component: "faulty_cam".to_string(),
            details: "simulated capture failure".to_string(),
        })
    }
}
