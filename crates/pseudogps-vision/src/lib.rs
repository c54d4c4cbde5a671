//! `pseudogps-vision` – fiducial marker codec and frame detection.
//!
//! Everything the overhead camera pipeline needs to go from pixels to
//! identified markers:
//!
//! - [`dictionary`] – the classic ArUco 5×5 codeword family: id → cell grid
//!   and rotation-searching decode.
//! - [`marker`] – printed-marker rendering and batch PNG generation.
//! - [`detect`] – [`Detector`][detect::Detector]: Otsu threshold → contour
//!   quads → perspective cell sampling → dictionary decode.

pub mod detect;
pub mod dictionary;
pub mod marker;

pub use detect::{Detection, Detector, DetectorParams};
