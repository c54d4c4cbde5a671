//! `pseudogps-hal` – image-capture hardware abstraction.
//!
//! - [`camera`] – the [`Camera`][camera::Camera] trait and raw
//!   [`CameraFrame`][camera::CameraFrame] type.
//! - [`sim`] – [`SimCamera`][sim::SimCamera]: renders a synthetic table
//!   scene so the stack runs headless in tests and CI.

pub mod camera;
pub mod sim;

pub use camera::{Camera, CameraFrame, PixelFormat};
pub use sim::SimCamera;
