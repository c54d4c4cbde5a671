//! `pseudogps-tracker` – frame-to-fix localisation.
//!
//! Turns detected markers into origin-relative millimetre fixes and runs the
//! fixed-rate capture loop that feeds them onto the event bus:
//!
//! * [`calibration`] – the px→mm scale model with runtime trim.
//! * [`smoothing`] – per-marker exponential position smoothing.
//! * [`world`] – origin-marker anchoring of the table frame.
//! * [`pipeline`] – one frame in, origin update + fixes out.
//! * [`loop_task`] – the async 5 Hz capture/publish loop.

pub mod calibration;
pub mod loop_task;
pub mod pipeline;
pub mod smoothing;
pub mod world;

pub use calibration::Calibration;
pub use loop_task::{DEFAULT_RATE_HZ, TrackerLoop};
pub use pipeline::{FixPipeline, FrameResult};
pub use smoothing::{PoseSmoother, SmoothingParams};
pub use world::{DEFAULT_ORIGIN_ID, OriginTracker};
