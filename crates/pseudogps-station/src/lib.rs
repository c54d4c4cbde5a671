//! `pseudogps-station` – the network face of the tracker.
//!
//! Serves a human status page over HTTP and streams fixes to robot clients
//! over WebSocket, forwarding their calibration trims back onto the bus.

pub mod server;

pub use server::{DEFAULT_PORT, StationServer};
