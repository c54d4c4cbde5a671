//! The asynchronous tracking loop.
//!
//! Owns the camera and the [`FixPipeline`], captures frames at a fixed rate
//! (5 Hz on the deployed rig), and publishes fixes and origin updates onto
//! the event bus. Camera faults are reported on [`Topic::SystemAlerts`] and
//! the loop keeps running; a `Shutdown` alert stops it.

use std::time::Duration;

use chrono::Utc;
use pseudogps_hal::camera::Camera;
use pseudogps_middleware::{EventBus, Topic, TopicReceiver};
use pseudogps_types::{Event, EventPayload, GpsError};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::pipeline::FixPipeline;

/// Default capture rate.
pub const DEFAULT_RATE_HZ: f64 = 5.0;

const SOURCE: &str = "pseudogps-tracker::loop";

/// The capture → detect → localise → publish loop.
pub struct TrackerLoop {
    camera: Box<dyn Camera>,
    pipeline: FixPipeline,
    bus: EventBus,
    rate_hz: f64,
}

impl TrackerLoop {
    pub fn new(camera: Box<dyn Camera>, pipeline: FixPipeline, bus: EventBus, rate_hz: f64) -> Self {
        Self {
            camera,
            pipeline,
            bus,
            rate_hz: if rate_hz > 0.0 { rate_hz } else { DEFAULT_RATE_HZ },
        }
    }

    /// Run until a `Shutdown` event arrives on [`Topic::SystemAlerts`] or
    /// the bus closes.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / self.rate_hz));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut control = self.bus.subscribe_to(Topic::Control);
        let mut alerts = self.bus.subscribe_to(Topic::SystemAlerts);

        info!(camera = self.camera.id(), rate_hz = self.rate_hz, "tracker loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    drain_control(&mut control, &mut self.pipeline);
                    self.step();
                }
                alert = alerts.recv() => {
                    match alert {
                        Ok(event) => {
                            if let EventPayload::Shutdown { reason } = event.payload {
                                info!(%reason, "tracker loop stopping");
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(n)) => {
                            warn!(dropped = n, "alerts receiver lagged");
                        }
                    }
                }
            }
        }
    }

    /// Capture one frame and publish whatever it yields. Never fails: a
    /// camera fault becomes a `SystemAlerts` event and the loop moves on to
    /// the next tick.
    fn step(&mut self) {
        let gray = match self.camera.capture().and_then(|f| f.to_gray()) {
            Ok(gray) => gray,
            Err(err) => {
                self.report_fault(err);
                return;
            }
        };

        let result = self.pipeline.process(&gray, Utc::now());

        if let Some((marker_id, center_px)) = result.origin_update {
            debug!(marker_id, ?center_px, "origin re-anchored");
            self.publish(
                Topic::Fixes,
                EventPayload::OriginUpdate { marker_id, center_px },
            );
        }
        for fix in result.fixes {
            debug!(
                marker_id = fix.marker_id,
                x_mm = fix.x_mm,
                y_mm = fix.y_mm,
                heading_deg = fix.heading_deg,
                "fix"
            );
            self.publish(Topic::Fixes, EventPayload::Fix(fix));
        }
    }

    fn report_fault(&self, err: GpsError) {
        warn!(error = %err, "camera fault, skipping frame");
        let payload = match err {
            GpsError::CameraFault { component, details } => {
                EventPayload::CameraFault { component, details }
            }
            other => EventPayload::CameraFault {
                component: self.camera.id().to_string(),
                details: other.to_string(),
            },
        };
        self.publish(Topic::SystemAlerts, payload);
    }

    /// Publish, tolerating an empty topic: before any robot or station has
    /// subscribed there is simply nobody to tell.
    fn publish(&self, topic: Topic, payload: EventPayload) {
        if let Err(GpsError::Channel(_)) = self.bus.publish_to(topic, Event::now(SOURCE, payload)) {
            debug!(?topic, "no subscribers for event");
        }
    }
}

/// Apply every control event queued since the previous frame.
fn drain_control(control: &mut TopicReceiver, pipeline: &mut FixPipeline) {
    loop {
        match control.try_recv() {
            Ok(event) => {
                if let EventPayload::CalibrationAdjust { delta } = event.payload {
                    pipeline.adjust_calibration(delta);
                    info!(
                        delta,
                        factor = pipeline.calibration().factor,
                        "calibration adjusted"
                    );
                }
            }
            Err(TryRecvError::Lagged(n)) => {
                warn!(dropped = n, "control receiver lagged");
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}
