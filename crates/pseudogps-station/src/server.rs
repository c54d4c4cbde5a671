//! [`StationServer`] – HTTP + WebSocket endpoint for robots and operators.
//!
//! Listens on `0.0.0.0:8080` (configurable via [`StationServer::with_port`]).
//!
//! * Regular HTTP requests → 200 OK with the embedded status page.
//! * WebSocket upgrades → a bridge to the [`EventBus`]: fixes and alerts
//!   stream down as JSON events; calibration trims flow back up.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use pseudogps_middleware::{EventBus, Topic};
use pseudogps_types::{Event, EventPayload, GpsError};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Default TCP port for the station HTTP/WebSocket server.
pub const DEFAULT_PORT: u16 = 8080;

const SOURCE: &str = "pseudogps-station::server";

/// The compiled-in status page (HTML + CSS + JS).
const STATION_HTML: &str = include_str!("station.html");

// ---------------------------------------------------------------------------
// StationServer
// ---------------------------------------------------------------------------

/// Lightweight HTTP + WebSocket server.  Robots on the table connect over
/// WebSocket to receive their fixes; the same endpoint serves a human-facing
/// status page over plain HTTP.
///
/// # Example
///
/// ```rust,no_run
/// use pseudogps_middleware::EventBus;
/// use pseudogps_station::StationServer;
///
/// #[tokio::main]
/// async fn main() {
///     let bus = EventBus::default();
///     StationServer::new(bus)
///         .run()
///         .await
///         .expect("station server failed");
/// }
/// ```
pub struct StationServer {
    bus: EventBus,
    port: u16,
}

impl StationServer {
    /// Create a server backed by `bus` on the [`DEFAULT_PORT`].
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            port: DEFAULT_PORT,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Return the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Start the server.
    ///
    /// Listens for TCP connections and dispatches each one as either a
    /// WebSocket bridge (when the HTTP request contains `Upgrade: websocket`)
    /// or a plain HTTP response serving the status page.
    ///
    /// # Errors
    ///
    /// Returns [`GpsError::Io`] if the TCP listener cannot bind.
    pub async fn run(self) -> Result<(), GpsError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GpsError::Io(format!("bind error on {addr}: {e}")))?;

        info!(port = self.port, "station listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bus = self.bus.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, bus).await {
                            warn!(%peer, error = %e, "client error");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept error");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    bus: EventBus,
) -> Result<(), GpsError> {
    // Peek at the first bytes of the request to decide whether to upgrade
    // to WebSocket or serve the static HTML.  `peek` does not consume the
    // data, so tungstenite's handshaker sees the full HTTP request.
    let mut buf = [0u8; 1024];
    let n = stream
        .peek(&mut buf)
        .await
        .map_err(|e| GpsError::Io(format!("peek error from {peer}: {e}")))?;

    let header_preview = String::from_utf8_lossy(&buf[..n]);
    let is_ws_upgrade = header_preview.lines().any(|line| {
        line.to_lowercase().starts_with("upgrade:") && line.to_lowercase().contains("websocket")
    });

    if is_ws_upgrade {
        handle_ws(stream, peer, bus).await
    } else {
        serve_html(stream).await
    }
}

// ---------------------------------------------------------------------------
// Plain HTTP: serve the embedded status page
// ---------------------------------------------------------------------------

async fn serve_html(mut stream: TcpStream) -> Result<(), GpsError> {
    let body = STATION_HTML;
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        body.len(),
        body
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| GpsError::Io(format!("HTTP write error: {e}")))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// WebSocket: EventBus bridge
// ---------------------------------------------------------------------------

async fn handle_ws(stream: TcpStream, peer: SocketAddr, bus: EventBus) -> Result<(), GpsError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| GpsError::Io(format!("WS handshake from {peer}: {e}")))?;
    info!(%peer, "websocket client connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut fixes = bus.subscribe_to(Topic::Fixes);
    let mut alerts = bus.subscribe_to(Topic::SystemAlerts);

    loop {
        tokio::select! {
            // ── Downstream: fixes → client ─────────────────────────────────
            result = fixes.recv() => {
                if !forward_event(&mut ws_tx, peer, result).await {
                    break;
                }
            }
            // ── Downstream: alerts → client ────────────────────────────────
            result = alerts.recv() => {
                if !forward_event(&mut ws_tx, peer, result).await {
                    break;
                }
            }
            // ── Upstream: client → EventBus ────────────────────────────────
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_upstream_message(text.as_str(), &bus);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    info!(%peer, "websocket client disconnected");
    Ok(())
}

/// Serialize one bus event onto the socket. Returns `false` when the
/// connection is dead and the bridge should stop.
async fn forward_event<S>(
    ws_tx: &mut S,
    peer: SocketAddr,
    result: Result<Event, RecvError>,
) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    match result {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json) => ws_tx.send(Message::Text(json.into())).await.is_ok(),
            Err(e) => {
                warn!(error = %e, "serialization error");
                true
            }
        },
        Err(RecvError::Lagged(n)) => {
            warn!(%peer, dropped = n, "ws client lagged");
            true
        }
        Err(RecvError::Closed) => false,
    }
}

// ---------------------------------------------------------------------------
// Upstream message parser
// ---------------------------------------------------------------------------

/// Parse an incoming WebSocket text message and inject the appropriate event
/// onto the [`EventBus`].
///
/// Recognised operations:
///
/// | `op` | Effect |
/// |---|---|
/// | `adjust_calibration` + finite `delta` | Publishes [`EventPayload::CalibrationAdjust`] on [`Topic::Control`] |
///
/// Unknown or malformed messages are silently ignored.
pub(crate) fn handle_upstream_message(text: &str, bus: &EventBus) {
    let Ok(json) = serde_json::from_str::<Value>(text) else {
        return;
    };

    let op = json.get("op").and_then(|o| o.as_str()).unwrap_or("");

    if op == "adjust_calibration" {
        let Some(delta) = json.get("delta").and_then(|d| d.as_f64()) else {
            return;
        };
        if !delta.is_finite() {
            return;
        }
        debug!(delta, "calibration trim from client");
        let event = Event::now(SOURCE, EventPayload::CalibrationAdjust { delta });
        if bus.publish_to(Topic::Control, event).is_err() {
            warn!("calibration trim dropped: no tracker listening");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ── StationServer constructor ─────────────────────────────────────────────

    #[test]
    fn default_port_is_8080() {
        let server = StationServer::new(EventBus::default());
        assert_eq!(server.port(), DEFAULT_PORT);
    }

    #[test]
    fn with_port_overrides_default() {
        let server = StationServer::new(EventBus::default()).with_port(9999);
        assert_eq!(server.port(), 9999);
    }

    // ── Upstream message handling ─────────────────────────────────────────────

    #[tokio::test]
    async fn upstream_adjust_publishes_calibration_event() {
        let bus = EventBus::default();
        let mut control = bus.subscribe_to(Topic::Control);

        handle_upstream_message(r#"{"op":"adjust_calibration","delta":0.1}"#, &bus);

        let event = control.recv().await.unwrap();
        assert_eq!(event.source, SOURCE);
        match event.payload {
            EventPayload::CalibrationAdjust { delta } => {
                assert!((delta - 0.1).abs() < f64::EPSILON)
            }
            other => panic!("expected CalibrationAdjust, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upstream_negative_adjust_passes_through() {
        let bus = EventBus::default();
        let mut control = bus.subscribe_to(Topic::Control);

        handle_upstream_message(r#"{"op":"adjust_calibration","delta":-0.1}"#, &bus);

        let event = control.recv().await.unwrap();
        assert!(matches!(
            event.payload,
            EventPayload::CalibrationAdjust { delta } if delta < 0.0
        ));
    }

    #[test]
    fn upstream_non_finite_delta_is_ignored() {
        let bus = EventBus::default();
        let mut control = bus.subscribe_to(Topic::Control);

        handle_upstream_message(r#"{"op":"adjust_calibration","delta":"NaN"}"#, &bus);
        handle_upstream_message(r#"{"op":"adjust_calibration"}"#, &bus);

        assert!(control.try_recv().is_err());
    }

    #[test]
    fn upstream_unknown_op_is_ignored() {
        let bus = EventBus::default();
        let mut control = bus.subscribe_to(Topic::Control);

        handle_upstream_message(r#"{"op":"subscribe","topic":"/unknown"}"#, &bus);

        assert!(control.try_recv().is_err());
    }

    #[test]
    fn upstream_invalid_json_is_ignored() {
        let bus = EventBus::default();
        let mut control = bus.subscribe_to(Topic::Control);

        handle_upstream_message("not json at all", &bus);

        assert!(control.try_recv().is_err());
    }

    // ── HTML embedding ────────────────────────────────────────────────────────

    #[test]
    fn station_html_is_non_empty() {
        assert!(!STATION_HTML.is_empty(), "embedded status page must not be empty");
    }

    #[test]
    fn station_html_contains_websocket_connect_code() {
        assert!(
            STATION_HTML.contains("WebSocket"),
            "status page must contain WebSocket connection code"
        );
    }

    #[test]
    fn station_html_contains_calibration_controls() {
        assert!(
            STATION_HTML.contains("adjust_calibration"),
            "status page must send calibration trims"
        );
    }
}
