//! Prometheus Metrics Module
//!
//! Exposes client metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Inbound gateway frames by type, protocol errors
//! - **Wire**: Outbound messages by op
//! - **Connection**: State gauge, reconnect attempts, transport errors
//! - **Dispatch**: Active symbols, listener panics, routing latency
//!
//! # Integration
//!
//! Without an installed recorder every helper is a no-op, so library code
//! records unconditionally. The binary installs the recorder and optionally
//! serves `/metrics` on its own listener.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::events::EventKind;
use crate::domain::connection::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// With `port == 0` the recorder is installed in-process and can be rendered
/// via [`get_metrics_handle`]. Otherwise an HTTP listener serves the scrape
/// endpoint on `0.0.0.0:port` (this variant must run inside a tokio runtime).
/// Repeated calls are no-ops.
///
/// # Errors
///
/// Returns [`BuildError`] if the recorder or listener cannot be installed.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let builder = PrometheusBuilder::new();
    if port == 0 {
        let handle = builder.install_recorder()?;
        let _ = PROMETHEUS_HANDLE.set(handle);
    } else {
        builder
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
            .install()?;
    }

    register_metrics();
    let _ = INSTALLED.set(());
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` unless metrics were initialized without an HTTP listener.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Frame counters
    describe_counter!(
        "quote_stream_frames_received_total",
        "Total gateway frames decoded, by event type"
    );
    describe_counter!(
        "quote_stream_protocol_errors_total",
        "Total inbound frames dropped as malformed or unexpected"
    );
    describe_counter!(
        "quote_stream_messages_sent_total",
        "Total wire messages sent to the gateway, by op"
    );

    // Connection
    describe_gauge!(
        "quote_stream_connection_state",
        "Connection state (0=disconnected 1=connecting 2=connected 3=reconnecting 4=error)"
    );
    describe_counter!(
        "quote_stream_reconnects_total",
        "Total reconnect attempts scheduled"
    );
    describe_counter!(
        "quote_stream_transport_errors_total",
        "Total transport errors by type"
    );

    // Dispatch
    describe_gauge!(
        "quote_stream_active_symbols",
        "Number of symbols with at least one consumer"
    );
    describe_counter!(
        "quote_stream_listener_panics_total",
        "Total event listeners that panicked during dispatch"
    );
    describe_histogram!(
        "quote_stream_frame_processing_seconds",
        "Time to decode and dispatch one inbound frame"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for transport error types.
#[derive(Debug, Clone, Copy)]
pub enum TransportErrorType {
    /// Handshake refused or endpoint unreachable.
    Handshake,
    /// Handshake timed out.
    Timeout,
    /// Error reported on an open session.
    Session,
    /// Session closed without being asked to.
    UnexpectedClose,
}

impl TransportErrorType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::Timeout => "timeout",
            Self::Session => "session",
            Self::UnexpectedClose => "unexpected_close",
        }
    }
}

/// Record a decoded gateway frame.
pub fn record_frame_received(kind: EventKind) {
    counter!(
        "quote_stream_frames_received_total",
        "event" => kind.as_str()
    )
    .increment(1);
}

/// Record a dropped inbound frame.
pub fn record_protocol_error() {
    counter!("quote_stream_protocol_errors_total").increment(1);
}

/// Record a wire message sent to the gateway.
pub fn record_message_sent(op: &'static str) {
    counter!("quote_stream_messages_sent_total", "op" => op).increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("quote_stream_connection_state").set(state.as_gauge());
}

/// Record a scheduled reconnect attempt.
pub fn record_reconnect() {
    counter!("quote_stream_reconnects_total").increment(1);
}

/// Record a transport error.
pub fn record_transport_error(error_type: TransportErrorType) {
    counter!(
        "quote_stream_transport_errors_total",
        "error_type" => error_type.as_str()
    )
    .increment(1);
}

/// Update the active symbol count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_symbols(count: usize) {
    gauge!("quote_stream_active_symbols").set(count as f64);
}

/// Record a listener that panicked.
pub fn record_listener_panic(kind: EventKind) {
    counter!(
        "quote_stream_listener_panics_total",
        "event" => kind.as_str()
    )
    .increment(1);
}

/// Record frame decode and dispatch duration.
pub fn record_processing_duration(duration: Duration) {
    histogram!("quote_stream_frame_processing_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
