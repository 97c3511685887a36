//! Telemetry log sink.
//!
//! [`TelemetryLogger`] subscribes to the telemetry bus and writes every
//! received [`TelemetryEvent`] to `tracing`. It runs as a long-lived
//! background task and shuts down when the bus is dropped.

use tokio::sync::broadcast;

use crate::telemetry::{TelemetryEvent, TelemetryKind};

/// Background service that logs telemetry events.
pub struct TelemetryLogger;

impl TelemetryLogger {
    /// Run the logging loop until the channel closes.
    ///
    /// Returns the number of events logged, which is handy in tests.
    pub async fn run(mut receiver: broadcast::Receiver<TelemetryEvent>) -> u64 {
        let mut logged = 0u64;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    Self::log(&event);
                    logged += 1;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Telemetry logger lagged, some events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Telemetry bus closed, logger shutting down");
                    break;
                }
            }
        }
        logged
    }

    fn log(event: &TelemetryEvent) {
        match event.kind {
            TelemetryKind::Error => tracing::warn!(
                telemetry_event = event.kind.name(),
                style_id = %event.style_id,
                orientation = %event.orientation,
                detail = %event.detail,
                "Preview telemetry",
            ),
            _ => tracing::info!(
                telemetry_event = event.kind.name(),
                style_id = %event.style_id,
                orientation = %event.orientation,
                detail = %event.detail,
                "Preview telemetry",
            ),
        }
    }
}
