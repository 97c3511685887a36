//! HTTP telemetry forwarding with exponential-backoff retry.
//!
//! [`HttpTelemetryForwarder`] POSTs each JSON-encoded [`TelemetryEvent`] to
//! a collector URL. Failed attempts are retried with exponential backoff
//! (1 s, 2 s, 4 s); an event that still fails is logged and dropped.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::telemetry::TelemetryEvent;

/// Retry delays in seconds (exponential backoff: 1s, 2s, 4s).
const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TelemetryDeliveryError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The collector returned a non-2xx status code.
    #[error("Telemetry collector returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// HttpTelemetryForwarder
// ---------------------------------------------------------------------------

/// Forwards telemetry events to an external collector.
pub struct HttpTelemetryForwarder {
    client: reqwest::Client,
    url: String,
    retry_delays: Vec<Duration>,
}

impl HttpTelemetryForwarder {
    pub fn new(url: impl Into<String>) -> Result<Self, TelemetryDeliveryError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
            retry_delays: RETRY_DELAYS_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        })
    }

    /// Override the backoff schedule (tests use zero delays).
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Forward every event from `receiver` until the bus closes.
    pub async fn run(self, mut receiver: broadcast::Receiver<TelemetryEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    // Errors are already logged inside `deliver`.
                    let _ = self.deliver(&event).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Telemetry forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Deliver one event, retrying with backoff.
    pub async fn deliver(&self, event: &TelemetryEvent) -> Result<(), TelemetryDeliveryError> {
        let payload = serde_json::to_value(event).unwrap_or_else(|_| {
            serde_json::json!({ "event": event.kind.name(), "style_id": event.style_id })
        });

        let mut last_err: Option<TelemetryDeliveryError> = None;

        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            match self.try_send(&payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(
                        attempt = attempt + 1,
                        url = %self.url,
                        error = %e,
                        "Telemetry delivery attempt failed, retrying"
                    );
                    last_err = Some(e);
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        // Final attempt after the last backoff.
        match self.try_send(&payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "Telemetry delivery failed after all retries");
                Err(last_err.unwrap_or(e))
            }
        }
    }

    async fn try_send(&self, payload: &serde_json::Value) -> Result<(), TelemetryDeliveryError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(TelemetryDeliveryError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use stylecanvas_core::style::Orientation;

    use super::*;
    use crate::telemetry::TelemetryKind;

    #[test]
    fn error_display_http_status() {
        let err = TelemetryDeliveryError::HttpStatus(502);
        assert_eq!(err.to_string(), "Telemetry collector returned HTTP 502");
    }

    #[tokio::test]
    async fn unreachable_collector_reports_error_without_panicking() {
        // Port 9 (discard) on localhost is not listening in test environments.
        let forwarder = HttpTelemetryForwarder::new("http://127.0.0.1:9/collect")
            .expect("client should build")
            .with_retry_delays(vec![Duration::ZERO]);

        let event = TelemetryEvent::new(TelemetryKind::Start, "oil", Orientation::Square);
        let result = forwarder.deliver(&event).await;
        assert!(matches!(result, Err(TelemetryDeliveryError::Request(_))));
    }
}
