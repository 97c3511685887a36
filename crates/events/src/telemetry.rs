//! Telemetry markers bracketing preview operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stylecanvas_core::preview::PreviewStatus;
use stylecanvas_core::style::Orientation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryKind {
    #[serde(rename = "preview:start")]
    Start,
    #[serde(rename = "preview:complete")]
    Complete,
    #[serde(rename = "preview:error")]
    Error,
    #[serde(rename = "preview:cache-hit")]
    CacheHit,
}

impl TelemetryKind {
    pub fn name(self) -> &'static str {
        match self {
            TelemetryKind::Start => "preview:start",
            TelemetryKind::Complete => "preview:complete",
            TelemetryKind::Error => "preview:error",
            TelemetryKind::CacheHit => "preview:cache-hit",
        }
    }

    /// Status the style is in when this marker is emitted.
    pub fn status(self) -> PreviewStatus {
        match self {
            TelemetryKind::Start => PreviewStatus::Loading,
            TelemetryKind::Complete | TelemetryKind::CacheHit => PreviewStatus::Ready,
            TelemetryKind::Error => PreviewStatus::Error,
        }
    }
}

/// A single telemetry marker.
///
/// Constructed via [`TelemetryEvent::new`] and optionally enriched with
/// [`with_detail`](TelemetryEvent::with_detail).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    #[serde(rename = "event")]
    pub kind: TelemetryKind,
    pub style_id: String,
    pub orientation: Orientation,
    pub status: PreviewStatus,
    /// Free-form JSON carrying event-specific data (error kind, latency).
    pub detail: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn new(kind: TelemetryKind, style_id: impl Into<String>, orientation: Orientation) -> Self {
        Self {
            kind,
            style_id: style_id.into(),
            orientation,
            status: kind.status(),
            detail: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_wire_event_names() {
        let event = TelemetryEvent::new(TelemetryKind::CacheHit, "oil", Orientation::Square);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "preview:cache-hit");
        assert_eq!(json["status"], "ready");
        assert_eq!(json["style_id"], "oil");
        assert!(json["detail"].is_object());
    }

    #[test]
    fn names_match_serde_renames() {
        for kind in [
            TelemetryKind::Start,
            TelemetryKind::Complete,
            TelemetryKind::Error,
            TelemetryKind::CacheHit,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.name());
        }
    }
}
