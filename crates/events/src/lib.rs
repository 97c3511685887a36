//! Telemetry and UI signal plumbing for the preview engine.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, generic over the event type.
//! - [`TelemetryEvent`]: `preview:start` / `complete` / `error` /
//!   `cache-hit` markers.
//! - [`UiSignal`]: prompts the presentation layer must react to (quota
//!   modal, auth modal, low-balance toast).
//! - [`TelemetryLogger`]: background sink writing every event to `tracing`.
//! - [`delivery`]: optional HTTP forwarding of telemetry to a collector.
//!
//! Publishing never fails and never blocks the preview flow.

pub mod bus;
pub mod delivery;
pub mod logger;
pub mod signals;
pub mod telemetry;

pub use bus::EventBus;
pub use delivery::http::HttpTelemetryForwarder;
pub use logger::TelemetryLogger;
pub use signals::UiSignal;
pub use telemetry::{TelemetryEvent, TelemetryKind};

/// Bus carrying telemetry markers.
pub type TelemetryBus = EventBus<TelemetryEvent>;

/// Bus carrying UI signals.
pub type SignalBus = EventBus<UiSignal>;
