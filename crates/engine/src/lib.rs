//! Preview orchestration for the style canvas.
//!
//! [`PreviewEngine`] ties together the session cache, in-flight
//! deduplication, the entitlement gate, and the preview provider. UI
//! surfaces observe it through [`EngineSnapshot`] receivers and the signal
//! bus; they never mutate its state directly.

pub mod cache;
pub mod classify;
pub mod config;
pub mod engine;
pub mod inflight;
pub mod projections;

pub use config::{ConfigError, EngineConfig};
pub use engine::{BatchOptions, BatchReport, EngineOptions, PreviewEngine, StartOptions};
pub use projections::EngineSnapshot;
