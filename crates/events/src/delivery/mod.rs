//! External delivery channels for telemetry.
//!
//! Forwarding is best-effort: failures are logged and dropped.

pub mod http;
