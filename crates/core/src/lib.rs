//! Domain types and pure decision logic for style previews.
//!
//! Nothing in this crate performs I/O. The engine crate drives these
//! building blocks from async code; everything here is synchronous and
//! cheap to unit test.

pub mod entitlement;
pub mod error;
pub mod hashing;
pub mod idempotency;
pub mod preview;
pub mod session;
pub mod style;
pub mod types;
