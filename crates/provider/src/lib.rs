//! Clients for the external services the preview engine talks to.
//!
//! Provides the [`PreviewProvider`] and [`EntitlementSource`] contracts,
//! their HTTP implementations over [`reqwest`], and the exponential-backoff
//! helper used by non-interactive callers.

pub mod api;
pub mod entitlements;
pub mod error;
pub mod provider;
pub mod retry;

pub use api::HttpPreviewProvider;
pub use entitlements::{EntitlementSource, HttpEntitlementClient, StaticEntitlements};
pub use error::ProviderError;
pub use provider::{PreviewProvider, PreviewRequest, PreviewResult};
