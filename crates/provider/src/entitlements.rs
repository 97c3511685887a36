//! Entitlement hydration.
//!
//! [`EntitlementSource`] fetches the current allowance for the session.
//! The engine calls it on session start, after checkout or redemption, and
//! lazily when a preview is requested before the record was loaded.

use async_trait::async_trait;
use stylecanvas_core::entitlement::EntitlementSnapshot;
use stylecanvas_core::session::SessionUser;

use crate::api::parse_response;
use crate::error::ProviderError;

/// Path of the entitlement endpoint relative to the base URL.
const ENTITLEMENTS_PATH: &str = "get-entitlements";

#[async_trait]
pub trait EntitlementSource: Send + Sync {
    /// Load the allowance for `user`, or for the anonymous session.
    async fn hydrate(&self, user: Option<&SessionUser>) -> Result<EntitlementSnapshot, ProviderError>;
}

/// HTTP implementation backed by the hosted entitlement function.
pub struct HttpEntitlementClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEntitlementClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl EntitlementSource for HttpEntitlementClient {
    async fn hydrate(&self, user: Option<&SessionUser>) -> Result<EntitlementSnapshot, ProviderError> {
        let mut builder = self
            .client
            .get(format!("{}/{ENTITLEMENTS_PATH}", self.base_url));
        if let Some(user) = user {
            builder = builder.bearer_auth(&user.access_token);
        }

        let response = builder.send().await?;
        let snapshot: EntitlementSnapshot = parse_response(response).await?;

        tracing::debug!(
            tier = ?snapshot.tier,
            remaining_tokens = ?snapshot.remaining_tokens,
            "Entitlements hydrated",
        );
        Ok(snapshot)
    }
}

/// Fixed allowance, for local runs without a hydration service.
pub struct StaticEntitlements(pub EntitlementSnapshot);

#[async_trait]
impl EntitlementSource for StaticEntitlements {
    async fn hydrate(&self, _user: Option<&SessionUser>) -> Result<EntitlementSnapshot, ProviderError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use stylecanvas_core::entitlement::{Priority, Tier};

    use super::*;

    #[tokio::test]
    async fn static_source_returns_snapshot() {
        let source = StaticEntitlements(EntitlementSnapshot {
            tier: Tier::Dev,
            quota: None,
            remaining_tokens: None,
            requires_watermark: false,
            priority: Priority::Priority,
            renew_at: None,
        });
        let snapshot = source.hydrate(None).await.expect("static source never fails");
        assert_eq!(snapshot.tier, Tier::Dev);
        assert!(!snapshot.requires_watermark);
    }
}
