//! The preview-generation contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stylecanvas_core::entitlement::{GenerationCharge, Priority, Tier};
use stylecanvas_core::preview::CropConfig;
use stylecanvas_core::session::ImageSource;
use stylecanvas_core::style::Orientation;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

/// One preview request as sent to the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewRequest {
    pub style_id: String,
    pub orientation: Orientation,
    pub image: ImageSource,
    pub image_hash: String,
    /// `None` on the batch path, where no key negotiation is done.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_config: Option<CropConfig>,
    /// Sent as a bearer token, never in the body.
    #[serde(skip)]
    pub access_token: Option<String>,
}

/// A successful provider response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreviewResult {
    pub preview_url: String,
    #[serde(default)]
    pub requires_watermark: bool,
    #[serde(default)]
    pub storage_url: Option<String>,
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub source_storage_path: Option<String>,
    #[serde(default)]
    pub source_display_url: Option<String>,
    #[serde(default)]
    pub preview_log_id: Option<String>,
    /// Authoritative balance after this generation was charged.
    #[serde(default)]
    pub remaining_tokens: Option<u32>,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Set when the balance has dropped under the provider's warning line.
    #[serde(default)]
    pub soft_remaining: Option<u32>,
    #[serde(default)]
    pub crop_config: Option<CropConfig>,
}

impl PreviewResult {
    /// Entitlement-relevant part of the response.
    pub fn charge(&self) -> GenerationCharge {
        GenerationCharge {
            remaining_tokens: self.remaining_tokens,
            tier: self.tier,
            priority: self.priority,
            requires_watermark: Some(self.requires_watermark),
        }
    }
}

/// Something that can turn a photo into a styled preview.
///
/// Implementations must observe `cancel`: once it fires, the call returns
/// [`ProviderError::Aborted`] promptly instead of a generic failure.
#[async_trait]
pub trait PreviewProvider: Send + Sync {
    async fn fetch_preview(
        &self,
        request: PreviewRequest,
        cancel: CancellationToken,
    ) -> Result<PreviewResult, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_optional_fields_and_token() {
        let request = PreviewRequest {
            style_id: "oil".into(),
            orientation: Orientation::Square,
            image: ImageSource::Url("https://img".into()),
            image_hash: "h".into(),
            idempotency_key: None,
            force: false,
            crop_config: None,
            access_token: Some("secret".into()),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["style_id"], "oil");
        assert_eq!(json["orientation"], "square");
        assert!(json.get("idempotency_key").is_none());
        assert!(json.get("force").is_none());
        assert!(json.get("access_token").is_none());
    }

    #[test]
    fn result_parses_minimal_body() {
        let result: PreviewResult =
            serde_json::from_value(serde_json::json!({ "preview_url": "https://p" })).unwrap();
        assert_eq!(result.preview_url, "https://p");
        assert!(!result.requires_watermark);
        assert_eq!(result.charge().remaining_tokens, None);
    }

    #[test]
    fn result_charge_carries_server_count() {
        let result: PreviewResult = serde_json::from_value(serde_json::json!({
            "preview_url": "https://p",
            "requires_watermark": true,
            "remaining_tokens": 3,
            "tier": "creator"
        }))
        .unwrap();
        let charge = result.charge();
        assert_eq!(charge.remaining_tokens, Some(3));
        assert_eq!(charge.tier, Some(Tier::Creator));
        assert_eq!(charge.requires_watermark, Some(true));
    }
}
