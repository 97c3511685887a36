//! Per-style preview state and the failure taxonomy.
//!
//! [`PreviewState`] is a tagged variant rather than one record with many
//! optional fields: a `Ready` state always carries its payload and an
//! `Error` state always carries its failure.

use serde::{Deserialize, Serialize};

use crate::entitlement::DenialReason;
use crate::style::Orientation;
use crate::types::EpochMillis;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Coarse status of a preview operation.
///
/// Also used as the single global status reflecting the most recently
/// initiated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Crop rectangle in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropConfig {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Result of a successful generation, as shown to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewPayload {
    pub preview_url: String,
    pub watermark_applied: bool,
    pub started_at: EpochMillis,
    pub completed_at: EpochMillis,
    pub storage_url: Option<String>,
    pub storage_path: Option<String>,
    pub source_storage_path: Option<String>,
    pub source_display_url: Option<String>,
    pub preview_log_id: Option<String>,
    pub crop_config: Option<CropConfig>,
    /// Tokens left when the provider flagged the balance as running low.
    pub soft_remaining: Option<u32>,
}

impl PreviewPayload {
    /// The reference a gallery save should persist: the durable storage
    /// path when one exists, the preview URL otherwise.
    pub fn stable_reference(&self) -> &str {
        self.storage_path.as_deref().unwrap_or(&self.preview_url)
    }
}

// ---------------------------------------------------------------------------
// Failure taxonomy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewErrorKind {
    /// The entitlement gate refused the request before any network call.
    GateDenied,
    /// The provider rejected the request for quota or rate reasons.
    QuotaExceeded,
    /// Network failure, timeout, or a 5xx from the provider.
    Transient,
    /// The provider could not process the input (e.g. corrupt image).
    Validation,
    /// A signed-in session is required.
    AuthRequired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewFailure {
    pub kind: PreviewErrorKind,
    pub message: String,
}

impl PreviewFailure {
    pub fn new(kind: PreviewErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn gate_denied(reason: DenialReason) -> Self {
        Self::new(PreviewErrorKind::GateDenied, reason.message())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(PreviewErrorKind::Transient, message)
    }

    /// Whether retrying with the same input can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, PreviewErrorKind::Transient)
    }

    /// Whether the failure should raise the quota/upgrade prompt.
    pub fn is_quota(&self) -> bool {
        matches!(
            self.kind,
            PreviewErrorKind::GateDenied | PreviewErrorKind::QuotaExceeded
        )
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// State of the preview for one style.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PreviewState {
    #[default]
    Idle,
    Loading {
        orientation: Orientation,
        started_at: EpochMillis,
    },
    Ready {
        orientation: Orientation,
        payload: PreviewPayload,
    },
    Error {
        orientation: Orientation,
        failure: PreviewFailure,
    },
}

impl PreviewState {
    pub fn status(&self) -> PreviewStatus {
        match self {
            PreviewState::Idle => PreviewStatus::Idle,
            PreviewState::Loading { .. } => PreviewStatus::Loading,
            PreviewState::Ready { .. } => PreviewStatus::Ready,
            PreviewState::Error { .. } => PreviewStatus::Error,
        }
    }

    pub fn orientation(&self) -> Option<Orientation> {
        match self {
            PreviewState::Idle => None,
            PreviewState::Loading { orientation, .. }
            | PreviewState::Ready { orientation, .. }
            | PreviewState::Error { orientation, .. } => Some(*orientation),
        }
    }

    pub fn payload(&self) -> Option<&PreviewPayload> {
        match self {
            PreviewState::Ready { payload, .. } => Some(payload),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&PreviewFailure> {
        match self {
            PreviewState::Error { failure, .. } => Some(failure),
            _ => None,
        }
    }

    /// `Ready` or `Loading`, i.e. nothing for a batch run to do.
    pub fn is_settled_or_pending(&self) -> bool {
        matches!(
            self,
            PreviewState::Ready { .. } | PreviewState::Loading { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What a preview call resolved to, as returned to the caller.
///
/// Cloneable so several joined callers can share one result.
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewOutcome {
    Ready {
        payload: PreviewPayload,
        from_cache: bool,
    },
    Failed(PreviewFailure),
    /// Cancelled by the user, a navigation, or a newer request.
    Aborted,
}

impl PreviewOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PreviewOutcome::Ready { .. })
    }

    pub fn failure(&self) -> Option<&PreviewFailure> {
        match self {
            PreviewOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
