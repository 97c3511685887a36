//! Session entitlements and the preview admission gate.
//!
//! [`evaluate`] is a pure function over an [`Entitlements`] snapshot.
//! Hydration (fetching the record from the backend) is somebody else's job;
//! the gate only looks at what has already been loaded.

use serde::{Deserialize, Serialize};

use crate::types::{EpochMillis, Timestamp};

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Load status of the session entitlement record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Creator,
    Plus,
    Pro,
    Dev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    Priority,
}

/// Session-scoped allowance record.
///
/// `quota` and `remaining_tokens` use `None` for "unlimited".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Entitlements {
    pub status: EntitlementStatus,
    pub tier: Tier,
    pub quota: Option<u32>,
    pub remaining_tokens: Option<u32>,
    pub requires_watermark: bool,
    pub priority: Priority,
    pub renew_at: Option<Timestamp>,
    pub last_synced_at: Option<EpochMillis>,
    pub error: Option<String>,
}

/// Wire shape returned by the hydration service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementSnapshot {
    pub tier: Tier,
    #[serde(default)]
    pub quota: Option<u32>,
    #[serde(default)]
    pub remaining_tokens: Option<u32>,
    #[serde(default = "default_true")]
    pub requires_watermark: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub renew_at: Option<Timestamp>,
}

fn default_true() -> bool {
    true
}

impl Entitlements {
    /// A ready record with the given token count, mostly for tests and
    /// local runs without a hydration service.
    pub fn ready(tier: Tier, remaining_tokens: Option<u32>) -> Self {
        Self {
            status: EntitlementStatus::Ready,
            tier,
            quota: remaining_tokens,
            remaining_tokens,
            requires_watermark: matches!(tier, Tier::Free),
            ..Default::default()
        }
    }

    pub fn mark_loading(&mut self) {
        self.status = EntitlementStatus::Loading;
        self.error = None;
    }

    /// Replace the record with a freshly hydrated snapshot.
    pub fn apply_snapshot(&mut self, snapshot: EntitlementSnapshot, synced_at: EpochMillis) {
        self.status = EntitlementStatus::Ready;
        self.tier = snapshot.tier;
        self.quota = snapshot.quota;
        self.remaining_tokens = snapshot.remaining_tokens;
        self.requires_watermark = snapshot.requires_watermark;
        self.priority = snapshot.priority;
        self.renew_at = snapshot.renew_at;
        self.last_synced_at = Some(synced_at);
        self.error = None;
    }

    /// Hydration failed. Previously loaded values are kept so the UI can
    /// still show them, but the gate will deny until a retry succeeds.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = EntitlementStatus::Error;
        self.error = Some(message.into());
    }

    /// Fold a successful generation into the record.
    ///
    /// The server-reported count always wins. Without one, the local count
    /// is decremented optimistically (never below zero, never touching an
    /// unlimited allowance).
    pub fn apply_generation(&mut self, update: &GenerationCharge) {
        match update.remaining_tokens {
            Some(remaining) => self.remaining_tokens = Some(remaining),
            None => {
                if let Some(remaining) = self.remaining_tokens {
                    self.remaining_tokens = Some(remaining.saturating_sub(1));
                }
            }
        }
        if let Some(tier) = update.tier {
            self.tier = tier;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(requires_watermark) = update.requires_watermark {
            self.requires_watermark = requires_watermark;
        }
    }
}

/// Entitlement-relevant fields of a provider response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationCharge {
    pub remaining_tokens: Option<u32>,
    pub tier: Option<Tier>,
    pub priority: Option<Priority>,
    pub requires_watermark: Option<bool>,
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Why the gate refused a preview request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// Entitlements have not been hydrated (or hydration failed).
    NotHydrated,
    /// The allowance is used up.
    QuotaExhausted,
}

impl DenialReason {
    pub fn message(self) -> &'static str {
        match self {
            DenialReason::NotHydrated => "Checking your plan, please try again in a moment",
            DenialReason::QuotaExhausted => {
                "You've used all your preview tokens. Upgrade to keep generating"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Denied(DenialReason),
}

impl GateDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, GateDecision::Allowed)
    }
}

/// Decide whether a preview for `style_id` may be requested.
///
/// The style id does not influence the decision today; it is part of the
/// signature so per-style pricing can be gated without touching callers.
pub fn evaluate(entitlements: &Entitlements, _style_id: &str) -> GateDecision {
    if entitlements.status != EntitlementStatus::Ready {
        return GateDecision::Denied(DenialReason::NotHydrated);
    }
    match entitlements.remaining_tokens {
        None => GateDecision::Allowed,
        Some(0) => GateDecision::Denied(DenialReason::QuotaExhausted),
        Some(_) => GateDecision::Allowed,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
