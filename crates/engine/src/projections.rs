//! Read-only views of engine state for presentation components.
//!
//! The engine publishes an [`EngineSnapshot`] on a `tokio::sync::watch`
//! channel after every transition; sidebar, canvas, modal, and drawer each
//! hold a receiver and read through these selectors.

use std::collections::HashMap;

use serde::Serialize;
use stylecanvas_core::entitlement::{Entitlements, EntitlementStatus, Tier};
use stylecanvas_core::preview::{PreviewState, PreviewStatus};
use stylecanvas_core::style::Orientation;

/// Everything the UI can observe about the engine.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineSnapshot {
    /// One record per style that has been touched this session.
    pub previews: HashMap<String, PreviewState>,
    /// Status of the most recently initiated interactive operation.
    pub global_status: PreviewStatus,
    /// Style of the most recently initiated interactive operation.
    pub current_style_id: Option<String>,
    pub orientation: Orientation,
    pub entitlements: Entitlements,
    /// Successful generations this session. Display only; the server-side
    /// balance is authoritative.
    pub generation_count: u32,
}

impl EngineSnapshot {
    pub fn preview(&self, style_id: &str) -> &PreviewState {
        static IDLE: PreviewState = PreviewState::Idle;
        self.previews.get(style_id).unwrap_or(&IDLE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitlementSummary {
    pub status: EntitlementStatus,
    pub tier: Tier,
    pub quota: Option<u32>,
    pub remaining_tokens: Option<u32>,
    pub requires_watermark: bool,
}

/// Preview of the currently selected style, if any.
pub fn current_preview(snapshot: &EngineSnapshot) -> Option<(&str, &PreviewState)> {
    let style_id = snapshot.current_style_id.as_deref()?;
    Some((style_id, snapshot.preview(style_id)))
}

pub fn global_status(snapshot: &EngineSnapshot) -> PreviewStatus {
    snapshot.global_status
}

pub fn entitlement_summary(snapshot: &EngineSnapshot) -> EntitlementSummary {
    let e = &snapshot.entitlements;
    EntitlementSummary {
        status: e.status,
        tier: e.tier,
        quota: e.quota,
        remaining_tokens: e.remaining_tokens,
        requires_watermark: e.requires_watermark,
    }
}

pub fn generation_count(snapshot: &EngineSnapshot) -> u32 {
    snapshot.generation_count
}

/// Styles currently in the given status, sorted by id.
pub fn styles_with_status(snapshot: &EngineSnapshot, status: PreviewStatus) -> Vec<&str> {
    let mut ids: Vec<&str> = snapshot
        .previews
        .iter()
        .filter(|(_, state)| state.status() == status)
        .map(|(id, _)| id.as_str())
        .collect();
    ids.sort_unstable();
    ids
}

#[cfg(test)]
mod tests {
    use stylecanvas_core::preview::PreviewFailure;

    use super::*;

    #[test]
    fn unknown_style_reads_as_idle() {
        let snapshot = EngineSnapshot::default();
        assert_eq!(snapshot.preview("oil"), &PreviewState::Idle);
        assert!(current_preview(&snapshot).is_none());
    }

    #[test]
    fn current_preview_follows_selection() {
        let mut snapshot = EngineSnapshot::default();
        snapshot.previews.insert(
            "oil".into(),
            PreviewState::Loading {
                orientation: Orientation::Square,
                started_at: 1,
            },
        );
        snapshot.current_style_id = Some("oil".into());

        let (id, state) = current_preview(&snapshot).expect("selected");
        assert_eq!(id, "oil");
        assert_eq!(state.status(), PreviewStatus::Loading);
    }

    #[test]
    fn summary_and_status_filters() {
        let mut snapshot = EngineSnapshot::default();
        snapshot.entitlements = Entitlements::ready(Tier::Free, Some(3));
        snapshot.previews.insert(
            "watercolor".into(),
            PreviewState::Error {
                orientation: Orientation::Square,
                failure: PreviewFailure::transient("x"),
            },
        );
        snapshot.previews.insert("oil".into(), PreviewState::Idle);

        let summary = entitlement_summary(&snapshot);
        assert_eq!(summary.remaining_tokens, Some(3));
        assert!(summary.requires_watermark);
        assert_eq!(styles_with_status(&snapshot, PreviewStatus::Error), vec!["watercolor"]);
        assert_eq!(generation_count(&snapshot), 0);
        assert_eq!(global_status(&snapshot), PreviewStatus::Idle);
    }
}
