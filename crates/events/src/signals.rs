//! Signals the presentation layer must surface to the user.

use serde::Serialize;
use stylecanvas_core::preview::PreviewErrorKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum UiSignal {
    /// Show the upgrade/quota prompt.
    QuotaExceeded {
        style_id: String,
        kind: PreviewErrorKind,
        message: String,
    },
    /// Open the sign-in flow; the engine resumes `style_id` afterwards.
    AuthRequired { style_id: String },
    /// The provider reported the balance is running low.
    TokensLow { remaining: u32 },
}
