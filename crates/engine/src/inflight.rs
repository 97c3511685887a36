//! Per-style tracking of running generations.
//!
//! At most one generation per style is outstanding. A second request for
//! the same style and orientation joins the running one; a request for a
//! different orientation cancels it first, so a slow response for the old
//! orientation can never land on top of the new one.

use std::collections::HashMap;

use futures::future::{BoxFuture, Shared};
use stylecanvas_core::preview::PreviewOutcome;
use stylecanvas_core::style::Orientation;
use tokio_util::sync::CancellationToken;

/// Outcome future that any number of callers can await.
pub type SharedOutcome = Shared<BoxFuture<'static, PreviewOutcome>>;

/// One running generation.
pub struct InFlight {
    /// Engine-wide operation id; identifies this run when it completes.
    pub op_id: u64,
    pub orientation: Orientation,
    pub cancel: CancellationToken,
    pub outcome: SharedOutcome,
}

/// Result of [`InFlightMap::join_or_start`].
pub enum Slot {
    /// An identical generation was already running.
    Joined(SharedOutcome),
    /// A new generation was registered.
    Started(SharedOutcome),
}

impl Slot {
    pub fn into_outcome(self) -> SharedOutcome {
        match self {
            Slot::Joined(outcome) | Slot::Started(outcome) => outcome,
        }
    }
}

#[derive(Default)]
pub struct InFlightMap {
    by_style: HashMap<String, InFlight>,
}

impl InFlightMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the generation running for `(style_id, orientation)`, or call
    /// `start` to launch one.
    ///
    /// A generation running for the same style but another orientation is
    /// cancelled and forgotten before `start` runs.
    pub fn join_or_start<F>(&mut self, style_id: &str, orientation: Orientation, start: F) -> Slot
    where
        F: FnOnce() -> InFlight,
    {
        if let Some(existing) = self.by_style.get(style_id) {
            if existing.orientation == orientation {
                return Slot::Joined(existing.outcome.clone());
            }
            tracing::debug!(
                style_id,
                stale_orientation = %existing.orientation,
                orientation = %orientation,
                "Cancelling preview for previous orientation",
            );
            self.cancel(style_id);
        }

        let flight = start();
        let outcome = flight.outcome.clone();
        self.by_style.insert(style_id.to_string(), flight);
        Slot::Started(outcome)
    }

    /// Operation id of the generation running for `(style_id, orientation)`.
    pub fn running_op(&self, style_id: &str, orientation: Orientation) -> Option<u64> {
        self.by_style
            .get(style_id)
            .filter(|f| f.orientation == orientation)
            .map(|f| f.op_id)
    }

    /// Forget a finished generation.
    ///
    /// Returns `false` when `op_id` is no longer the tracked run for the
    /// style (it was cancelled or superseded); its result is stale.
    pub fn finish(&mut self, style_id: &str, op_id: u64) -> bool {
        match self.by_style.get(style_id) {
            Some(flight) if flight.op_id == op_id => {
                self.by_style.remove(style_id);
                true
            }
            _ => false,
        }
    }

    /// Cancel and forget the generation for one style.
    pub fn cancel(&mut self, style_id: &str) -> bool {
        match self.by_style.remove(style_id) {
            Some(flight) => {
                flight.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel and forget every generation matching `predicate`.
    ///
    /// Returns the affected style ids.
    pub fn cancel_where<P>(&mut self, mut predicate: P) -> Vec<String>
    where
        P: FnMut(&str, &InFlight) -> bool,
    {
        let doomed: Vec<String> = self
            .by_style
            .iter()
            .filter(|(style_id, flight)| predicate(style_id, flight))
            .map(|(style_id, _)| style_id.clone())
            .collect();
        for style_id in &doomed {
            self.cancel(style_id);
        }
        doomed
    }

    pub fn cancel_all(&mut self) -> Vec<String> {
        self.cancel_where(|_, _| true)
    }

    pub fn len(&self) -> usize {
        self.by_style.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_style.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
