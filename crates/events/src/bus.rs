//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus<E>>` between the engine (the
//! only publisher) and any number of observers.

use tokio::sync::broadcast;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published event.
///
/// # Usage
///
/// ```rust
/// use stylecanvas_events::{EventBus, TelemetryEvent, TelemetryKind};
/// use stylecanvas_core::style::Orientation;
///
/// let bus: EventBus<TelemetryEvent> = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(TelemetryEvent::new(TelemetryKind::Start, "oil", Orientation::Square));
/// ```
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: E) {
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use stylecanvas_core::style::Orientation;

    use super::*;
    use crate::telemetry::{TelemetryEvent, TelemetryKind};

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus: EventBus<TelemetryEvent> = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            TelemetryEvent::new(TelemetryKind::Complete, "oil", Orientation::Square)
                .with_detail(serde_json::json!({"from_cache": false})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.kind, TelemetryKind::Complete);
        assert_eq!(received.style_id, "oil");
        assert_eq!(received.detail["from_cache"], false);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus: EventBus<TelemetryEvent> = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(TelemetryEvent::new(TelemetryKind::Start, "oil", Orientation::Square));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(e1.kind, TelemetryKind::Start);
        assert_eq!(e2.kind, TelemetryKind::Start);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus: EventBus<TelemetryEvent> = EventBus::default();
        bus.publish(TelemetryEvent::new(TelemetryKind::Error, "oil", Orientation::Square));
    }
}
