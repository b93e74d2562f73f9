//! # Change Notification
//!
//! Live screens subscribe to the store and re-run their queries whenever any
//! underlying row changes. The store side of that contract lives here: every
//! committed mutation - local edit, merge, status transition, wipe - emits a
//! [`ChangeEvent`] on a broadcast channel.
//!
//! The notifier carries no row data, only which record type changed;
//! subscribers re-query through the repositories. Lagging subscribers drop
//! old events (broadcast semantics), which is fine because events are only a
//! "re-read now" hint, never authoritative state.

use opencare_core::RecordType;
use tokio::sync::broadcast;

/// A committed mutation touching rows of one record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub record_type: RecordType,
}

/// Broadcast fan-out for store mutations.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    /// Creates a notifier whose subscribers buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        ChangeNotifier { tx }
    }

    /// Subscribes to all future change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Emits a change event. No-op when nobody is subscribed.
    pub fn notify(&self, record_type: RecordType) {
        let _ = self.tx.send(ChangeEvent { record_type });
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        // 64 buffered events is plenty for "re-read" hints.
        ChangeNotifier::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_notification() {
        let notifier = ChangeNotifier::default();
        let mut rx = notifier.subscribe();

        notifier.notify(RecordType::Patient);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.record_type, RecordType::Patient);
    }

    #[test]
    fn notify_without_subscribers_does_not_panic() {
        ChangeNotifier::default().notify(RecordType::Measurement);
    }
}
