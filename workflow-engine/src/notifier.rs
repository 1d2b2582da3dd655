//! Real-time fan-out of workflow change events.
//!
//! Observers subscribe per patient and receive events over a bounded
//! channel of their own, so a slow or disconnected observer never blocks
//! delivery to others or backpressures the publisher. An observer whose
//! buffer overflows is disconnected rather than silently skipped: its
//! channel closes, which the observer can detect and answer with a
//! re-read plus resubscribe.

use crate::models::WorkflowEvent;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

struct Observer {
    id: Uuid,
    sender: mpsc::Sender<WorkflowEvent>,
}

struct NotifierInner {
    observers: DashMap<Uuid, Vec<Observer>>,
    capacity: usize,
}

impl NotifierInner {
    fn remove(&self, patient_id: Uuid, observer_id: Uuid) {
        if let Some(mut entry) = self.observers.get_mut(&patient_id) {
            entry.retain(|obs| obs.id != observer_id);
        }
        self.observers.remove_if(&patient_id, |_, observers| observers.is_empty());
    }
}

/// Per-patient registry of workflow observers.
#[derive(Clone)]
pub struct WorkflowNotifier {
    inner: Arc<NotifierInner>,
}

impl WorkflowNotifier {
    /// Default per-observer event buffer.
    pub const DEFAULT_OBSERVER_CAPACITY: usize = 64;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_OBSERVER_CAPACITY)
    }

    /// Create a notifier with a custom per-observer buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                observers: DashMap::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register an observer for one patient's workflow changes.
    ///
    /// The returned subscription owns both the event receiver and the
    /// handle; dropping either the subscription or the handle releases
    /// the observer slot, so a disconnecting client can never leak one.
    pub fn subscribe(&self, patient_id: Uuid) -> WorkflowSubscription {
        let (sender, receiver) = mpsc::channel(self.inner.capacity);
        let observer_id = Uuid::new_v4();

        self.inner
            .observers
            .entry(patient_id)
            .or_default()
            .push(Observer { id: observer_id, sender });

        debug!(%patient_id, %observer_id, "workflow observer subscribed");

        WorkflowSubscription {
            handle: SubscriptionHandle {
                patient_id,
                observer_id,
                inner: Arc::downgrade(&self.inner),
            },
            events: receiver,
        }
    }

    /// Release an observer slot explicitly. Equivalent to dropping the
    /// handle.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        drop(handle);
    }

    /// Deliver an event to every observer of the event's patient.
    ///
    /// Delivery is best-effort and isolated per observer: a full buffer
    /// disconnects that observer, a closed receiver is pruned, and
    /// neither outcome is surfaced to the publisher.
    pub fn publish(&self, event: &WorkflowEvent) {
        let Some(mut entry) = self.inner.observers.get_mut(&event.patient_id) else {
            return;
        };

        let before = entry.len();
        entry.retain(|observer| match observer.sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    patient_id = %event.patient_id,
                    observer_id = %observer.id,
                    "workflow observer buffer full; disconnecting"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    patient_id = %event.patient_id,
                    observer_id = %observer.id,
                    "workflow observer gone; pruning"
                );
                false
            }
        });
        let delivered = entry.len();
        let is_empty = entry.is_empty();
        drop(entry);

        if is_empty {
            self.inner
                .observers
                .remove_if(&event.patient_id, |_, observers| observers.is_empty());
        }

        debug!(
            patient_id = %event.patient_id,
            delivered,
            dropped = before - delivered,
            "workflow event published"
        );
    }

    /// Number of currently-subscribed observers for a patient.
    pub fn observer_count(&self, patient_id: Uuid) -> usize {
        self.inner
            .observers
            .get(&patient_id)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }
}

impl Default for WorkflowNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Ownership token for one observer slot. Dropping it releases the slot.
pub struct SubscriptionHandle {
    patient_id: Uuid,
    observer_id: Uuid,
    inner: Weak<NotifierInner>,
}

impl SubscriptionHandle {
    pub fn patient_id(&self) -> Uuid {
        self.patient_id
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.remove(self.patient_id, self.observer_id);
            debug!(
                patient_id = %self.patient_id,
                observer_id = %self.observer_id,
                "workflow observer unsubscribed"
            );
        }
    }
}

/// A live subscription: the event stream plus its ownership handle.
pub struct WorkflowSubscription {
    handle: SubscriptionHandle,
    events: mpsc::Receiver<WorkflowEvent>,
}

impl WorkflowSubscription {
    /// Receive the next event. Returns `None` once the subscription has
    /// been disconnected (observer overflow, or notifier dropped).
    pub async fn recv(&mut self) -> Option<WorkflowEvent> {
        self.events.recv().await
    }

    /// Non-blocking receive. `None` when no event is buffered.
    pub fn try_recv(&mut self) -> Option<WorkflowEvent> {
        self.events.try_recv().ok()
    }

    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Split off the handle, dropping the event stream. The slot stays
    /// registered until the handle is dropped or passed to
    /// [`WorkflowNotifier::unsubscribe`].
    pub fn into_handle(self) -> SubscriptionHandle {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event_for(patient_id: Uuid) -> WorkflowEvent {
        WorkflowEvent {
            patient_id,
            new_status_id: Uuid::new_v4(),
            previous_status_id: None,
            history_entry_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn delivers_only_to_matching_patient() {
        let notifier = WorkflowNotifier::new();
        let patient_a = Uuid::new_v4();
        let patient_b = Uuid::new_v4();

        let mut sub_a = notifier.subscribe(patient_a);
        let mut sub_b = notifier.subscribe(patient_b);

        let event = event_for(patient_a);
        notifier.publish(&event);

        assert_eq!(sub_a.try_recv(), Some(event));
        assert_eq!(sub_b.try_recv(), None);
    }

    #[tokio::test]
    async fn unsubscribed_observer_receives_nothing() {
        let notifier = WorkflowNotifier::new();
        let patient = Uuid::new_v4();

        let subscription = notifier.subscribe(patient);
        assert_eq!(notifier.observer_count(patient), 1);

        notifier.unsubscribe(subscription.into_handle());
        assert_eq!(notifier.observer_count(patient), 0);

        notifier.publish(&event_for(patient));
    }

    #[tokio::test]
    async fn overflowing_observer_is_disconnected() {
        let notifier = WorkflowNotifier::with_capacity(1);
        let patient = Uuid::new_v4();

        let mut subscription = notifier.subscribe(patient);
        notifier.publish(&event_for(patient));
        // The buffer is full; the next publish disconnects the observer.
        notifier.publish(&event_for(patient));
        assert_eq!(notifier.observer_count(patient), 0);

        // The buffered event is still readable, then the stream ends.
        assert!(subscription.recv().await.is_some());
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropping_subscription_releases_slot() {
        let notifier = WorkflowNotifier::new();
        let patient = Uuid::new_v4();

        let subscription = notifier.subscribe(patient);
        assert_eq!(notifier.observer_count(patient), 1);
        drop(subscription);
        assert_eq!(notifier.observer_count(patient), 0);
    }
}
