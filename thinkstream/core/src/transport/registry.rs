//! Subscriber Registry - Envelope Fan-Out
//!
//! Every subscriber gets its own bounded queue and delivery never waits on
//! it: a subscriber that stops reading or goes away never keeps the others
//! from receiving an envelope. A full queue loses that envelope for that
//! subscriber only. Each subscriber sees envelopes in receipt order.
//!
//! ```text
//!                    SubscriberRegistry
//!             ┌─────────────────────────────────────┐
//!             │ HashMap<SubscriberId, Sender>       │
//!             │   - wrapped in Arc<RwLock<>>        │
//!             └──────────────┬──────────────────────┘
//!                            │ broadcast(envelope)
//!           ┌────────────────┼─────────────────┐
//!           ▼                ▼                 ▼
//!     Correlator        Status view        Test probe
//!       (sub-1)           (sub-2)            (sub-3)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::envelope::Envelope;

/// Stable identity of one subscriber
///
/// Used to remove the subscriber again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Create a new unique subscriber ID
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiving side of one subscription
///
/// Dropping the subscription detaches it; the registry prunes it on the next
/// broadcast.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Envelope>,
}

impl Subscription {
    /// Identity to pass to `unsubscribe`
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next envelope
    ///
    /// Returns `None` once the subscriber has been removed and its queue is
    /// drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Take the next envelope without waiting
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

/// Outcome of one [`SubscriberRegistry::broadcast`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    /// Subscribers that accepted the envelope
    pub delivered: usize,
    /// Subscribers whose queue was full; they missed this envelope
    pub full: Vec<SubscriberId>,
    /// Subscribers found closed and removed
    pub pruned: Vec<SubscriberId>,
}

/// Registry of envelope subscribers
#[derive(Clone)]
pub struct SubscriberRegistry {
    inner: Arc<RwLock<HashMap<SubscriberId, mpsc::Sender<Envelope>>>>,
    capacity: usize,
}

impl SubscriberRegistry {
    /// Create a new empty registry with the given per-subscriber capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = SubscriberId::next();
        self.inner.write().insert(id, tx);
        tracing::debug!(subscriber = %id, "Subscriber registered");
        Subscription { id, rx }
    }

    /// Remove a subscriber
    ///
    /// Returns true if the subscriber was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.inner.write().remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber = %id, "Subscriber removed");
        }
        removed
    }

    /// Number of registered subscribers
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.read().len()
    }

    /// Check if a subscriber is registered
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.inner.read().contains_key(&id)
    }

    /// Deliver an envelope to every subscriber
    ///
    /// Uses `try_send` so a slow subscriber never stalls the push channel.
    /// Subscribers whose receiving side is gone are pruned.
    pub fn broadcast(&self, envelope: &Envelope) -> BroadcastResult {
        let mut result = BroadcastResult::default();

        {
            let inner = self.inner.read();
            for (id, tx) in inner.iter() {
                match tx.try_send(envelope.clone()) {
                    Ok(()) => result.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            subscriber = %id,
                            kind = %envelope.kind,
                            "Subscriber queue full, envelope dropped for it"
                        );
                        result.full.push(*id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => result.pruned.push(*id),
                }
            }
        }

        if !result.pruned.is_empty() {
            let mut inner = self.inner.write();
            for id in &result.pruned {
                inner.remove(id);
                tracing::debug!(subscriber = %id, "Pruned closed subscriber");
            }
        }

        result
    }

    /// Remove every subscriber, ending their subscriptions
    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_id_display() {
        let id = SubscriberId(42);
        assert_eq!(format!("{id}"), "sub-42");
    }

    #[test]
    fn test_subscriber_id_unique() {
        let id1 = SubscriberId::next();
        let id2 = SubscriberId::next();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_registry_subscribe_unsubscribe() {
        let registry = SubscriberRegistry::new(8);
        let sub = registry.subscribe();

        assert_eq!(registry.count(), 1);
        assert!(registry.contains(sub.id()));

        assert!(registry.unsubscribe(sub.id()));
        assert_eq!(registry.count(), 0);
        assert!(!registry.unsubscribe(sub.id()));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber_in_order() {
        let registry = SubscriberRegistry::new(8);
        let mut first = registry.subscribe();
        let mut second = registry.subscribe();

        assert_eq!(registry.broadcast(&Envelope::thinking("one")).delivered, 2);
        assert_eq!(registry.broadcast(&Envelope::thinking("two")).delivered, 2);

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.recv().await.unwrap().payload, "one");
            assert_eq!(sub.recv().await.unwrap().payload, "two");
        }
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned_without_affecting_others() {
        let registry = SubscriberRegistry::new(8);
        let dropped = registry.subscribe();
        let mut kept = registry.subscribe();
        drop(dropped);

        let result = registry.broadcast(&Envelope::answer("done"));
        assert_eq!(result.delivered, 1);
        assert_eq!(result.pruned.len(), 1);
        assert_eq!(registry.count(), 1);
        assert_eq!(kept.recv().await.unwrap().payload, "done");
    }

    #[tokio::test]
    async fn test_unsubscribed_subscription_ends() {
        let registry = SubscriberRegistry::new(8);
        let mut sub = registry.subscribe();

        let _ = registry.broadcast(&Envelope::status("queued"));
        registry.unsubscribe(sub.id());

        // Buffered envelopes are still drained before the end
        assert_eq!(sub.recv().await.unwrap().payload, "queued");
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stalled_subscriber_does_not_starve_others() {
        let registry = SubscriberRegistry::new(2);
        let stalled = registry.subscribe();
        let mut reader = registry.subscribe();

        let mut received = Vec::new();
        for i in 0..6 {
            let result = registry.broadcast(&Envelope::thinking(format!("step {i}")));
            assert_eq!(result.delivered, if i < 2 { 2 } else { 1 });
            if i >= 2 {
                assert_eq!(result.full, vec![stalled.id()]);
            }
            received.push(reader.recv().await.unwrap().payload);
        }

        assert_eq!(received.len(), 6);
        assert_eq!(received[5], "step 5");
        // A full queue is not a closed one
        assert!(registry.contains(stalled.id()));
    }

    #[tokio::test]
    async fn test_clear_ends_all_subscriptions() {
        let registry = SubscriberRegistry::new(8);
        let mut sub = registry.subscribe();
        registry.clear();

        assert_eq!(registry.count(), 0);
        assert!(sub.recv().await.is_none());
    }
}
