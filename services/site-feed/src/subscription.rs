//! Subscription registry and client handle
//!
//! The registry maps each live subscription to the cancellation token of its
//! tick task. Removing the entry is the one teardown path: whoever removes it
//! cancels the timer and counts the close, and every later attempt finds
//! nothing and returns `false`. Explicit unsubscribe, handle drop, delivery
//! failure and shutdown all go through `release`.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use types::ids::SubscriptionId;

use crate::metrics::FeedMetrics;
use crate::snapshot::RankedSnapshot;

/// Why a subscription was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// Explicit `unsubscribe` call.
    Unsubscribed,
    /// Handle dropped, i.e. the client connection closed.
    ClientGone,
    /// Delivery found the channel closed.
    DeliveryFailed,
    /// Outbound channel full under the disconnect policy.
    Lagging,
    /// Service shutdown.
    Shutdown,
}

/// Tracks live subscriptions and owns their teardown.
pub struct SubscriptionRegistry {
    entries: DashMap<SubscriptionId, CancellationToken>,
    next_id: AtomicU64,
    metrics: Arc<FeedMetrics>,
}

impl SubscriptionRegistry {
    pub fn new(metrics: Arc<FeedMetrics>) -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    /// Register a subscription whose tick task listens on `token`.
    pub fn register(&self, token: CancellationToken) -> SubscriptionId {
        let id = SubscriptionId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.insert(id, token);
        self.metrics.record_subscription_opened();
        debug!(subscription_id = %id, "Subscription registered");
        id
    }

    /// Tear a subscription down. Returns `false` if it was already gone.
    pub fn release(&self, id: SubscriptionId, reason: TeardownReason) -> bool {
        let Some((_, token)) = self.entries.remove(&id) else {
            return false;
        };
        token.cancel();
        self.metrics.record_subscription_closed();

        match reason {
            TeardownReason::DeliveryFailed => {
                self.metrics.record_delivery_failure();
                debug!(subscription_id = %id, "Subscription closed: client channel gone");
            }
            TeardownReason::Lagging => {
                self.metrics.record_lagging_disconnect();
                warn!(subscription_id = %id, "Subscription closed: client lagging");
            }
            _ => debug!(subscription_id = %id, ?reason, "Subscription closed"),
        }
        true
    }

    /// Tear down every live subscription, returning how many were released.
    pub fn release_all(&self, reason: TeardownReason) -> usize {
        let ids: Vec<SubscriptionId> = self.entries.iter().map(|e| *e.key()).collect();
        let released = ids
            .into_iter()
            .filter(|id| self.release(*id, reason))
            .count();
        if released > 0 {
            info!(released, ?reason, "Released all subscriptions");
        }
        released
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All live subscription IDs, sorted.
    pub fn ids(&self) -> Vec<SubscriptionId> {
        let mut ids: Vec<SubscriptionId> = self.entries.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }
}

/// Client side of one subscription.
///
/// Yields snapshots in delivery order and ends once the subscription is torn
/// down and buffered snapshots are drained. Dropping the handle unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::Receiver<RankedSnapshot>,
    registry: Arc<SubscriptionRegistry>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        receiver: mpsc::Receiver<RankedSnapshot>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            id,
            receiver,
            registry,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next snapshot; `None` once the feed has stopped.
    pub async fn recv(&mut self) -> Option<RankedSnapshot> {
        self.receiver.recv().await
    }

    /// Take an already delivered snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<RankedSnapshot> {
        self.receiver.try_recv().ok()
    }

    /// Whether the subscription is still registered.
    pub fn is_active(&self) -> bool {
        self.registry.contains(self.id)
    }

    /// Close the receiving side without releasing the registry entry.
    #[cfg(test)]
    pub(crate) fn close_receiver(&mut self) {
        self.receiver.close();
    }

    /// Explicitly unsubscribe. Equivalent to dropping the handle.
    pub fn unsubscribe(self) -> bool {
        self.registry.release(self.id, TeardownReason::Unsubscribed)
    }
}

impl Stream for Subscription {
    type Item = RankedSnapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.release(self.id, TeardownReason::ClientGone);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (Arc<FeedMetrics>, SubscriptionRegistry) {
        let metrics = Arc::new(FeedMetrics::new());
        (metrics.clone(), SubscriptionRegistry::new(metrics))
    }

    #[test]
    fn test_register_allocates_distinct_ids() {
        let (_, reg) = registry();
        let a = reg.register(CancellationToken::new());
        let b = reg.register(CancellationToken::new());
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.ids(), vec![a, b]);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (metrics, reg) = registry();
        let token = CancellationToken::new();
        let id = reg.register(token.clone());

        assert!(reg.release(id, TeardownReason::Unsubscribed));
        assert!(token.is_cancelled());
        assert!(!reg.release(id, TeardownReason::Unsubscribed));
        assert!(!reg.release(id, TeardownReason::DeliveryFailed));

        assert!(reg.is_empty());
        assert_eq!(metrics.export()["subscriptions_closed"], 1);
        assert_eq!(metrics.export()["delivery_failures"], 0);
    }

    #[test]
    fn test_release_leaves_others_untouched() {
        let (_, reg) = registry();
        let ta = CancellationToken::new();
        let tb = CancellationToken::new();
        let a = reg.register(ta.clone());
        let b = reg.register(tb.clone());

        reg.release(a, TeardownReason::ClientGone);
        assert!(ta.is_cancelled());
        assert!(!tb.is_cancelled());
        assert!(reg.contains(b));
    }

    #[test]
    fn test_release_all() {
        let (metrics, reg) = registry();
        let tokens: Vec<CancellationToken> = (0..5).map(|_| CancellationToken::new()).collect();
        for t in &tokens {
            reg.register(t.clone());
        }

        assert_eq!(reg.release_all(TeardownReason::Shutdown), 5);
        assert!(tokens.iter().all(|t| t.is_cancelled()));
        assert_eq!(reg.release_all(TeardownReason::Shutdown), 0);
        assert_eq!(metrics.export()["subscriptions_closed"], 5);
    }

    #[test]
    fn test_failure_reasons_are_counted() {
        let (metrics, reg) = registry();
        let a = reg.register(CancellationToken::new());
        let b = reg.register(CancellationToken::new());
        reg.release(a, TeardownReason::DeliveryFailed);
        reg.release(b, TeardownReason::Lagging);

        let exported = metrics.export();
        assert_eq!(exported["delivery_failures"], 1);
        assert_eq!(exported["lagging_disconnects"], 1);
    }

    #[test]
    fn test_dropping_handle_releases() {
        let (_, reg) = registry();
        let reg = Arc::new(reg);
        let token = CancellationToken::new();
        let id = reg.register(token.clone());
        let (_tx, rx) = mpsc::channel(1);

        let handle = Subscription::new(id, rx, reg.clone());
        assert!(handle.is_active());
        drop(handle);

        assert!(!reg.contains(id));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_explicit_unsubscribe_then_drop() {
        let (metrics, reg) = registry();
        let reg = Arc::new(reg);
        let id = reg.register(CancellationToken::new());
        let (_tx, rx) = mpsc::channel(1);

        let handle = Subscription::new(id, rx, reg.clone());
        assert!(handle.unsubscribe());
        assert!(!reg.release(id, TeardownReason::Unsubscribed));
        assert_eq!(metrics.export()["subscriptions_closed"], 1);
    }
}
