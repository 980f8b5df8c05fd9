//! Backpressure and flow control for per-subscription delivery
//!
//! Every subscription owns a bounded outbound channel. Delivery never waits
//! on the consumer: the tick task reserves a slot first and only computes a
//! snapshot when one is free. Since each snapshot fully replaces the
//! previous view, a lagging consumer loses nothing by missing a tick.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::snapshot::RankedSnapshot;

/// What to do when a subscription's outbound channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Skip this tick; the consumer receives the next one it has room for.
    #[default]
    SkipTick,
    /// Tear the lagging subscription down.
    Disconnect,
}

/// Result of attempting one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Snapshot queued for the consumer.
    Delivered { sequence: u64 },
    /// Channel full; tick skipped under `DropPolicy::SkipTick`.
    Skipped,
    /// Channel full under `DropPolicy::Disconnect`.
    Lagging,
    /// Consumer went away.
    Closed,
    /// Subscription torn down while the slot was held; nothing was sent.
    Cancelled,
}

/// Sending half of one subscription's outbound channel.
#[derive(Debug)]
pub struct Outbox {
    sender: mpsc::Sender<RankedSnapshot>,
    drop_policy: DropPolicy,
    cancel: CancellationToken,
    ticks_skipped: u64,
}

impl Outbox {
    /// Create the outbox and the receiver handed to the consumer.
    ///
    /// Capacity is clamped to at least one so the connect-time snapshot
    /// always fits. Once `cancel` fires nothing more is sent.
    pub fn channel(
        capacity: usize,
        drop_policy: DropPolicy,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<RankedSnapshot>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                drop_policy,
                cancel,
                ticks_skipped: 0,
            },
            receiver,
        )
    }

    /// Deliver a snapshot produced by `build`, which only runs if a slot
    /// is available.
    pub fn deliver_with<F>(&mut self, build: F) -> DeliveryOutcome
    where
        F: FnOnce() -> RankedSnapshot,
    {
        match self.sender.try_reserve() {
            Ok(permit) => {
                let snapshot = build();
                // teardown may have started while ranking
                if self.cancel.is_cancelled() {
                    return DeliveryOutcome::Cancelled;
                }
                let sequence = snapshot.sequence;
                permit.send(snapshot);
                DeliveryOutcome::Delivered { sequence }
            }
            Err(TrySendError::Full(())) => {
                self.ticks_skipped += 1;
                debug!(
                    ticks_skipped = self.ticks_skipped,
                    policy = ?self.drop_policy,
                    "Outbound channel full"
                );
                match self.drop_policy {
                    DropPolicy::SkipTick => DeliveryOutcome::Skipped,
                    DropPolicy::Disconnect => DeliveryOutcome::Lagging,
                }
            }
            Err(TrySendError::Closed(())) => DeliveryOutcome::Closed,
        }
    }

    /// Ticks dropped because the consumer had no room.
    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped
    }

    /// Whether the consumer has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotBuilder;
    use chrono::Utc;

    fn build(builder: &mut SnapshotBuilder) -> RankedSnapshot {
        builder.build(&[], Utc::now())
    }

    #[test]
    fn test_deliver_in_order() {
        let (mut outbox, mut rx) = Outbox::channel(4, DropPolicy::SkipTick, CancellationToken::new());
        let mut builder = SnapshotBuilder::new(30);

        assert_eq!(
            outbox.deliver_with(|| build(&mut builder)),
            DeliveryOutcome::Delivered { sequence: 0 }
        );
        assert_eq!(
            outbox.deliver_with(|| build(&mut builder)),
            DeliveryOutcome::Delivered { sequence: 1 }
        );

        assert_eq!(rx.try_recv().unwrap().sequence, 0);
        assert_eq!(rx.try_recv().unwrap().sequence, 1);
    }

    #[test]
    fn test_full_channel_skips_without_building() {
        let (mut outbox, _rx) = Outbox::channel(1, DropPolicy::SkipTick, CancellationToken::new());
        let mut builder = SnapshotBuilder::new(30);

        outbox.deliver_with(|| build(&mut builder));
        let mut built = false;
        let outcome = outbox.deliver_with(|| {
            built = true;
            build(&mut builder)
        });

        assert_eq!(outcome, DeliveryOutcome::Skipped);
        assert!(!built);
        assert_eq!(outbox.ticks_skipped(), 1);
        assert_eq!(builder.built(), 1);
    }

    #[test]
    fn test_full_channel_disconnect_policy() {
        let (mut outbox, _rx) = Outbox::channel(1, DropPolicy::Disconnect, CancellationToken::new());
        let mut builder = SnapshotBuilder::new(30);

        outbox.deliver_with(|| build(&mut builder));
        assert_eq!(
            outbox.deliver_with(|| build(&mut builder)),
            DeliveryOutcome::Lagging
        );
    }

    #[test]
    fn test_closed_receiver() {
        let (mut outbox, rx) = Outbox::channel(4, DropPolicy::SkipTick, CancellationToken::new());
        drop(rx);
        let mut builder = SnapshotBuilder::new(30);

        assert!(outbox.is_closed());
        assert_eq!(
            outbox.deliver_with(|| build(&mut builder)),
            DeliveryOutcome::Closed
        );
    }

    #[test]
    fn test_cancelled_outbox_sends_nothing() {
        let cancel = CancellationToken::new();
        let (mut outbox, mut rx) = Outbox::channel(4, DropPolicy::SkipTick, cancel.clone());
        let mut builder = SnapshotBuilder::new(30);
        outbox.deliver_with(|| build(&mut builder));

        // cancelled after the slot was reserved
        let outcome = outbox.deliver_with(|| {
            cancel.cancel();
            build(&mut builder)
        });

        assert_eq!(outcome, DeliveryOutcome::Cancelled);
        assert_eq!(rx.try_recv().unwrap().sequence, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (mut outbox, mut rx) = Outbox::channel(0, DropPolicy::SkipTick, CancellationToken::new());
        let mut builder = SnapshotBuilder::new(30);
        assert!(matches!(
            outbox.deliver_with(|| build(&mut builder)),
            DeliveryOutcome::Delivered { .. }
        ));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_consumer_catches_up_after_skip() {
        let (mut outbox, mut rx) = Outbox::channel(1, DropPolicy::SkipTick, CancellationToken::new());
        let mut builder = SnapshotBuilder::new(30);

        outbox.deliver_with(|| build(&mut builder));
        outbox.deliver_with(|| build(&mut builder));
        assert_eq!(rx.try_recv().unwrap().sequence, 0);

        assert_eq!(
            outbox.deliver_with(|| build(&mut builder)),
            DeliveryOutcome::Delivered { sequence: 1 }
        );
    }
}
