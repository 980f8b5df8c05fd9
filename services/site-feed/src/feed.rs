//! Live ranking feed service
//!
//! Each subscription gets its own Tokio task that wakes on a fixed interval,
//! ranks the current record set, and pushes the snapshot into that
//! subscription's channel. Tasks share nothing but the read-only repository,
//! so a slow or broken client only ever affects its own task.
//!
//! ```text
//!   subscribe() ──► register ──► tick 0 (inline) ──► spawn tick task
//!                                                        │
//!        ┌──────────────── every interval ───────────────┤
//!        ▼                                               │
//!   reserve slot ─► rank top N ─► stamp ─► send          │
//!        │                                               │
//!   full / closed ──► release(id) ──► token cancelled ◄──┘
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use types::errors::FeedError;
use types::ids::SubscriptionId;

use crate::backpressure::{DeliveryOutcome, Outbox};
use crate::clock::{Clock, SystemClock};
use crate::config::FeedConfig;
use crate::metrics::{FeedMetrics, TimerGuard};
use crate::repository::SiteRepository;
use crate::snapshot::{RankedSnapshot, SnapshotBuilder};
use crate::subscription::{Subscription, SubscriptionRegistry, TeardownReason};

const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Shared handle to the feed; clones refer to the same service.
#[derive(Clone)]
pub struct FeedService {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    ctx: TickContext,
    config: FeedConfig,
    shutdown: CancellationToken,
}

impl Drop for FeedInner {
    fn drop(&mut self) {
        // last service handle gone: stop the timers of any remaining clients
        self.shutdown.cancel();
        self.ctx.registry.release_all(TeardownReason::Shutdown);
    }
}

/// Everything a tick needs, cloned into each subscription's task.
#[derive(Clone)]
struct TickContext {
    repository: Arc<dyn SiteRepository>,
    clock: Arc<dyn Clock>,
    registry: Arc<SubscriptionRegistry>,
    metrics: Arc<FeedMetrics>,
}

impl TickContext {
    fn build(&self, builder: &mut SnapshotBuilder) -> RankedSnapshot {
        let records = self.repository.snapshot();
        let started = StdInstant::now();
        let snapshot = builder.build(&records, self.clock.now());
        self.metrics
            .record_delivery(started.elapsed().as_nanos() as u64);
        snapshot
    }

    /// Deliver one tick. Returns `false` once the subscription is torn down.
    fn tick(&self, id: SubscriptionId, outbox: &mut Outbox, builder: &mut SnapshotBuilder) -> bool {
        match outbox.deliver_with(|| self.build(builder)) {
            DeliveryOutcome::Delivered { sequence } => {
                debug!(subscription_id = %id, sequence, "Snapshot delivered");
                true
            }
            DeliveryOutcome::Skipped => {
                self.metrics.record_tick_skipped();
                true
            }
            DeliveryOutcome::Lagging => {
                self.registry.release(id, TeardownReason::Lagging);
                false
            }
            DeliveryOutcome::Closed => {
                self.registry.release(id, TeardownReason::DeliveryFailed);
                false
            }
            DeliveryOutcome::Cancelled => false,
        }
    }
}

impl FeedService {
    /// Create a feed stamping snapshots with the system clock.
    pub fn new(repository: Arc<dyn SiteRepository>, config: FeedConfig) -> Self {
        Self::with_clock(repository, config, Arc::new(SystemClock))
    }

    pub fn with_clock(repository: Arc<dyn SiteRepository>, config: FeedConfig, clock: Arc<dyn Clock>) -> Self {
        let metrics = Arc::new(FeedMetrics::new());
        let registry = Arc::new(SubscriptionRegistry::new(metrics.clone()));
        info!(
            records = repository.len(),
            top_n = config.top_n,
            tick_interval_ms = config.tick_interval.as_millis() as u64,
            "FeedService initialized"
        );

        Self {
            inner: Arc::new(FeedInner {
                ctx: TickContext {
                    repository,
                    clock,
                    registry,
                    metrics,
                },
                config,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Open a subscription.
    ///
    /// The first snapshot is queued before this returns; later ones follow
    /// every `tick_interval`. Must be called within a Tokio runtime.
    pub fn subscribe(&self) -> Result<Subscription, FeedError> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(FeedError::ShuttingDown);
        }

        let token = inner.shutdown.child_token();
        let registry = inner.ctx.registry.clone();
        let id = registry.register(token.clone());

        // shutdown may have swept the registry between the check and register
        if inner.shutdown.is_cancelled() {
            registry.release(id, TeardownReason::Shutdown);
            return Err(FeedError::ShuttingDown);
        }

        let (mut outbox, receiver) = Outbox::channel(
            inner.config.channel_capacity,
            inner.config.drop_policy,
            token.clone(),
        );
        let mut builder = SnapshotBuilder::new(inner.config.top_n);
        let timer = TimerGuard::acquire(inner.ctx.metrics.clone());

        // fresh channel, so tick 0 always has room
        inner.ctx.tick(id, &mut outbox, &mut builder);

        tokio::spawn(run_ticks(
            id,
            inner.ctx.clone(),
            inner.config.tick_interval,
            token,
            outbox,
            builder,
            timer,
        ));

        Ok(Subscription::new(id, receiver, registry))
    }

    /// Tear a subscription down. Idempotent; `false` if already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner
            .ctx
            .registry
            .release(id, TeardownReason::Unsubscribed)
    }

    /// Stop every subscription and refuse new ones.
    pub fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        let released = self.inner.ctx.registry.release_all(TeardownReason::Shutdown);
        info!(released, "FeedService shut down");
    }

    /// Resolves once `shutdown` has been called.
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.ctx.registry.len()
    }

    /// Tick tasks still alive.
    pub fn active_timers(&self) -> u64 {
        self.inner.ctx.metrics.active_timers()
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.inner.ctx.registry.contains(id)
    }

    pub fn metrics(&self) -> Arc<FeedMetrics> {
        self.inner.ctx.metrics.clone()
    }

    pub fn repository(&self) -> Arc<dyn SiteRepository> {
        self.inner.ctx.repository.clone()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.inner.config
    }
}

/// Recurring delivery for one subscription.
async fn run_ticks(
    id: SubscriptionId,
    ctx: TickContext,
    period: Duration,
    token: CancellationToken,
    mut outbox: Outbox,
    mut builder: SnapshotBuilder,
    _timer: TimerGuard,
) {
    // tick 0 already went out in subscribe(); a zero period would panic
    let period = period.max(MIN_TICK_INTERVAL);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if token.is_cancelled() || !ctx.tick(id, &mut outbox, &mut builder) {
            break;
        }
    }

    debug!(subscription_id = %id, delivered = builder.built(), "Tick task stopped");
}
