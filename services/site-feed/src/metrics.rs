//! Observability and metrics for the live feed
//!
//! Counters cover subscription lifecycle, delivery outcomes and loading.
//! `active_timers` is the live-timer gauge: it rises when a subscription's
//! tick task is created and falls when that task is gone, so it returns to
//! zero once every client has disconnected.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::repository::LoadReport;

/// Core metrics for the feed service.
pub struct FeedMetrics {
    // Subscription lifecycle
    pub subscriptions_opened: AtomicU64,
    pub subscriptions_closed: AtomicU64,
    pub active_timers: AtomicU64,

    // Delivery
    pub snapshots_delivered: AtomicU64,
    pub ticks_skipped_backpressure: AtomicU64,
    pub lagging_disconnects: AtomicU64,
    pub delivery_failures: AtomicU64,
    pub serialization_failures: AtomicU64,
    pub ranking_ns: Mutex<LatencyTracker>,

    // Loading
    pub records_loaded: AtomicU64,
    pub records_skipped: AtomicU64,
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self {
            subscriptions_opened: AtomicU64::new(0),
            subscriptions_closed: AtomicU64::new(0),
            active_timers: AtomicU64::new(0),
            snapshots_delivered: AtomicU64::new(0),
            ticks_skipped_backpressure: AtomicU64::new(0),
            lagging_disconnects: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            serialization_failures: AtomicU64::new(0),
            ranking_ns: Mutex::new(LatencyTracker::new(1000)),
            records_loaded: AtomicU64::new(0),
            records_skipped: AtomicU64::new(0),
        }
    }

    pub fn record_subscription_opened(&self) {
        self.subscriptions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscription_closed(&self) {
        self.subscriptions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self, ranking_ns: u64) {
        self.snapshots_delivered.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut tracker) = self.ranking_ns.lock() {
            tracker.record(ranking_ns);
        }
    }

    pub fn record_tick_skipped(&self) {
        self.ticks_skipped_backpressure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lagging_disconnect(&self) {
        self.lagging_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_serialization_failure(&self) {
        self.serialization_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load(&self, report: &LoadReport) {
        self.records_loaded.store(report.loaded as u64, Ordering::Relaxed);
        self.records_skipped
            .store(report.skipped.len() as u64, Ordering::Relaxed);
    }

    /// Number of tick tasks currently alive.
    pub fn active_timers(&self) -> u64 {
        self.active_timers.load(Ordering::Acquire)
    }

    /// Export metrics as a BTreeMap for the `/metrics` endpoint.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("subscriptions_opened".to_string(), self.subscriptions_opened.load(Ordering::Relaxed));
        m.insert("subscriptions_closed".to_string(), self.subscriptions_closed.load(Ordering::Relaxed));
        m.insert("active_timers".to_string(), self.active_timers());
        m.insert("snapshots_delivered".to_string(), self.snapshots_delivered.load(Ordering::Relaxed));
        m.insert("ticks_skipped_backpressure".to_string(), self.ticks_skipped_backpressure.load(Ordering::Relaxed));
        m.insert("lagging_disconnects".to_string(), self.lagging_disconnects.load(Ordering::Relaxed));
        m.insert("delivery_failures".to_string(), self.delivery_failures.load(Ordering::Relaxed));
        m.insert("serialization_failures".to_string(), self.serialization_failures.load(Ordering::Relaxed));
        m.insert("records_loaded".to_string(), self.records_loaded.load(Ordering::Relaxed));
        m.insert("records_skipped".to_string(), self.records_skipped.load(Ordering::Relaxed));
        if let Ok(tracker) = self.ranking_ns.lock() {
            if let Some(p50) = tracker.percentile(50) {
                m.insert("ranking_p50_ns".to_string(), p50);
            }
            if let Some(p99) = tracker.percentile(99) {
                m.insert("ranking_p99_ns".to_string(), p99);
            }
        }
        m
    }
}

impl Default for FeedMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds one slot of the live-timer gauge for as long as it exists.
///
/// Created when a subscription is set up and moved into its tick task, so
/// the slot is released whether the task finishes or is dropped unpolled.
pub struct TimerGuard {
    metrics: Arc<FeedMetrics>,
}

impl TimerGuard {
    pub fn acquire(metrics: Arc<FeedMetrics>) -> Self {
        metrics.active_timers.fetch_add(1, Ordering::AcqRel);
        Self { metrics }
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.metrics.active_timers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Rolling window of latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: VecDeque<u64>,
    window: usize,
}

impl LatencyTracker {
    pub fn new(window: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(window),
            window: window.max(1),
        }
    }

    /// Record a sample, evicting the oldest once the window is full.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Nearest-rank percentile (0-100) over the current window.
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let rank = p.min(100) * (sorted.len() - 1) / 100;
        Some(sorted[rank])
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}
