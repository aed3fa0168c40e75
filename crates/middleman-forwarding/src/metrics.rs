//! Forwarding counters
//!
//! Lock-free counters updated from both execution contexts. Read them through
//! [`ForwardingMetrics::snapshot`].

use crate::domain::Direction;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe forwarding counters.
#[derive(Debug, Default)]
pub struct ForwardingMetrics {
    /// Envelopes delivered into the inner channel
    pub forwarded_outer_to_inner: AtomicU64,
    /// Envelopes delivered into the outer channel
    pub forwarded_inner_to_outer: AtomicU64,
    /// Envelopes terminated by the classifier
    pub handled_locally: AtomicU64,
    /// Envelopes handled locally and then forwarded
    pub intercepted: AtomicU64,
    /// Forwards dropped because no peer is attached
    pub dropped_unroutable: AtomicU64,
    /// Envelopes refused or dropped after shutdown began
    pub rejected_after_shutdown: AtomicU64,
    pub sync_completed: AtomicU64,
    pub sync_cancelled: AtomicU64,
    /// Failed sends and exchanges on either channel
    pub channel_failures: AtomicU64,
}

impl ForwardingMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_forwarded(&self, direction: Direction) {
        let counter = match direction {
            Direction::OuterToInner => &self.forwarded_outer_to_inner,
            Direction::InnerToOuter => &self.forwarded_inner_to_outer,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handled_locally(&self) {
        self.handled_locally.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_intercepted(&self) {
        self.intercepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unroutable(&self) {
        self.dropped_unroutable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected_after_shutdown.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sync_completed(&self) {
        self.sync_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sync_cancelled(&self) {
        self.sync_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_channel_failure(&self) {
        self.channel_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            forwarded_outer_to_inner: self.forwarded_outer_to_inner.load(Ordering::Relaxed),
            forwarded_inner_to_outer: self.forwarded_inner_to_outer.load(Ordering::Relaxed),
            handled_locally: self.handled_locally.load(Ordering::Relaxed),
            intercepted: self.intercepted.load(Ordering::Relaxed),
            dropped_unroutable: self.dropped_unroutable.load(Ordering::Relaxed),
            rejected_after_shutdown: self.rejected_after_shutdown.load(Ordering::Relaxed),
            sync_completed: self.sync_completed.load(Ordering::Relaxed),
            sync_cancelled: self.sync_cancelled.load(Ordering::Relaxed),
            channel_failures: self.channel_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ForwardingMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub forwarded_outer_to_inner: u64,
    pub forwarded_inner_to_outer: u64,
    pub handled_locally: u64,
    pub intercepted: u64,
    pub dropped_unroutable: u64,
    pub rejected_after_shutdown: u64,
    pub sync_completed: u64,
    pub sync_cancelled: u64,
    pub channel_failures: u64,
}

impl MetricsSnapshot {
    /// Total envelopes delivered to either peer.
    #[must_use]
    pub fn total_forwarded(&self) -> u64 {
        self.forwarded_outer_to_inner + self.forwarded_inner_to_outer
    }
}
