//! # Outbox
//!
//! Single FIFO of traffic bound for one peer channel. Asynchronous forwards
//! and synchronous exchanges share it, so whichever code path drains it (the
//! context's own task, or a blocked context pumping) sends in queue order.
//!
//! Only the context that owns the channel may call [`Outbox::flush`].

use crate::domain::{Envelope, Side, SyncKind};
use crate::metrics::ForwardingMetrics;
use crate::ports::Channel;
use crate::shutdown::{ShutdownCoordinator, ShutdownReason};
use crate::sync::{Monitor, Outbound, SyncOutcome};
use std::sync::Arc;
use tracing::error;

pub(crate) struct Outbox {
    target: Side,
    channel: Arc<dyn Channel>,
    monitor: Arc<Monitor>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Arc<ForwardingMetrics>,
}

impl Outbox {
    pub(crate) fn new(
        target: Side,
        channel: Arc<dyn Channel>,
        shutdown: &Arc<ShutdownCoordinator>,
        metrics: &Arc<ForwardingMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            target,
            channel,
            monitor: Arc::clone(shutdown.monitor()),
            shutdown: Arc::clone(shutdown),
            metrics: Arc::clone(metrics),
        })
    }

    pub(crate) fn side(&self) -> Side {
        self.target
    }

    pub(crate) fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Queue an asynchronous forward. `false` once shutdown has begun.
    pub(crate) fn push(&self, envelope: Envelope) -> bool {
        self.monitor.push_forward(self.target, envelope)
    }

    /// Send everything queued so far, oldest first. Returns whether anything
    /// was sent.
    pub(crate) fn flush(&self) -> bool {
        let mut sent = false;
        while let Some(item) = self.monitor.next_outbound(self.target) {
            sent = true;
            match item {
                Outbound::Forward(envelope) => self.send(envelope),
                Outbound::Exchange {
                    origin,
                    id,
                    request,
                    kind,
                } => self.exchange(origin, id, request, kind),
            }
        }
        sent
    }

    fn send(&self, envelope: Envelope) {
        let msg_type = envelope.msg_type();
        match self.channel.send(envelope) {
            Ok(()) => self
                .metrics
                .record_forwarded(self.target.opposite().inbound_direction()),
            Err(error) => {
                self.metrics.record_channel_failure();
                match self.target {
                    Side::Inner => {
                        error!(to = %self.target, msg_type, error = %error, "Forwarding into inner channel failed");
                        self.shutdown.trigger(ShutdownReason::SendFailed {
                            side: self.target,
                            error,
                        });
                    }
                    // The outer transport reports its own failure through
                    // on_channel_error.
                    Side::Outer => {
                        error!(to = %self.target, msg_type, error = %error, "Forwarding into outer channel failed");
                    }
                }
            }
        }
    }

    fn exchange(&self, origin: Side, id: u64, request: Envelope, kind: SyncKind) {
        let result = match kind {
            SyncKind::SendWithReply => self.channel.send_with_reply(request),
            SyncKind::Call => self.channel.call(request),
        };
        match result {
            Ok(reply) => self.monitor.record(origin, id, SyncOutcome::Reply(reply)),
            Err(error) => {
                self.metrics.record_channel_failure();
                error!(to = %self.target, exchange = id, error = %error, "Synchronous exchange failed");
                self.shutdown.trigger(ShutdownReason::SendFailed {
                    side: self.target,
                    error,
                });
            }
        }
    }
}
