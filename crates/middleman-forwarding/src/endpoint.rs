//! # Forwarding Endpoint
//!
//! One endpoint per peer channel. Inbound envelopes are classified and either
//! terminated locally or relayed through the opposite endpoint's channel on
//! that channel's execution context.
//!
//! ```text
//!              Endpoint(Outer)                       Endpoint(Inner)
//!  outer ──→ on_inbound ──classify──→ enqueue ──→ inner channel.send ──→ inner
//!  outer ←── outer channel.send ←── enqueue ←──classify── on_inbound ←── inner
//! ```
//!
//! Endpoints never point at each other. Each holds a [`Route`] to the opposite
//! outbox and context, so a wired pair is built in one step and is immutable
//! afterwards. Forwards are queued in the opposite outbox and sent when that
//! context flushes it.

use crate::context::ExecutionContext;
use crate::domain::{contract_violation, Envelope, ForwardError, Side, SyncKind};
use crate::metrics::ForwardingMetrics;
use crate::outbox::Outbox;
use crate::ports::{Channel, Classifier, Disposition};
use crate::shutdown::{ShutdownCoordinator, ShutdownReason};
use crate::sync::SyncCoordinator;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where forwarded traffic goes: the opposite outbox and the context that
/// flushes it.
#[derive(Clone)]
pub(crate) struct Route {
    pub(crate) outbox: Arc<Outbox>,
    pub(crate) context: ExecutionContext,
}

/// How an inbound envelope was dealt with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Terminated in the middleman.
    HandledLocally,
    /// Queued for delivery to the opposite peer.
    Forwarded { intercepted: bool },
    /// Reply to a synchronous envelope, to be returned to the caller.
    Reply(Envelope),
}

/// One side of the middleman.
pub struct Endpoint {
    side: Side,
    /// Traffic bound for this endpoint's own peer.
    outbox: Arc<Outbox>,
    classifier: Arc<dyn Classifier>,
    route: Option<Route>,
    sync: SyncCoordinator,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Arc<ForwardingMetrics>,
}

/// Construction parameters for one side of a wired pair.
pub struct EndpointParts {
    /// Channel connected to this side's peer.
    pub channel: Arc<dyn Channel>,
    /// Context that owns `channel`; inbound traffic for this side runs here.
    pub context: ExecutionContext,
}

/// Both endpoints, wired to each other.
pub struct EndpointPair {
    pub inner: Arc<Endpoint>,
    pub outer: Arc<Endpoint>,
}

impl EndpointPair {
    /// Build both endpoints at once, each routing to the other's channel.
    ///
    /// With `pump_while_waiting`, an endpoint blocked in a synchronous forward
    /// keeps flushing its own channel's outbox, which carries the opposite
    /// endpoint's pending request behind any earlier forwards.
    #[must_use]
    pub fn wire(
        inner: EndpointParts,
        outer: EndpointParts,
        classifier: Arc<dyn Classifier>,
        pump_while_waiting: bool,
        shutdown: &Arc<ShutdownCoordinator>,
        metrics: &Arc<ForwardingMetrics>,
    ) -> Self {
        let inner_outbox = Outbox::new(Side::Inner, inner.channel, shutdown, metrics);
        let outer_outbox = Outbox::new(Side::Outer, outer.channel, shutdown, metrics);
        let to_inner = Route {
            outbox: Arc::clone(&inner_outbox),
            context: inner.context,
        };
        let to_outer = Route {
            outbox: Arc::clone(&outer_outbox),
            context: outer.context,
        };
        let inner = Endpoint::build(
            Side::Inner,
            inner_outbox,
            Arc::clone(&classifier),
            Some(to_outer),
            pump_while_waiting,
            shutdown,
            metrics,
        );
        let outer = Endpoint::build(
            Side::Outer,
            outer_outbox,
            classifier,
            Some(to_inner),
            pump_while_waiting,
            shutdown,
            metrics,
        );
        debug!("Wired inner and outer endpoints");
        Self {
            inner: Arc::new(inner),
            outer: Arc::new(outer),
        }
    }
}

impl Endpoint {
    /// Endpoint with no opposite peer. Forwarding dispositions are dropped and
    /// reported as `Unroutable`.
    #[must_use]
    pub fn unwired(
        side: Side,
        channel: Arc<dyn Channel>,
        classifier: Arc<dyn Classifier>,
        shutdown: &Arc<ShutdownCoordinator>,
        metrics: &Arc<ForwardingMetrics>,
    ) -> Arc<Self> {
        let outbox = Outbox::new(side, channel, shutdown, metrics);
        Arc::new(Self::build(side, outbox, classifier, None, false, shutdown, metrics))
    }

    fn build(
        side: Side,
        outbox: Arc<Outbox>,
        classifier: Arc<dyn Classifier>,
        route: Option<Route>,
        pump: bool,
        shutdown: &Arc<ShutdownCoordinator>,
        metrics: &Arc<ForwardingMetrics>,
    ) -> Self {
        let sync = SyncCoordinator::new(
            side,
            Arc::clone(shutdown.monitor()),
            pump.then(|| Arc::clone(&outbox)),
            Arc::clone(metrics),
        );
        Self {
            side,
            outbox,
            classifier,
            route,
            sync,
            shutdown: Arc::clone(shutdown),
            metrics: Arc::clone(metrics),
        }
    }

    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    #[must_use]
    pub fn channel(&self) -> &Arc<dyn Channel> {
        self.outbox.channel()
    }

    #[must_use]
    pub fn is_wired(&self) -> bool {
        self.route.is_some()
    }

    #[must_use]
    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    /// Handle an envelope that arrived on this endpoint's channel.
    ///
    /// Must run on the context that owns this endpoint's channel. Synchronous
    /// envelopes block until the opposite peer replies.
    ///
    /// # Errors
    ///
    /// - `ShuttingDown` once shutdown has been triggered.
    /// - `Unroutable` if the classifier wants a forward and no peer is attached.
    /// - `Disconnected` if shutdown superseded a synchronous exchange.
    /// - `ContextClosed` if the opposite context no longer accepts work.
    pub fn on_inbound(&self, envelope: Envelope) -> Result<Delivery, ForwardError> {
        if self.shutdown.is_triggered() {
            self.metrics.record_rejected();
            debug!(
                side = %self.side,
                msg_type = envelope.msg_type(),
                "Rejecting inbound envelope during shutdown"
            );
            return Err(ForwardError::ShuttingDown);
        }

        if let Some(kind) = envelope.sync_kind() {
            return self.forward_synchronous(envelope, kind).map(Delivery::Reply);
        }

        // The classifier may consume the envelope's meaning; the forward uses
        // an untouched copy.
        let forwarded = envelope.clone();
        let disposition = self.classifier.classify(self.side, &envelope);
        debug!(
            side = %self.side,
            msg_type = envelope.msg_type(),
            destination = envelope.destination(),
            disposition = ?disposition,
            "Classified inbound envelope"
        );

        if !disposition.forwards() {
            self.metrics.record_handled_locally();
            return Ok(Delivery::HandledLocally);
        }
        let intercepted = disposition == Disposition::InterceptThenForward;
        if intercepted {
            self.metrics.record_intercepted();
        }

        let Some(route) = &self.route else {
            self.metrics.record_unroutable();
            let err = ForwardError::Unroutable {
                side: self.side,
                msg_type: envelope.msg_type(),
                destination: envelope.destination(),
            };
            warn!(error = %err, "Dropping unroutable envelope");
            return Err(err);
        };

        self.post_forward(route, forwarded)?;
        Ok(Delivery::Forwarded { intercepted })
    }

    /// Relay a synchronous envelope to the opposite peer and wait for its reply.
    ///
    /// Panics if this endpoint is unwired or already has an exchange pending.
    ///
    /// # Errors
    ///
    /// See [`Endpoint::on_inbound`].
    pub fn forward_synchronous(
        &self,
        request: Envelope,
        kind: SyncKind,
    ) -> Result<Envelope, ForwardError> {
        let Some(route) = &self.route else {
            contract_violation(format_args!(
                "synchronous message {} arrived on unwired {} endpoint",
                request.msg_type(),
                self.side
            ));
        };
        self.sync.forward_synchronous(request, kind, route)
    }

    /// Send everything queued for this endpoint's peer, in order, including
    /// the opposite endpoint's pending request. Returns whether anything was
    /// sent.
    ///
    /// Must run on the context that owns this endpoint's channel.
    pub fn flush_outbound(&self) -> bool {
        self.outbox.flush()
    }

    /// The transport reports this endpoint's channel closed.
    pub fn on_channel_close(&self) {
        self.shutdown
            .trigger(ShutdownReason::ChannelClosed { side: self.side });
    }

    /// The transport reports an error on this endpoint's channel.
    pub fn on_channel_error(&self) {
        self.shutdown
            .trigger(ShutdownReason::ChannelError { side: self.side });
    }

    fn post_forward(&self, route: &Route, envelope: Envelope) -> Result<(), ForwardError> {
        let msg_type = envelope.msg_type();
        if !route.outbox.push(envelope) {
            self.metrics.record_rejected();
            debug!(to = %route.outbox.side(), msg_type, "Dropping forward after shutdown");
            return Err(ForwardError::ShuttingDown);
        }
        let outbox = Arc::clone(&route.outbox);
        route.context.enqueue(move || {
            outbox.flush();
        })
    }
}
