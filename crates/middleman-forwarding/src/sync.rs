//! # Sync Coordinator
//!
//! Bridges a synchronous exchange from the context that received it to the
//! opposite context that owns the peer channel.
//!
//! ```text
//!  issuing context (side X)                 opposite context
//!  ────────────────────────                 ────────────────
//!  install slot[X] {request}
//!  queue exchange in outbox[!X] ──enqueue──→ flush outbox[!X] in order
//!  announce in-flight                        channel.call / send_with_reply
//!  wait until slot[X].reply     ←─notify──── record reply into slot[X]
//!  clear slot[X], return reply
//! ```
//!
//! ## Invariants
//!
//! - At most one pending exchange per side. A second one is a contract
//!   violation and panics.
//! - Everything bound for one peer, asynchronous or not, leaves through that
//!   peer's outbox in the order it was queued.
//! - Every wait re-checks its predicate after waking.
//! - A waiter is released only by a recorded reply or by shutdown, which
//!   records the `Disconnected` sentinel.
//!
//! While blocked, a context may still flush the outbox of its own channel, so
//! crossing or nested exchanges never wait on each other.

use crate::domain::{contract_violation, Envelope, ForwardError, Side, SyncKind};
use crate::endpoint::Route;
use crate::metrics::ForwardingMetrics;
use crate::outbox::Outbox;
use crate::shutdown::ShutdownState;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Terminal result of a pending exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SyncOutcome {
    Reply(Envelope),
    /// Sentinel recorded by shutdown.
    Disconnected,
}

/// The single outstanding synchronous exchange of one endpoint.
#[derive(Debug)]
struct PendingSyncCall {
    id: u64,
    /// Taken when the exchange leaves the opposite outbox.
    request: Option<Envelope>,
    kind: SyncKind,
    reply: Option<SyncOutcome>,
}

/// Queued traffic toward one peer.
#[derive(Debug)]
enum Queued {
    Forward(Envelope),
    /// The pending exchange `id` of endpoint `origin`.
    Exchange { origin: Side, id: u64 },
}

/// Next item to put on a peer channel, popped from its outbox.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outbound {
    Forward(Envelope),
    Exchange {
        origin: Side,
        id: u64,
        request: Envelope,
        kind: SyncKind,
    },
}

#[derive(Debug)]
struct MonitorState {
    slots: [Option<PendingSyncCall>; 2],
    /// Indexed by the side of the peer the traffic is bound for.
    outboxes: [VecDeque<Queued>; 2],
    phase: ShutdownState,
    in_flight_epoch: u64,
    next_exchange: u64,
}

/// Lock and condition shared by both endpoints and the shutdown coordinator.
#[derive(Debug)]
pub(crate) struct Monitor {
    state: Mutex<MonitorState>,
    condvar: Condvar,
}

impl Monitor {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(MonitorState {
                slots: [None, None],
                outboxes: [VecDeque::new(), VecDeque::new()],
                phase: ShutdownState::Running,
                in_flight_epoch: 0,
                next_exchange: 1,
            }),
            condvar: Condvar::new(),
        }
    }

    pub(crate) fn phase(&self) -> ShutdownState {
        self.state.lock().phase
    }

    pub(crate) fn has_pending(&self, side: Side) -> bool {
        self.state.lock().slots[side.index()].is_some()
    }

    /// Install the exchange for `side` and queue it toward the opposite peer.
    pub(crate) fn begin(
        &self,
        side: Side,
        request: Envelope,
        kind: SyncKind,
    ) -> Result<u64, ForwardError> {
        let mut state = self.state.lock();
        if state.phase == ShutdownState::ShuttingDown {
            return Err(ForwardError::ShuttingDown);
        }
        if let Some(existing) = state.slots[side.index()].as_ref().map(|pending| pending.id) {
            drop(state);
            contract_violation(format_args!(
                "second synchronous forward on {side} endpoint while exchange {existing} is pending"
            ));
        }
        let id = state.next_exchange;
        state.next_exchange += 1;
        state.slots[side.index()] = Some(PendingSyncCall {
            id,
            request: Some(request),
            kind,
            reply: None,
        });
        state.outboxes[side.opposite().index()].push_back(Queued::Exchange { origin: side, id });
        Ok(id)
    }

    /// Remove a slot whose exchange could not be dispatched. Its queued entry
    /// is skipped when the outbox reaches it.
    fn abandon(&self, side: Side, id: u64) {
        let mut state = self.state.lock();
        if matches!(&state.slots[side.index()], Some(pending) if pending.id == id) {
            state.slots[side.index()] = None;
        }
    }

    /// Queue an asynchronous forward toward `target`. Returns `false` once
    /// shutdown has begun.
    pub(crate) fn push_forward(&self, target: Side, envelope: Envelope) -> bool {
        let mut state = self.state.lock();
        if state.phase == ShutdownState::ShuttingDown {
            return false;
        }
        state.outboxes[target.index()].push_back(Queued::Forward(envelope));
        true
    }

    /// Pop the oldest item bound for `target`. `None` when empty or shutting down.
    pub(crate) fn next_outbound(&self, target: Side) -> Option<Outbound> {
        let mut state = self.state.lock();
        if state.phase == ShutdownState::ShuttingDown {
            return None;
        }
        loop {
            match state.outboxes[target.index()].pop_front()? {
                Queued::Forward(envelope) => return Some(Outbound::Forward(envelope)),
                Queued::Exchange { origin, id } => {
                    let taken = match state.slots[origin.index()].as_mut() {
                        Some(pending) if pending.id == id => pending
                            .request
                            .take()
                            .map(|request| (request, pending.kind)),
                        _ => None,
                    };
                    match taken {
                        Some((request, kind)) => {
                            return Some(Outbound::Exchange {
                                origin,
                                id,
                                request,
                                kind,
                            })
                        }
                        None => debug!(side = %origin, exchange = id, "Skipping abandoned exchange"),
                    }
                }
            }
        }
    }

    pub(crate) fn record(&self, side: Side, id: u64, outcome: SyncOutcome) {
        let mut state = self.state.lock();
        match state.slots[side.index()].as_mut() {
            Some(pending) if pending.id == id && pending.reply.is_none() => {
                pending.reply = Some(outcome);
                self.condvar.notify_all();
            }
            _ => debug!(side = %side, exchange = id, "Discarding reply for superseded exchange"),
        }
    }

    /// Wake every waiter so a blocked context notices newly queued work.
    fn announce_in_flight(&self) {
        let mut state = self.state.lock();
        state.in_flight_epoch = state.in_flight_epoch.wrapping_add(1);
        self.condvar.notify_all();
    }

    /// Block until exchange `id` on `side` has an outcome.
    ///
    /// `pump` is run unlocked whenever the waiter wakes without an outcome;
    /// it returns whether it made progress.
    fn wait(&self, side: Side, id: u64, pump: Option<&dyn Fn() -> bool>) -> SyncOutcome {
        let mut state = self.state.lock();
        loop {
            if Self::is_ready(&state, side, id) {
                if let Some(outcome) = state.slots[side.index()].take().and_then(|pending| pending.reply) {
                    return outcome;
                }
            }

            if let Some(pump) = pump {
                let epoch = state.in_flight_epoch;
                let progressed = MutexGuard::unlocked(&mut state, pump);
                // Anything recorded or announced while unlocked must be seen
                // before sleeping.
                if progressed || state.in_flight_epoch != epoch || Self::is_ready(&state, side, id) {
                    continue;
                }
            }
            self.condvar.wait(&mut state);
        }
    }

    fn is_ready(state: &MonitorState, side: Side, id: u64) -> bool {
        match &state.slots[side.index()] {
            Some(pending) if pending.id == id => pending.reply.is_some(),
            _ => contract_violation(format_args!(
                "pending exchange {id} on {side} endpoint vanished while waiting"
            )),
        }
    }

    /// Enter `ShuttingDown`, drop queued traffic and release every waiter with
    /// the sentinel.
    ///
    /// Returns the number of released exchanges, or `None` if shutdown had
    /// already been entered.
    pub(crate) fn enter_shutdown(&self) -> Option<usize> {
        let mut state = self.state.lock();
        if state.phase == ShutdownState::ShuttingDown {
            return None;
        }
        state.phase = ShutdownState::ShuttingDown;
        let dropped: usize = state.outboxes.iter().map(VecDeque::len).sum();
        for outbox in &mut state.outboxes {
            outbox.clear();
        }
        let mut released = 0;
        for pending in state.slots.iter_mut().flatten() {
            if pending.reply.is_none() {
                pending.request = None;
                pending.reply = Some(SyncOutcome::Disconnected);
                released += 1;
            }
        }
        self.condvar.notify_all();
        if dropped > 0 {
            debug!(dropped, "Dropped queued traffic on shutdown");
        }
        Some(released)
    }
}

/// Per-endpoint view of the monitor: owns the endpoint's pending slot.
#[derive(Clone)]
pub struct SyncCoordinator {
    side: Side,
    monitor: Arc<Monitor>,
    /// Outbox of this endpoint's own channel, flushed while waiting. `None`
    /// disables pumping.
    pump: Option<Arc<Outbox>>,
    metrics: Arc<ForwardingMetrics>,
}

impl SyncCoordinator {
    pub(crate) fn new(
        side: Side,
        monitor: Arc<Monitor>,
        pump: Option<Arc<Outbox>>,
        metrics: Arc<ForwardingMetrics>,
    ) -> Self {
        Self {
            side,
            monitor,
            pump,
            metrics,
        }
    }

    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Whether an exchange is outstanding on this endpoint.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.monitor.has_pending(self.side)
    }

    /// Forward `request` over `route` and block until the reply arrives.
    ///
    /// # Errors
    ///
    /// - `ForwardError::ShuttingDown` if shutdown was already triggered.
    /// - `ForwardError::Disconnected` if shutdown superseded the exchange.
    /// - `ForwardError::ContextClosed` if the opposite context is gone.
    pub(crate) fn forward_synchronous(
        &self,
        request: Envelope,
        kind: SyncKind,
        route: &Route,
    ) -> Result<Envelope, ForwardError> {
        let msg_type = request.msg_type();
        let id = self.monitor.begin(self.side, request, kind)?;
        debug!(
            side = %self.side,
            exchange = id,
            msg_type,
            kind = ?kind,
            "Forwarding synchronous message"
        );

        let outbox = Arc::clone(&route.outbox);
        if let Err(err) = route.context.enqueue(move || {
            outbox.flush();
        }) {
            self.monitor.abandon(self.side, id);
            return Err(err);
        }
        self.monitor.announce_in_flight();

        let pump = self.pump.as_ref().map(|own| {
            let own = Arc::clone(own);
            move || own.flush()
        });
        let pump = pump.as_ref().map(|pump| pump as &dyn Fn() -> bool);

        match self.monitor.wait(self.side, id, pump) {
            SyncOutcome::Reply(reply) => {
                self.metrics.record_sync_completed();
                debug!(side = %self.side, exchange = id, "Synchronous forward done");
                Ok(reply)
            }
            SyncOutcome::Disconnected => {
                self.metrics.record_sync_cancelled();
                debug!(side = %self.side, exchange = id, "Synchronous forward cancelled by shutdown");
                Err(ForwardError::Disconnected)
            }
        }
    }
}
