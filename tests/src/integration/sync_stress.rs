//! # Synchronous Exchange Stress
//!
//! - 1000 sequential exchanges with randomized peer latency; a lost wakeup
//!   shows up as a trial that never completes.
//! - Exchanges issued in both directions at once must both finish.
//! - A second exchange on an endpoint that already has one pending is a fault.

#[cfg(test)]
mod tests {
    use crate::support::{echo_next, init_test_logging, wait_until, Harness};
    use middleman_forwarding::{
        loopback_channel, Delivery, EndpointPair, EndpointParts, Envelope, ExecutionContext,
        ForwardAll, ForwardError, ForwardingMetrics, RoutingId, ShutdownCoordinator, ShutdownReason,
        Side, SyncKind,
    };
    use rand::Rng;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tracing::info;

    const TRIALS: u32 = 1_000;
    const CROSSING_ROUNDS: u32 = 200;

    /// Echo after a random delay of up to 50µs.
    fn jittered_echo(request: &Envelope) -> Option<Envelope> {
        let delay = rand::thread_rng().gen_range(0..50);
        thread::sleep(Duration::from_micros(delay));
        echo_next(request)
    }

    // =============================================================================
    // LOST-WAKEUP TRIALS
    // =============================================================================

    #[test]
    fn test_thousand_exchanges_all_complete() {
        let harness = Harness::start(Arc::new(ForwardAll), jittered_echo, jittered_echo);

        for trial in 0..TRIALS {
            let destination = RoutingId::try_from(trial).unwrap();
            let (side, request) = if trial % 2 == 0 {
                (Side::Inner, Envelope::call(100, destination, vec![]))
            } else {
                (Side::Outer, Envelope::sync(200, destination, vec![]))
            };
            let expected = Envelope::new(request.msg_type() + 1, destination, vec![]);

            let outcome = harness.post(side, request).wait();
            assert_eq!(
                outcome,
                Some(Ok(Delivery::Reply(expected))),
                "trial {trial} from {side} did not complete"
            );
            if trial % 250 == 249 {
                info!(completed = trial + 1, "Synchronous trials progressing");
            }
        }

        assert!(!harness.endpoint(Side::Inner).sync().has_pending());
        assert!(!harness.endpoint(Side::Outer).sync().has_pending());
        let metrics = harness.middleman.metrics();
        assert_eq!(metrics.sync_completed, u64::from(TRIALS));
        assert_eq!(metrics.sync_cancelled, 0);
        assert_eq!(harness.outer_peer.drain().len(), TRIALS as usize / 2);
        assert_eq!(harness.inner_peer.drain().len(), TRIALS as usize / 2);
        assert_eq!(harness.finish(), 1);
    }

    // =============================================================================
    // CROSSING EXCHANGES
    // =============================================================================

    #[test]
    fn test_crossing_exchanges_do_not_deadlock() {
        let harness = Harness::start(Arc::new(ForwardAll), jittered_echo, jittered_echo);

        for round in 0..CROSSING_ROUNDS {
            let round = RoutingId::try_from(round).unwrap();
            let from_inner = harness.post(Side::Inner, Envelope::call(10, round, vec![]));
            let from_outer = harness.post(Side::Outer, Envelope::sync(40, round, vec![]));

            assert_eq!(
                from_inner.wait(),
                Some(Ok(Delivery::Reply(Envelope::new(11, round, vec![])))),
                "inner call of round {round}"
            );
            assert_eq!(
                from_outer.wait(),
                Some(Ok(Delivery::Reply(Envelope::new(41, round, vec![])))),
                "outer exchange of round {round}"
            );
        }

        assert_eq!(
            harness.middleman.metrics().sync_completed,
            u64::from(CROSSING_ROUNDS) * 2
        );
        assert!(!harness.middleman.shutdown().is_triggered());
    }

    // =============================================================================
    // OVERLAPPING EXCHANGE ON ONE ENDPOINT
    // =============================================================================

    #[test]
    fn test_overlapping_exchange_is_a_fault() {
        init_test_logging();
        let (primary, _primary_queue) = ExecutionContext::new("primary");
        // Never driven, so the first exchange stays pending.
        let (forwarding, _forwarding_queue) = ExecutionContext::new("forwarding");
        let shutdown = ShutdownCoordinator::new(primary.clone());
        let metrics = Arc::new(ForwardingMetrics::new());

        let (outer_channel, _outer_peer) = loopback_channel(echo_next);
        let (inner_channel, _inner_peer) = loopback_channel(echo_next);
        let pair = EndpointPair::wire(
            EndpointParts {
                channel: Arc::new(inner_channel),
                context: forwarding,
            },
            EndpointParts {
                channel: Arc::new(outer_channel),
                context: primary,
            },
            Arc::new(ForwardAll),
            true,
            &shutdown,
            &metrics,
        );

        let outer = Arc::clone(&pair.outer);
        let first = thread::spawn(move || {
            outer.forward_synchronous(Envelope::sync(1, 0, vec![]), SyncKind::SendWithReply)
        });
        assert!(wait_until(|| pair.outer.sync().has_pending()));

        let second = panic::catch_unwind(AssertUnwindSafe(|| {
            pair.outer
                .forward_synchronous(Envelope::sync(2, 0, vec![]), SyncKind::SendWithReply)
        }));
        assert!(second.is_err());
        assert!(pair.outer.sync().has_pending());

        assert!(shutdown.trigger(ShutdownReason::Requested));
        assert_eq!(first.join().unwrap(), Err(ForwardError::Disconnected));
        assert!(!pair.outer.sync().has_pending());
        assert_eq!(metrics.snapshot().sync_cancelled, 1);
    }
}
