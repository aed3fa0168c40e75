//! # Ordering and Local Handling
//!
//! - Envelopes forwarded in one direction reach the peer in posting order,
//!   while traffic flows in both directions at once.
//! - A synchronous exchange never overtakes asynchronous envelopes queued
//!   before it in the same direction, even when the receiving context is
//!   blocked in an exchange of its own.
//! - Envelopes the policy terminates locally never reach either peer, and
//!   intercepted ones reach both the local handler and the peer.

#[cfg(test)]
mod tests {
    use crate::support::{echo_next, init_test_logging, no_reply, wait_until, Harness, TIMEOUT};
    use middleman_forwarding::{
        loopback_channel, ActorRegistry, ClassifierPolicy, Delivery, EndpointPair, EndpointParts,
        Envelope, ExecutionContext, ForwardAll, ForwardingMetrics, LocalHandler,
        LocalHandlingError, LoopbackPeer, MessageType, PolicyClassifier, ShutdownCoordinator, Side,
    };
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::thread;

    const PER_DIRECTION: u32 = 200;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<(Side, MessageType)>>,
    }

    impl LocalHandler for RecordingHandler {
        fn handle(&self, side: Side, envelope: &Envelope) -> Result<(), LocalHandlingError> {
            self.seen.lock().push((side, envelope.msg_type()));
            Ok(())
        }
    }

    fn received_types(peer: &LoopbackPeer, count: usize) -> Vec<MessageType> {
        (0..count)
            .map_while(|_| peer.recv_timeout(TIMEOUT))
            .map(|delivered| delivered.envelope.msg_type())
            .collect()
    }

    // =============================================================================
    // FIFO PER DIRECTION
    // =============================================================================

    #[test]
    fn test_fifo_per_direction_under_bidirectional_load() {
        let harness = Arc::new(Harness::start(Arc::new(ForwardAll), no_reply, no_reply));

        let posters: Vec<_> = [(Side::Outer, 1_000), (Side::Inner, 5_000)]
            .into_iter()
            .map(|(side, base)| {
                let harness = Arc::clone(&harness);
                thread::spawn(move || {
                    let outcomes: Vec<_> = (0..PER_DIRECTION)
                        .map(|i| harness.post(side, Envelope::new(base + i, 0, vec![])))
                        .collect();
                    outcomes.iter().all(|outcome| {
                        outcome.wait() == Some(Ok(Delivery::Forwarded { intercepted: false }))
                    })
                })
            })
            .collect();
        for poster in posters {
            assert!(poster.join().unwrap());
        }

        let at_inner = received_types(&harness.inner_peer, PER_DIRECTION as usize);
        let at_outer = received_types(&harness.outer_peer, PER_DIRECTION as usize);
        assert_eq!(at_inner, (1_000..1_000 + PER_DIRECTION).collect::<Vec<_>>());
        assert_eq!(at_outer, (5_000..5_000 + PER_DIRECTION).collect::<Vec<_>>());

        let expected = u64::from(PER_DIRECTION) * 2;
        assert!(wait_until(|| harness.middleman.metrics().total_forwarded() == expected));
        assert_eq!(harness.middleman.metrics().dropped_unroutable, 0);
    }

    // =============================================================================
    // EXCHANGES BEHIND EARLIER FORWARDS
    // =============================================================================

    #[test]
    fn test_exchange_does_not_overtake_queued_forwards() {
        init_test_logging();
        let (primary, primary_queue) = ExecutionContext::new("primary");
        let (forwarding, forwarding_queue) = ExecutionContext::new("forwarding");
        let shutdown = ShutdownCoordinator::new(primary.clone());
        let metrics = Arc::new(ForwardingMetrics::new());
        let (outer_channel, outer_peer) = loopback_channel(echo_next);
        let (inner_channel, inner_peer) = loopback_channel(echo_next);
        let pair = EndpointPair::wire(
            EndpointParts {
                channel: Arc::new(inner_channel),
                context: forwarding.clone(),
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

        // The forwarding thread blocks in an inner call, then keeps driving
        // its context.
        let inner = Arc::clone(&pair.inner);
        let forwarding_thread = thread::spawn(move || {
            let reply = inner.on_inbound(Envelope::call(100, 0, vec![]));
            forwarding_queue.run();
            reply
        });
        assert!(wait_until(|| pair.inner.sync().has_pending()));

        // This thread acts as the primary context.
        for msg_type in 1..=5 {
            assert_eq!(
                pair.outer.on_inbound(Envelope::new(msg_type, 0, vec![])),
                Ok(Delivery::Forwarded { intercepted: false })
            );
        }
        assert_eq!(
            pair.outer.on_inbound(Envelope::sync(6, 0, vec![])),
            Ok(Delivery::Reply(Envelope::new(7, 0, vec![])))
        );
        primary_queue.run_pending();
        forwarding.stop();

        assert_eq!(
            forwarding_thread.join().unwrap(),
            Ok(Delivery::Reply(Envelope::new(101, 0, vec![])))
        );
        assert_eq!(received_types(&inner_peer, 6), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(received_types(&outer_peer, 1), vec![100]);
        assert_eq!(metrics.snapshot().forwarded_outer_to_inner, 5);
    }

    // =============================================================================
    // LOCAL HANDLING ISOLATION
    // =============================================================================

    #[test]
    fn test_local_envelopes_never_reach_a_peer() {
        let handler = Arc::new(RecordingHandler::default());
        let actors = Arc::new(ActorRegistry::new());
        actors.register(77);
        let policy = ClassifierPolicy::new()
            .handle_locally([1])
            .intercept([2])
            .route_by_actor(50..=59);
        let classifier = PolicyClassifier::new(policy, handler.clone(), actors);
        let harness = Harness::start(Arc::new(classifier), no_reply, no_reply);

        let posted = [
            (Envelope::new(1, 0, vec![]), Delivery::HandledLocally),
            (Envelope::new(2, 0, vec![]), Delivery::Forwarded { intercepted: true }),
            (Envelope::new(3, 0, vec![]), Delivery::Forwarded { intercepted: false }),
            (Envelope::new(55, 77, vec![]), Delivery::HandledLocally),
            (Envelope::new(55, 78, vec![]), Delivery::Forwarded { intercepted: false }),
            (
                Envelope::new(4, 0, vec![]).into_local_reply(),
                Delivery::HandledLocally,
            ),
        ];
        for (envelope, expected) in posted {
            assert_eq!(harness.post(Side::Outer, envelope).wait(), Some(Ok(expected)));
        }

        // Policy applies to the outer side only; inner traffic is relayed.
        assert_eq!(
            harness.post(Side::Inner, Envelope::new(1, 0, vec![])).wait(),
            Some(Ok(Delivery::Forwarded { intercepted: false }))
        );

        assert_eq!(received_types(&harness.inner_peer, 3), vec![2, 3, 55]);
        assert_eq!(received_types(&harness.outer_peer, 1), vec![1]);
        assert!(harness.inner_peer.try_recv().is_none());
        assert_eq!(
            *handler.seen.lock(),
            vec![(Side::Outer, 1), (Side::Outer, 2), (Side::Outer, 55), (Side::Outer, 4)]
        );

        let metrics = harness.middleman.metrics();
        assert_eq!(metrics.handled_locally, 3);
        assert_eq!(metrics.intercepted, 1);
    }
}
