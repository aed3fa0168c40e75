//! Test fixtures: a wired middleman whose peers are loopback channels and whose
//! primary context runs on its own named thread.

use middleman_forwarding::{
    loopback_channel, Channel, Classifier, Delivery, Endpoint, Envelope, ExecutionContext,
    ForwardError, ForwardingConfig, LoopbackChannel, LoopbackPeer, Middleman, Side,
};
use middleman_telemetry::{init_logging, TelemetryConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Upper bound for anything a test waits on.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Install the test subscriber once; later calls are no-ops.
pub fn init_test_logging() {
    let _ = init_logging(&TelemetryConfig::for_tests());
}

/// Peer that never answers synchronous exchanges.
pub fn no_reply(_: &Envelope) -> Option<Envelope> {
    None
}

/// Peer that answers with `msg_type + 1`, same destination, same payload.
pub fn echo_next(request: &Envelope) -> Option<Envelope> {
    Some(Envelope::new(
        request.msg_type() + 1,
        request.destination(),
        request.payload().to_vec(),
    ))
}

/// Poll `condition` until it holds or [`TIMEOUT`] passes.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Result of a posted envelope, delivered from the context that handled it.
pub struct Outcome {
    receiver: mpsc::Receiver<Result<Delivery, ForwardError>>,
}

impl Outcome {
    /// `None` if nothing arrived within [`TIMEOUT`].
    pub fn wait(&self) -> Option<Result<Delivery, ForwardError>> {
        self.receiver.recv_timeout(TIMEOUT).ok()
    }
}

/// A started middleman with both peers attached.
pub struct Harness {
    pub middleman: Arc<Middleman>,
    pub outer: Arc<LoopbackChannel>,
    pub outer_peer: LoopbackPeer,
    pub inner: Arc<LoopbackChannel>,
    pub inner_peer: LoopbackPeer,
    teardowns: Arc<AtomicUsize>,
    primary: Option<JoinHandle<()>>,
}

impl Harness {
    pub fn start<O, I>(classifier: Arc<dyn Classifier>, outer_responder: O, inner_responder: I) -> Self
    where
        O: Fn(&Envelope) -> Option<Envelope> + Send + Sync + 'static,
        I: Fn(&Envelope) -> Option<Envelope> + Send + Sync + 'static,
    {
        Self::with_config(ForwardingConfig::default(), classifier, outer_responder, inner_responder)
    }

    pub fn with_config<O, I>(
        config: ForwardingConfig,
        classifier: Arc<dyn Classifier>,
        outer_responder: O,
        inner_responder: I,
    ) -> Self
    where
        O: Fn(&Envelope) -> Option<Envelope> + Send + Sync + 'static,
        I: Fn(&Envelope) -> Option<Envelope> + Send + Sync + 'static,
    {
        init_test_logging();
        let (outer, outer_peer) = loopback_channel(outer_responder);
        let (inner, inner_peer) = loopback_channel(inner_responder);
        let outer = Arc::new(outer);
        let inner = Arc::new(inner);

        let inner_channel: Arc<dyn Channel> = inner.clone();
        let middleman = Middleman::start(config, outer.clone(), move || Ok(inner_channel), classifier)
            .expect("middleman starts");
        let middleman = Arc::new(middleman);

        let teardowns = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&teardowns);
        middleman.shutdown().on_teardown(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let runner = Arc::clone(&middleman);
        let primary = thread::Builder::new()
            .name(middleman.config().primary_context_name.clone())
            .spawn(move || runner.run())
            .expect("primary thread spawns");

        Self {
            middleman,
            outer,
            outer_peer,
            inner,
            inner_peer,
            teardowns,
            primary: Some(primary),
        }
    }

    /// Deliver `envelope` as if it arrived on `side`'s channel.
    pub fn post(&self, side: Side, envelope: Envelope) -> Outcome {
        let (sender, receiver) = mpsc::channel();
        self.middleman
            .post_inbound(side, envelope, move |result| {
                let _ = sender.send(result);
            })
            .expect("context accepts work");
        Outcome { receiver }
    }

    pub fn endpoint(&self, side: Side) -> Arc<Endpoint> {
        Arc::clone(self.middleman.endpoint(side).expect("endpoint is wired"))
    }

    pub fn context(&self, side: Side) -> ExecutionContext {
        self.middleman.context(side).expect("context exists").clone()
    }

    /// Request shutdown, wait for teardown and return how many teardown
    /// sequences ran.
    pub fn finish(mut self) -> usize {
        self.stop();
        self.teardowns.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        self.middleman.request_shutdown();
        if let Some(primary) = self.primary.take() {
            primary.join().expect("primary thread exits cleanly");
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        // A failed assertion may leave the primary thread blocked; only join
        // on the success path.
        if thread::panicking() {
            self.middleman.request_shutdown();
        } else {
            self.stop();
        }
    }
}
