//! # Middleman Service
//!
//! Owns both execution contexts, the endpoint pair and the shutdown
//! coordinator. This is the explicit context object passed to every entry
//! point; there is no process-global state.
//!
//! ## Startup Sequence
//!
//! 1. Create the primary context (driven later by [`Middleman::run`])
//! 2. Spawn the forwarding context thread
//! 3. Open the inner channel on that thread
//! 4. Wait, bounded by `startup_timeout_ms`, for the thread's handshake
//! 5. Wire the endpoint pair in one step
//!
//! ```text
//!   outer process                 middleman                      inner process
//!  ┌────────────┐   outer   ┌──────────────────────┐   inner   ┌────────────┐
//!  │            │ ◄───────► │ primary  │ forwarding │ ◄───────► │            │
//!  └────────────┘           └──────────────────────┘           └────────────┘
//! ```

use crate::config::ForwardingConfig;
use crate::context::{ExecutionContext, RunQueue};
use crate::domain::{ChannelError, Envelope, ForwardError, MiddlemanError, Side};
use crate::endpoint::{Delivery, Endpoint, EndpointPair, EndpointParts};
use crate::metrics::{ForwardingMetrics, MetricsSnapshot};
use crate::ports::{Channel, Classifier};
use crate::shutdown::{ShutdownCoordinator, ShutdownReason};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info};

type ConnectResult = Result<Arc<dyn Channel>, ChannelError>;

/// One-shot rendezvous between `start` and the forwarding thread.
#[derive(Default)]
struct Handshake {
    result: Mutex<Option<ConnectResult>>,
    opened: Condvar,
}

impl Handshake {
    fn complete(&self, result: ConnectResult) {
        *self.result.lock() = Some(result);
        self.opened.notify_all();
    }

    fn wait(&self, timeout: Duration) -> Option<ConnectResult> {
        let deadline = Instant::now() + timeout;
        let mut result = self.result.lock();
        while result.is_none() {
            if self.opened.wait_until(&mut result, deadline).timed_out() {
                break;
            }
        }
        result.take()
    }
}

/// The forwarding middleman between an outer and an inner peer.
pub struct Middleman {
    config: ForwardingConfig,
    outer: Arc<Endpoint>,
    inner: Option<Arc<Endpoint>>,
    primary: ExecutionContext,
    primary_queue: Arc<RunQueue>,
    forwarding: Option<ExecutionContext>,
    forwarding_thread: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Arc<ForwardingMetrics>,
}

impl Middleman {
    /// Middleman with only the outer peer attached.
    ///
    /// Every forwarding disposition is reported as `Unroutable`.
    #[must_use]
    pub fn standalone(
        config: ForwardingConfig,
        outer_channel: Arc<dyn Channel>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        let (primary, primary_queue) = ExecutionContext::new(config.primary_context_name.clone());
        let metrics = Arc::new(ForwardingMetrics::new());
        let shutdown = ShutdownCoordinator::new(primary.clone());
        let outer = Endpoint::unwired(Side::Outer, outer_channel, classifier, &shutdown, &metrics);
        info!(context = %primary.name(), "Middleman started without inner peer");
        Self {
            config,
            outer,
            inner: None,
            primary,
            primary_queue,
            forwarding: None,
            forwarding_thread: Mutex::new(None),
            shutdown,
            metrics,
        }
    }

    /// Spawn the forwarding context, open the inner channel on it and wire
    /// both endpoints.
    ///
    /// # Errors
    ///
    /// - `MiddlemanError::Spawn` if the forwarding thread cannot be created.
    /// - `MiddlemanError::Connect` if `connect_inner` fails.
    /// - `MiddlemanError::StartupTimeout` if the handshake does not finish in time.
    pub fn start<F>(
        config: ForwardingConfig,
        outer_channel: Arc<dyn Channel>,
        connect_inner: F,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self, MiddlemanError>
    where
        F: FnOnce() -> Result<Arc<dyn Channel>, ChannelError> + Send + 'static,
    {
        let (primary, primary_queue) = ExecutionContext::new(config.primary_context_name.clone());
        let (forwarding, forwarding_queue) =
            ExecutionContext::new(config.forwarding_context_name.clone());
        let metrics = Arc::new(ForwardingMetrics::new());
        let shutdown = ShutdownCoordinator::new(primary.clone());

        let handshake = Arc::new(Handshake::default());
        let thread_handshake = Arc::clone(&handshake);
        let thread_queue = Arc::clone(&forwarding_queue);
        let thread_shutdown = Arc::clone(&shutdown);
        let name = config.forwarding_context_name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let opened = connect_inner();
                let connected = opened.is_ok();
                thread_handshake.complete(opened);
                if connected {
                    run_escalating(&thread_queue, &thread_shutdown);
                }
            })
            .map_err(|source| MiddlemanError::Spawn { name, source })?;

        let inner_channel = match handshake.wait(config.startup_timeout()) {
            Some(Ok(channel)) => channel,
            Some(Err(err)) => {
                error!(error = %err, "Failed to open inner channel");
                if handle.join().is_err() {
                    error!("Forwarding context panicked during startup");
                }
                return Err(MiddlemanError::Connect(err));
            }
            None => {
                error!(timeout_ms = config.startup_timeout_ms, "Forwarding context startup timed out");
                forwarding.stop();
                return Err(MiddlemanError::StartupTimeout(config.startup_timeout_ms));
            }
        };

        shutdown.register_context(forwarding.clone());

        let pair = EndpointPair::wire(
            EndpointParts {
                channel: inner_channel,
                context: forwarding.clone(),
            },
            EndpointParts {
                channel: outer_channel,
                context: primary.clone(),
            },
            classifier,
            config.pump_while_waiting,
            &shutdown,
            &metrics,
        );
        info!(
            primary = %primary.name(),
            forwarding = %forwarding.name(),
            "Middleman started"
        );

        Ok(Self {
            config,
            outer: pair.outer,
            inner: Some(pair.inner),
            primary,
            primary_queue,
            forwarding: Some(forwarding),
            forwarding_thread: Mutex::new(Some(handle)),
            shutdown,
            metrics,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ForwardingConfig {
        &self.config
    }

    #[must_use]
    pub fn outer(&self) -> &Arc<Endpoint> {
        &self.outer
    }

    /// `None` when running standalone.
    #[must_use]
    pub fn inner(&self) -> Option<&Arc<Endpoint>> {
        self.inner.as_ref()
    }

    #[must_use]
    pub fn endpoint(&self, side: Side) -> Option<&Arc<Endpoint>> {
        match side {
            Side::Outer => Some(&self.outer),
            Side::Inner => self.inner.as_ref(),
        }
    }

    /// The context that owns the channel on `side`.
    #[must_use]
    pub fn context(&self, side: Side) -> Option<&ExecutionContext> {
        match side {
            Side::Outer => Some(&self.primary),
            Side::Inner => self.forwarding.as_ref(),
        }
    }

    /// Channel toward the outer process, for local replies.
    #[must_use]
    pub fn outer_channel(&self) -> Arc<dyn Channel> {
        Arc::clone(self.outer.channel())
    }

    /// Transport entry point: handle `envelope` on the context owning `side`'s
    /// channel and hand the outcome to `on_done` there.
    ///
    /// # Errors
    ///
    /// - `Unroutable` if no endpoint exists for `side`.
    /// - `ContextClosed` once that context has been stopped.
    pub fn post_inbound<F>(&self, side: Side, envelope: Envelope, on_done: F) -> Result<(), ForwardError>
    where
        F: FnOnce(Result<Delivery, ForwardError>) + Send + 'static,
    {
        let (Some(endpoint), Some(context)) = (self.endpoint(side), self.context(side)) else {
            return Err(ForwardError::Unroutable {
                side,
                msg_type: envelope.msg_type(),
                destination: envelope.destination(),
            });
        };
        let endpoint = Arc::clone(endpoint);
        context.enqueue(move || on_done(endpoint.on_inbound(envelope)))
    }

    /// Send what is queued toward the outer peer now, in order, including the
    /// inner endpoint's pending synchronous request. For a primary-thread
    /// caller that is blocked somewhere else and cannot return to
    /// [`Middleman::run`].
    ///
    /// Returns whether anything was sent.
    pub fn maybe_handle_forwarded_messages(&self) -> bool {
        self.outer.flush_outbound()
    }

    /// Drive the primary context on the calling thread until teardown, then
    /// join the forwarding context.
    pub fn run(&self) {
        self.primary_queue.run();
        let handle = self.forwarding_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Forwarding context panicked");
            }
        }
        info!("Middleman stopped");
    }

    /// Trigger shutdown from the embedder. Returns `false` if already triggered.
    pub fn request_shutdown(&self) -> bool {
        self.shutdown.trigger(ShutdownReason::Requested)
    }

    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Flips to `true` when shutdown is triggered.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Drive `queue` and turn a panic on it into an orderly shutdown before
/// letting it continue to unwind.
fn run_escalating(queue: &RunQueue, shutdown: &Arc<ShutdownCoordinator>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| queue.run())) {
        error!(context = %queue.name(), "Execution context panicked");
        shutdown.trigger(ShutdownReason::ContextPanicked {
            context: queue.name().to_string(),
        });
        panic::resume_unwind(payload);
    }
}

impl Drop for Middleman {
    fn drop(&mut self) {
        if let Some(forwarding) = &self.forwarding {
            forwarding.stop();
        }
    }
}
