//! # Shutdown Coordinator
//!
//! Converts the first channel failure (or an explicit request) into a single,
//! orderly teardown.
//!
//! ## Shutdown Sequence
//!
//! 1. Enter `ShuttingDown` under the shared monitor lock
//! 2. Release every pending synchronous exchange with the `Disconnected` sentinel
//! 3. Broadcast on the watch channel
//! 4. Enqueue teardown on the primary context:
//!    stop registered contexts, run teardown hooks in registration order,
//!    stop the primary context
//!
//! Later triggers observe `ShuttingDown` and return without effect.

use crate::context::ExecutionContext;
use crate::domain::{ChannelError, Side};
use crate::sync::Monitor;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Lifecycle phase. The only transition is `Running -> ShuttingDown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
}

/// What started the shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The transport reported the channel closed.
    ChannelClosed { side: Side },
    /// The transport reported a channel error.
    ChannelError { side: Side },
    /// A send into the channel on `side` failed.
    SendFailed { side: Side, error: ChannelError },
    /// A task on the named execution context panicked.
    ContextPanicked { context: String },
    /// The embedder asked for it.
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::ChannelClosed { side } => write!(f, "{side} channel closed"),
            ShutdownReason::ChannelError { side } => write!(f, "{side} channel error"),
            ShutdownReason::SendFailed { side, error } => {
                write!(f, "send into {side} channel failed: {error}")
            }
            ShutdownReason::ContextPanicked { context } => {
                write!(f, "execution context {context} panicked")
            }
            ShutdownReason::Requested => write!(f, "requested"),
        }
    }
}

type TeardownHook = Box<dyn FnOnce() + Send + 'static>;

/// Process-wide, idempotent shutdown trigger.
pub struct ShutdownCoordinator {
    monitor: Arc<Monitor>,
    primary: ExecutionContext,
    contexts: Mutex<Vec<ExecutionContext>>,
    hooks: Mutex<Vec<TeardownHook>>,
    reason: Mutex<Option<ShutdownReason>>,
    signal: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    /// Create a coordinator whose teardown runs on `primary`.
    #[must_use]
    pub fn new(primary: ExecutionContext) -> Arc<Self> {
        let (signal, _) = watch::channel(false);
        Arc::new(Self {
            monitor: Arc::new(Monitor::new()),
            primary,
            contexts: Mutex::new(Vec::new()),
            hooks: Mutex::new(Vec::new()),
            reason: Mutex::new(None),
            signal,
        })
    }

    pub(crate) fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Stop `context` during teardown, before the hooks run.
    pub fn register_context(&self, context: ExecutionContext) {
        self.contexts.lock().push(context);
    }

    /// Run `hook` on the primary context during teardown.
    ///
    /// Hooks registered after teardown has run are never invoked.
    pub fn on_teardown(&self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.lock().push(Box::new(hook));
    }

    /// Begin shutdown. Safe from any context, any number of times.
    ///
    /// Returns `true` for the caller that actually started the shutdown.
    pub fn trigger(self: &Arc<Self>, reason: ShutdownReason) -> bool {
        let Some(released) = self.monitor.enter_shutdown() else {
            debug!(reason = %reason, "Shutdown already in progress");
            return false;
        };
        warn!(reason = %reason, released, "Shutting down middleman");
        *self.reason.lock() = Some(reason);
        self.signal.send_replace(true);

        let this = Arc::clone(self);
        if let Err(err) = self.primary.enqueue(move || this.teardown()) {
            warn!(error = %err, "Primary context unavailable, tearing down in place");
            self.teardown();
        }
        true
    }

    #[must_use]
    pub fn state(&self) -> ShutdownState {
        self.monitor.phase()
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.state() == ShutdownState::ShuttingDown
    }

    /// The reason recorded by the winning trigger.
    #[must_use]
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.lock().clone()
    }

    /// Receiver that flips to `true` once shutdown is triggered.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }

    fn teardown(&self) {
        info!("Tearing down middleman");
        let contexts = std::mem::take(&mut *self.contexts.lock());
        for context in contexts {
            context.stop();
        }
        let hooks = std::mem::take(&mut *self.hooks.lock());
        for hook in hooks {
            hook();
        }
        self.primary.stop();
    }
}
