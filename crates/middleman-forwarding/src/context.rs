//! # Execution Contexts
//!
//! A serialized run queue bound to one thread. All cross-context handoff in
//! the middleman goes through [`ExecutionContext::enqueue`]; no component ever
//! calls into another context's channel directly.
//!
//! ```text
//!   any thread                         owning thread
//!  ┌──────────────────┐  enqueue()   ┌──────────────────────────┐
//!  │ ExecutionContext │ ───────────→ │ RunQueue::run()          │
//!  │ (cloneable)      │   FIFO       │   task(); task(); ...    │
//!  └──────────────────┘              └──────────────────────────┘
//! ```
//!
//! Tasks on one context never run concurrently and run in enqueue order.

use crate::domain::ForwardError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// Unit of work posted to a context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

enum Job {
    Run(Task),
    Stop,
}

/// Cloneable handle for posting work onto a context.
#[derive(Clone)]
pub struct ExecutionContext {
    name: Arc<str>,
    sender: UnboundedSender<Job>,
    closed: Arc<AtomicBool>,
}

/// Owning side of a context; driven by exactly one thread.
pub struct RunQueue {
    name: Arc<str>,
    receiver: Mutex<UnboundedReceiver<Job>>,
    closed: Arc<AtomicBool>,
}

impl ExecutionContext {
    /// Create a context whose queue is driven by the caller.
    #[must_use]
    pub fn new(name: impl Into<String>) -> (Self, Arc<RunQueue>) {
        let name: Arc<str> = Arc::from(name.into());
        let (sender, receiver) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let context = Self {
            name: Arc::clone(&name),
            sender,
            closed: Arc::clone(&closed),
        };
        let queue = Arc::new(RunQueue {
            name,
            receiver: Mutex::new(receiver),
            closed,
        });
        (context, queue)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Post a task for in-order execution on this context.
    ///
    /// # Errors
    ///
    /// `ForwardError::ContextClosed` once the context has been stopped.
    pub fn enqueue(&self, task: impl FnOnce() + Send + 'static) -> Result<(), ForwardError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ForwardError::ContextClosed(self.name.to_string()));
        }
        self.sender
            .send(Job::Run(Box::new(task)))
            .map_err(|_| ForwardError::ContextClosed(self.name.to_string()))
    }

    /// Stop the context after the tasks already queued have run.
    ///
    /// Later enqueues are rejected.
    pub fn stop(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(context = %self.name, "Stopping execution context");
        let _ = self.sender.send(Job::Stop);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl RunQueue {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run tasks until the context is stopped. Must be called from the thread
    /// that owns this context.
    pub fn run(&self) {
        info!(context = %self.name, "Execution context running");
        loop {
            // Release the receiver before running the task.
            let job = self.receiver.lock().blocking_recv();
            match job {
                Some(Job::Run(task)) => task(),
                Some(Job::Stop) | None => break,
            }
        }
        self.close();
        info!(context = %self.name, "Execution context stopped");
    }

    /// Run every task queued right now without blocking. Returns how many ran.
    ///
    /// Lets the owning thread drive the context one step at a time.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.receiver.lock().try_recv();
            match job {
                Ok(Job::Run(task)) => {
                    task();
                    ran += 1;
                }
                Ok(Job::Stop) => {
                    self.close();
                    break;
                }
                Err(_) => break,
            }
        }
        ran
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.receiver.lock().close();
    }
}
