//! In-process [`Channel`] for hosting the middleman without real transports.
//!
//! `loopback_channel()` returns the middleman-facing channel and the peer's
//! receiving end. Synchronous exchanges are answered by a responder closure
//! that stands in for the peer process.

use crate::domain::{ChannelError, Envelope, SyncKind};
use crate::ports::Channel;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Answers synchronous exchanges on behalf of the peer. `None` means the peer
/// never replies.
pub type Responder = Arc<dyn Fn(&Envelope) -> Option<Envelope> + Send + Sync>;

/// What the peer observed, including which primitive carried it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub envelope: Envelope,
    /// `None` for fire-and-forget sends.
    pub kind: Option<SyncKind>,
}

/// Creates a loopback channel/peer pair backed by an in-memory queue.
pub fn loopback_channel<R>(responder: R) -> (LoopbackChannel, LoopbackPeer)
where
    R: Fn(&Envelope) -> Option<Envelope> + Send + Sync + 'static,
{
    let (sender, receiver) = mpsc::channel();
    (
        LoopbackChannel {
            sender: Mutex::new(Some(sender)),
            responder: Arc::new(responder),
            failing: AtomicBool::new(false),
        },
        LoopbackPeer {
            receiver: Mutex::new(receiver),
        },
    )
}

/// Middleman-facing end of a loopback pair.
pub struct LoopbackChannel {
    sender: Mutex<Option<Sender<Delivered>>>,
    responder: Responder,
    failing: AtomicBool,
}

impl LoopbackChannel {
    /// Drop the connection. Later sends fail with `ChannelError::Closed`.
    pub fn disconnect(&self) {
        self.sender.lock().take();
    }

    /// Make sends fail with `ChannelError::SendFailed` while connected.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.sender.lock().is_some()
    }

    fn deliver(&self, envelope: Envelope, kind: Option<SyncKind>) -> Result<(), ChannelError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(ChannelError::SendFailed("loopback send refused".into()));
        }
        match self.sender.lock().as_ref() {
            Some(sender) => sender
                .send(Delivered { envelope, kind })
                .map_err(|_| ChannelError::Closed),
            None => Err(ChannelError::Closed),
        }
    }

    fn exchange(&self, envelope: Envelope, kind: SyncKind) -> Result<Envelope, ChannelError> {
        self.deliver(envelope.clone(), Some(kind))?;
        (self.responder)(&envelope).ok_or(ChannelError::NoReply)
    }
}

impl Channel for LoopbackChannel {
    fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        self.deliver(envelope, None)
    }

    fn send_with_reply(&self, envelope: Envelope) -> Result<Envelope, ChannelError> {
        self.exchange(envelope, SyncKind::SendWithReply)
    }

    fn call(&self, envelope: Envelope) -> Result<Envelope, ChannelError> {
        self.exchange(envelope, SyncKind::Call)
    }
}

/// Peer-facing end: everything the middleman delivered, in order.
pub struct LoopbackPeer {
    receiver: Mutex<Receiver<Delivered>>,
}

impl LoopbackPeer {
    /// Next delivery, waiting up to `timeout`. `None` on timeout or disconnect.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Delivered> {
        match self.receiver.lock().recv_timeout(timeout) {
            Ok(delivered) => Some(delivered),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    #[must_use]
    pub fn try_recv(&self) -> Option<Delivered> {
        self.receiver.lock().try_recv().ok()
    }

    /// Everything delivered so far.
    #[must_use]
    pub fn drain(&self) -> Vec<Delivered> {
        self.receiver.lock().try_iter().collect()
    }
}
