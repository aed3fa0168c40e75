//! Error types for the forwarding core
//!
//! Three classes of failure exist:
//!
//! - **ChannelFailure** (`ChannelError`): a peer channel refused a send or
//!   reported close/error. Converted into a single shutdown trigger.
//! - **DropUnroutable** (`ForwardError::Unroutable`): nothing to forward to.
//!   Logged, envelope discarded, processing continues.
//! - **ContractViolation**: a bug in the caller or the core. Not a value; see
//!   [`contract_violation`].

use super::envelope::{MessageType, RoutingId, Side};
use std::fmt;
use thiserror::Error;

/// Failure reported by a peer channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("peer did not reply")]
    NoReply,
}

/// Outcome of routing an envelope that did not produce a delivery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForwardError {
    /// Shutdown has been triggered; no new traffic is accepted.
    #[error("middleman is shutting down")]
    ShuttingDown,

    /// Sentinel reply: the connection went away while a synchronous exchange
    /// was outstanding. Not a normal answer.
    #[error("peer connection lost before a reply arrived")]
    Disconnected,

    /// The classifier asked for a forward but no peer is attached.
    #[error("no peer attached on {side} side for message {msg_type} (destination {destination})")]
    Unroutable {
        side: Side,
        msg_type: MessageType,
        destination: RoutingId,
    },

    /// The target execution context no longer accepts tasks.
    #[error("execution context {0} is closed")]
    ContextClosed(String),
}

/// Failure of application-level local handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("local handling of message {msg_type} failed: {reason}")]
pub struct LocalHandlingError {
    pub msg_type: MessageType,
    pub reason: String,
}

/// Errors from bringing the middleman up.
#[derive(Debug, Error)]
pub enum MiddlemanError {
    #[error("failed to spawn execution context {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("forwarding context did not finish startup within {0} ms")]
    StartupTimeout(u64),

    #[error("failed to connect inner channel: {0}")]
    Connect(#[from] ChannelError),
}

/// Report a broken core invariant and abort the current thread of control.
///
/// Used for protocol violations such as a second synchronous forward while one
/// is pending. These indicate a logic bug, never an environmental fault.
///
/// The panic unwinds the current context. On the forwarding context it is
/// escalated to a `ContextPanicked` shutdown; on the primary context it
/// propagates out of `Middleman::run`. Build with `panic = "abort"` to end the
/// process at the violation instead.
#[track_caller]
pub(crate) fn contract_violation(args: fmt::Arguments<'_>) -> ! {
    tracing::error!(violation = %args, "Forwarding contract violated");
    panic!("forwarding contract violated: {args}");
}
