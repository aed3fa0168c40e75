//! # Envelope and Side
//!
//! The unit of traffic relayed by the middleman, and the tag naming which peer
//! an endpoint's channel is connected to.
//!
//! The middleman never interprets payload bytes. Routing decisions look only at
//! the header: message type, destination routing id, and the synchronous flags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message type identifier.
pub type MessageType = u32;

/// Routing id of the actor an envelope is addressed to.
pub type RoutingId = i32;

/// Which peer process an endpoint's channel is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The process behind the middleman (e.g. the recorded child).
    Inner,
    /// The process in front of the middleman (e.g. the UI process).
    Outer,
}

impl Side {
    /// The other side of the pair.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Inner => Side::Outer,
            Side::Outer => Side::Inner,
        }
    }

    /// Direction of traffic that arrives on this side and gets forwarded.
    #[must_use]
    pub const fn inbound_direction(self) -> Direction {
        match self {
            Side::Inner => Direction::InnerToOuter,
            Side::Outer => Direction::OuterToInner,
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Side::Inner => 0,
            Side::Outer => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Inner => write!(f, "inner"),
            Side::Outer => write!(f, "outer"),
        }
    }
}

/// Direction of a forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    InnerToOuter,
    OuterToInner,
}

/// Which blocking primitive a synchronous exchange uses on the peer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncKind {
    /// The peer answers passively.
    SendWithReply,
    /// The peer may process further nested envelopes before answering.
    Call,
}

/// Typed, addressed message relayed between the two peers.
///
/// Envelopes are immutable once built; forwarding works on clones so that the
/// bytes handed to the peer are exactly the bytes that arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    msg_type: MessageType,
    destination: RoutingId,
    payload: Vec<u8>,
    synchronous: bool,
    call: bool,
    local_reply: bool,
}

impl Envelope {
    /// Create an asynchronous (fire-and-forget) envelope.
    #[must_use]
    pub fn new(msg_type: MessageType, destination: RoutingId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            msg_type,
            destination,
            payload: payload.into(),
            synchronous: false,
            call: false,
            local_reply: false,
        }
    }

    /// Create a synchronous envelope expecting a passive reply.
    #[must_use]
    pub fn sync(msg_type: MessageType, destination: RoutingId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            synchronous: true,
            ..Self::new(msg_type, destination, payload)
        }
    }

    /// Create a synchronous envelope for a call (the peer may recurse before replying).
    #[must_use]
    pub fn call(msg_type: MessageType, destination: RoutingId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            synchronous: true,
            call: true,
            ..Self::new(msg_type, destination, payload)
        }
    }

    /// Mark this envelope as an asynchronous reply to a message the middleman
    /// itself originated.
    #[must_use]
    pub fn into_local_reply(self) -> Self {
        Self {
            local_reply: true,
            ..self
        }
    }

    #[must_use]
    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    #[must_use]
    pub fn destination(&self) -> RoutingId {
        self.destination
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    #[must_use]
    pub fn is_call(&self) -> bool {
        self.call
    }

    /// Whether this is a reply to a message sent by the middleman.
    #[must_use]
    pub fn is_local_reply(&self) -> bool {
        self.local_reply
    }

    /// The synchronous exchange kind, or `None` for asynchronous envelopes.
    #[must_use]
    pub fn sync_kind(&self) -> Option<SyncKind> {
        match (self.synchronous, self.call) {
            (false, _) => None,
            (true, false) => Some(SyncKind::SendWithReply),
            (true, true) => Some(SyncKind::Call),
        }
    }
}
