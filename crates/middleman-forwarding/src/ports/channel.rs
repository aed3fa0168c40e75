//! Driven port: an established duplex connection to one peer process.
//!
//! Framing and transport belong to the implementation. The core only needs the
//! three delivery primitives below; close/error notifications flow the other
//! way, from the transport into [`Endpoint::on_channel_close`] and
//! [`Endpoint::on_channel_error`].
//!
//! [`Endpoint::on_channel_close`]: crate::endpoint::Endpoint::on_channel_close
//! [`Endpoint::on_channel_error`]: crate::endpoint::Endpoint::on_channel_error

use crate::domain::{ChannelError, Envelope};

/// Connection to a peer.
///
/// Implementations are invoked only from the execution context that owns the
/// channel, so the blocking primitives may block that context's thread.
pub trait Channel: Send + Sync {
    /// Fire-and-forget delivery.
    fn send(&self, envelope: Envelope) -> Result<(), ChannelError>;

    /// Blocking exchange; the peer answers passively.
    fn send_with_reply(&self, envelope: Envelope) -> Result<Envelope, ChannelError>;

    /// Blocking exchange; the peer may process further envelopes before
    /// answering.
    fn call(&self, envelope: Envelope) -> Result<Envelope, ChannelError>;
}
