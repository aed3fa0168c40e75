//! Domain types: envelopes, sides and the error taxonomy.

pub mod envelope;
pub mod error;

pub use envelope::{Direction, Envelope, MessageType, RoutingId, Side, SyncKind};
pub(crate) use error::contract_violation;
pub use error::{ChannelError, ForwardError, LocalHandlingError, MiddlemanError};
