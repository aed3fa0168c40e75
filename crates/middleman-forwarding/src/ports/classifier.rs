//! Driving policy ports: routing classification and local handling.

use crate::domain::{Envelope, LocalHandlingError, RoutingId, Side};

/// What to do with an inbound asynchronous envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Terminate here; nothing reaches the opposite peer.
    HandleLocally,
    /// Relay to the opposite peer untouched.
    Forward,
    /// Apply local bookkeeping and relay to the opposite peer.
    InterceptThenForward,
}

impl Disposition {
    /// Whether the envelope must reach the opposite peer.
    #[must_use]
    pub const fn forwards(self) -> bool {
        matches!(self, Disposition::Forward | Disposition::InterceptThenForward)
    }
}

/// Routing policy supplied by the embedding application.
///
/// `side` is the side the envelope arrived on. Implementations may apply local
/// side effects when returning `HandleLocally` or `InterceptThenForward`, but
/// must never block on the opposite endpoint. Conditions the policy does not
/// recognise resolve to `Forward`.
pub trait Classifier: Send + Sync {
    fn classify(&self, side: Side, envelope: &Envelope) -> Disposition;
}

impl<F> Classifier for F
where
    F: Fn(Side, &Envelope) -> Disposition + Send + Sync,
{
    fn classify(&self, side: Side, envelope: &Envelope) -> Disposition {
        self(side, envelope)
    }
}

/// Classifier that relays everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardAll;

impl Classifier for ForwardAll {
    fn classify(&self, _side: Side, _envelope: &Envelope) -> Disposition {
        Disposition::Forward
    }
}

/// Local message sink: the middleman's own actors.
pub trait LocalHandler: Send + Sync {
    fn handle(&self, side: Side, envelope: &Envelope) -> Result<(), LocalHandlingError>;
}

/// Lookup of actors that live in the middleman process.
pub trait ActorDirectory: Send + Sync {
    fn has_actor(&self, routing_id: RoutingId) -> bool;
}
