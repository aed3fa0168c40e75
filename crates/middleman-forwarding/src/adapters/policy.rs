//! # Table-Driven Classifier
//!
//! A [`Classifier`] configured from message-type tables, for embedders whose
//! routing rules are static.
//!
//! ## Rules (first match wins)
//!
//! | # | Condition                                   | Disposition            |
//! |---|---------------------------------------------|------------------------|
//! | 1 | arrived on a side other than `local_side`   | Forward                |
//! | 2 | type in `intercept_types`                   | InterceptThenForward*  |
//! | 3 | type in `local_types` or a `local_ranges`   | HandleLocally          |
//! | 4 | type in an `actor_routed_ranges` range      | HandleLocally if the destination actor lives here, else Forward |
//! | 5 | local reply and `handle_local_replies`      | HandleLocally          |
//! | 6 | anything else                               | Forward                |
//!
//! \* Forward instead when the type also falls in an `actor_gated_ranges`
//! range and the destination actor does not live here.
//!
//! Local and intercepted envelopes are passed to the [`LocalHandler`]. A
//! handler failure is logged and does not change the disposition.

use crate::domain::{Envelope, MessageType, RoutingId, Side};
use crate::ports::{ActorDirectory, Classifier, Disposition, LocalHandler};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{error, trace};

/// Routing tables for [`PolicyClassifier`].
#[derive(Debug, Clone)]
pub struct ClassifierPolicy {
    local_side: Side,
    intercept_types: HashSet<MessageType>,
    local_types: HashSet<MessageType>,
    local_ranges: Vec<RangeInclusive<MessageType>>,
    actor_gated_ranges: Vec<RangeInclusive<MessageType>>,
    actor_routed_ranges: Vec<RangeInclusive<MessageType>>,
    handle_local_replies: bool,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            local_side: Side::Outer,
            intercept_types: HashSet::new(),
            local_types: HashSet::new(),
            local_ranges: Vec::new(),
            actor_gated_ranges: Vec::new(),
            actor_routed_ranges: Vec::new(),
            handle_local_replies: true,
        }
    }
}

impl ClassifierPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only envelopes arriving on `side` are ever handled locally.
    #[must_use]
    pub fn with_local_side(mut self, side: Side) -> Self {
        self.local_side = side;
        self
    }

    #[must_use]
    pub fn intercept(mut self, types: impl IntoIterator<Item = MessageType>) -> Self {
        self.intercept_types.extend(types);
        self
    }

    #[must_use]
    pub fn handle_locally(mut self, types: impl IntoIterator<Item = MessageType>) -> Self {
        self.local_types.extend(types);
        self
    }

    #[must_use]
    pub fn handle_range_locally(mut self, range: RangeInclusive<MessageType>) -> Self {
        self.local_ranges.push(range);
        self
    }

    /// Intercepted types in `range` are only intercepted for local actors.
    #[must_use]
    pub fn gate_on_actor(mut self, range: RangeInclusive<MessageType>) -> Self {
        self.actor_gated_ranges.push(range);
        self
    }

    /// Types in `range` are handled locally iff the destination actor lives here.
    #[must_use]
    pub fn route_by_actor(mut self, range: RangeInclusive<MessageType>) -> Self {
        self.actor_routed_ranges.push(range);
        self
    }

    #[must_use]
    pub fn with_local_replies(mut self, handle: bool) -> Self {
        self.handle_local_replies = handle;
        self
    }
}

fn in_any(ranges: &[RangeInclusive<MessageType>], msg_type: MessageType) -> bool {
    ranges.iter().any(|range| range.contains(&msg_type))
}

/// Classifier driven by a [`ClassifierPolicy`].
pub struct PolicyClassifier {
    policy: ClassifierPolicy,
    handler: Arc<dyn LocalHandler>,
    actors: Arc<dyn ActorDirectory>,
}

impl PolicyClassifier {
    #[must_use]
    pub fn new(
        policy: ClassifierPolicy,
        handler: Arc<dyn LocalHandler>,
        actors: Arc<dyn ActorDirectory>,
    ) -> Self {
        Self {
            policy,
            handler,
            actors,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &ClassifierPolicy {
        &self.policy
    }

    fn decide(&self, side: Side, envelope: &Envelope) -> Disposition {
        let policy = &self.policy;
        let msg_type = envelope.msg_type();
        if side != policy.local_side {
            return Disposition::Forward;
        }
        if policy.intercept_types.contains(&msg_type) {
            if in_any(&policy.actor_gated_ranges, msg_type)
                && !self.actors.has_actor(envelope.destination())
            {
                return Disposition::Forward;
            }
            return Disposition::InterceptThenForward;
        }
        if policy.local_types.contains(&msg_type) || in_any(&policy.local_ranges, msg_type) {
            return Disposition::HandleLocally;
        }
        if in_any(&policy.actor_routed_ranges, msg_type) {
            return if self.actors.has_actor(envelope.destination()) {
                Disposition::HandleLocally
            } else {
                Disposition::Forward
            };
        }
        if policy.handle_local_replies && envelope.is_local_reply() {
            return Disposition::HandleLocally;
        }
        Disposition::Forward
    }
}

impl Classifier for PolicyClassifier {
    fn classify(&self, side: Side, envelope: &Envelope) -> Disposition {
        let disposition = self.decide(side, envelope);
        if disposition != Disposition::Forward {
            if let Err(err) = self.handler.handle(side, envelope) {
                error!(side = %side, error = %err, "Local handling failed");
            }
        }
        trace!(side = %side, msg_type = envelope.msg_type(), disposition = ?disposition, "Policy decision");
        disposition
    }
}

/// Set of actors living in the middleman process.
#[derive(Debug, Default)]
pub struct ActorRegistry {
    actors: RwLock<HashSet<RoutingId>>,
}

impl ActorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the actor was already registered.
    pub fn register(&self, routing_id: RoutingId) -> bool {
        self.actors.write().insert(routing_id)
    }

    pub fn unregister(&self, routing_id: RoutingId) -> bool {
        self.actors.write().remove(&routing_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.read().is_empty()
    }
}

impl ActorDirectory for ActorRegistry {
    fn has_actor(&self, routing_id: RoutingId) -> bool {
        self.actors.read().contains(&routing_id)
    }
}
