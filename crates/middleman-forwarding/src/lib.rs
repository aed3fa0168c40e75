//! # Middleman Forwarding - Bidirectional Message Relay Core
//!
//! Sits between an outer peer and an inner peer and relays typed envelopes in
//! both directions, terminating the ones the middleman handles itself.
//!
//! ## Architecture Rules
//!
//! - Each channel is touched only from the execution context that owns it
//! - All cross-context handoff goes through [`ExecutionContext::enqueue`]
//! - Traffic toward each peer leaves through one FIFO outbox, synchronous
//!   exchanges included, so ordering per direction holds
//! - At most one synchronous exchange is pending per endpoint
//! - The first channel failure triggers exactly one orderly shutdown
//!
//! ## Forwarding Flow
//!
//! ```text
//! ┌──────────────┐                                        ┌──────────────┐
//! │ outer peer   │                                        │ inner peer   │
//! └──────┬───────┘                                        └──────▲───────┘
//!        │ on_inbound                                            │ send / call
//!        ▼                                                       │
//! ┌──────────────┐   classify    ┌────────────┐  enqueue  ┌──────┴───────┐
//! │ Endpoint     │ ────────────→ │ Classifier │ ────────→ │ forwarding   │
//! │ (Outer)      │               └────────────┘           │ context      │
//! └──────────────┘                                        └──────────────┘
//! ```
//!
//! Synchronous envelopes skip classification and go through the
//! [`SyncCoordinator`], which blocks the issuing context until the opposite
//! peer replies or shutdown releases it with [`ForwardError::Disconnected`].

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod config;
pub mod context;
pub mod domain;
pub mod endpoint;
pub mod metrics;
mod outbox;
pub mod ports;
pub mod service;
pub mod shutdown;
pub mod sync;

// Re-export main types
pub use adapters::{
    loopback_channel, ActorRegistry, ClassifierPolicy, Delivered, LoopbackChannel, LoopbackPeer,
    PolicyClassifier,
};
pub use config::ForwardingConfig;
pub use context::{ExecutionContext, RunQueue, Task};
pub use domain::{
    ChannelError, Direction, Envelope, ForwardError, LocalHandlingError, MessageType,
    MiddlemanError, RoutingId, Side, SyncKind,
};
pub use endpoint::{Delivery, Endpoint, EndpointPair, EndpointParts};
pub use metrics::{ForwardingMetrics, MetricsSnapshot};
pub use ports::{ActorDirectory, Channel, Classifier, Disposition, ForwardAll, LocalHandler};
pub use service::Middleman;
pub use shutdown::{ShutdownCoordinator, ShutdownReason, ShutdownState};
pub use sync::SyncCoordinator;
