//! Adapters (hexagonal architecture)
//!
//! - `loopback`: in-process channel pair for hosting and testing
//! - `policy`: table-driven classifier and actor registry

pub mod loopback;
pub mod policy;

pub use loopback::{loopback_channel, Delivered, LoopbackChannel, LoopbackPeer, Responder};
pub use policy::{ActorRegistry, ClassifierPolicy, PolicyClassifier};
