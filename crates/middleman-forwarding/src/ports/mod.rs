//! Ports (hexagonal architecture)
//!
//! - `channel`: driven port to a peer process
//! - `classifier`: routing policy and local handling supplied by the embedder

pub mod channel;
pub mod classifier;

pub use channel::Channel;
pub use classifier::{ActorDirectory, Classifier, Disposition, ForwardAll, LocalHandler};
