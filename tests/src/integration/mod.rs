//! # Integration Tests
//!
//! Full middleman flows over loopback peers.
//!
//! - `scenarios`: async forward, synchronous call, send failure under a
//!   blocked caller, nested call
//! - `ordering`: FIFO per direction, local handling never reaches a peer
//! - `sync_stress`: lost-wakeup trials and overlapping exchanges
//! - `shutdown`: idempotent trigger and teardown

pub mod ordering;
pub mod sync_stress;
