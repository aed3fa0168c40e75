//! # Middleman Test Suite
//!
//! Cross-component tests that drive a complete [`middleman_forwarding::Middleman`]
//! over loopback channels.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support.rs        # Harness: middleman + loopback peers + primary thread
//! └── integration/
//!     ├── scenarios.rs  # End-to-end forwarding scenarios
//!     ├── ordering.rs   # FIFO per direction, local handling isolation
//!     ├── sync_stress.rs# Lost-wakeup trials, crossing exchanges, overlap faults
//!     └── shutdown.rs   # Idempotent trigger, sentinel release, teardown
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p middleman-tests
//! cargo test -p middleman-tests integration::sync_stress::
//! ```

pub mod integration;
pub mod support;
