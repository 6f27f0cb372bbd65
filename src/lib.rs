//! # Lockstep Sync
//!
//! Turn-synchronized lockstep coordinator for a session of up to four peers.
//! Every peer advances its simulation only when all connected peers have
//! delivered the current turn, and derives identical per-entity seeds from
//! a shared loop counter.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      LOCKSTEP SYNC                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── seed.rs     - Loop counter to entity seed derivation    │
//! │  ├── framing.rs  - Length-prefixed batch buffers             │
//! │  └── hash.rs     - Seed table digests                        │
//! │                                                              │
//! │  network/        - Wire format and transport contract        │
//! │  ├── header.rs   - 24-byte packet header                     │
//! │  ├── descriptor.rs - Game descriptor exchanged on join       │
//! │  ├── transport.rs  - Transport trait and events              │
//! │  └── loopback.rs - In-process transport                      │
//! │                                                              │
//! │  session/        - Per-tick coordination                     │
//! │  ├── coordinator.rs - Lifecycle and tick entry points        │
//! │  ├── turn.rs     - Turn exchange and seed advance            │
//! │  ├── timeout.rs  - Stall detection and quorum arbitration    │
//! │  ├── transfer.rs - Chunked player record transfer            │
//! │  ├── delta.rs    - Delta-sender role and transfer queue      │
//! │  ├── tracker.rs  - Peer create / leave handling              │
//! │  ├── outbox.rs   - Send paths and batching                   │
//! │  └── dispatch.rs - Inbound packet dispatch                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` module is **100% deterministic**: seeds depend only on the
//! loop counter and the entity index. The session layer only advances the
//! loop counter when a complete turn round arrived, so peers that stay in
//! the session compute the same seed table for the same tick.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod session;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{ConfigError, CoordinatorConfig};
pub use crate::core::hash::{seed_digest, SeedDigest};
pub use crate::core::seed::{entity_seed, entity_seeds};
pub use error::{CoordinatorError, CoordinatorResult};
pub use network::descriptor::GameDescriptor;
pub use network::transport::{Target, Transport, TransportError, TransportEvent};
pub use session::{
    Avatar, CommandInterpreter, Coordinator, LeaveReason, Notification, PeerId, PeerState, World,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Peer slots in a session.
pub const MAX_PEERS: usize = 4;
