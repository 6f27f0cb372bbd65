//! Core deterministic primitives.
//!
//! Nothing in this module touches the transport or the clock.

pub mod framing;
pub mod hash;
pub mod seed;

// Re-export core types
pub use framing::{FrameBuffer, FramingError, FRAME_BUFFER_CAPACITY};
pub use hash::{seed_digest, SeedDigest};
pub use seed::{entity_seed, entity_seeds, loop_count_for_turn};
