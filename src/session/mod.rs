//! Session Layer
//!
//! Peer slots, turn exchange, timeout arbitration, record transfer and
//! packet dispatch. All of it runs on the caller's thread, once per tick,
//! driven through `Coordinator`.

pub mod coordinator;
pub mod delta;
pub mod dispatch;
pub mod notify;
pub mod outbox;
pub mod peer;
pub mod state;
pub mod timeout;
pub mod tracker;
pub mod transfer;
pub mod turn;
pub mod world;

// Re-export session types
pub use coordinator::Coordinator;
pub use delta::{DeltaQueue, PendingTransfer};
pub use notify::Notification;
pub use peer::{LeaveReason, PeerId, PeerSlot, PeerState};
pub use state::{SessionState, TurnClock};
pub use timeout::Verdict;
pub use transfer::ChunkHeader;
pub use turn::{TurnPoll, TurnValue};
pub use world::{Avatar, CommandInterpreter, World};
