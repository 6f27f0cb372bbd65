//! Transport Contract
//!
//! The raw message transport lives outside this crate. The coordinator
//! only needs the narrow, synchronous surface below: addressed sends,
//! polled receives, turn exchange, peer drops and three event kinds.
//!
//! Implementations may use threads internally, but every call here and
//! every event returned by `poll_event` must be serviced on the tick thread.

use thiserror::Error;

use crate::session::peer::{LeaveReason, PeerId};
use crate::MAX_PEERS;

/// Destination of an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// One peer slot.
    Peer(PeerId),
    /// Every other peer in the session.
    Broadcast,
}

/// Event kinds the coordinator subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A peer left or was dropped.
    PeerLeave,
    /// A peer created its presence in the game.
    PeerCreate,
    /// A free-text message from a peer or the transport.
    PeerMessage,
}

impl EventKind {
    /// The three kinds, in registration order.
    pub const ALL: [EventKind; 3] = [EventKind::PeerLeave, EventKind::PeerCreate, EventKind::PeerMessage];
}

/// Discrete event raised by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Peer left; `payload` may carry a little-endian reason code.
    PeerLeave {
        /// Departing slot.
        peer: PeerId,
        /// Raw event data.
        payload: Vec<u8>,
    },
    /// Peer created its presence; carries the encoded game descriptor.
    PeerCreate {
        /// Originating slot.
        peer: PeerId,
        /// Encoded `GameDescriptor`.
        descriptor: Vec<u8>,
    },
    /// Text to surface to the user.
    PeerMessage {
        /// Originating slot.
        peer: PeerId,
        /// Message text.
        text: String,
    },
}

impl TransportEvent {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            TransportEvent::PeerLeave { .. } => EventKind::PeerLeave,
            TransportEvent::PeerCreate { .. } => EventKind::PeerCreate,
            TransportEvent::PeerMessage { .. } => EventKind::PeerMessage,
        }
    }
}

/// One received message, sender index unchecked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Slot index reported by the transport.
    pub sender: usize,
    /// Raw bytes (header + body).
    pub data: Vec<u8>,
}

/// Transport's view of one slot after a turn collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerLink {
    /// Slot is part of the session at the transport level.
    pub connected: bool,
    /// Slot delivered its turn within the allowed window.
    pub active: bool,
    /// Turn value delivered this round, if any.
    pub turn: Option<u32>,
}

/// Result of one turn collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnRound {
    /// Every connected peer delivered.
    pub complete: bool,
    /// Per-slot link state.
    pub links: [PeerLink; MAX_PEERS],
}

/// Transport failures. "No messages waiting" is not one of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Addressed slot is not in the session.
    #[error("invalid player")]
    InvalidPlayer,

    /// Transport has no active session.
    #[error("not connected")]
    NotConnected,

    /// Anything else the provider reports.
    #[error("{0}")]
    Failed(String),
}

/// Synchronous transport surface consumed by the coordinator.
pub trait Transport {
    /// Slot the transport assigned to the local peer.
    fn local_peer(&self) -> PeerId;

    /// Send one message.
    fn send_message(&mut self, target: Target, data: &[u8]) -> Result<(), TransportError>;

    /// Pop the next message; `Ok(None)` when nothing is waiting.
    fn receive_message(&mut self) -> Result<Option<Inbound>, TransportError>;

    /// Queue one outgoing turn value.
    fn send_turn(&mut self, turn: u32) -> Result<(), TransportError>;

    /// Turns sent but not yet delivered everywhere.
    fn turns_in_transit(&self) -> u32;

    /// Collect one turn from every connected peer.
    fn receive_turns(&mut self) -> Result<TurnRound, TransportError>;

    /// Ask the transport to remove a peer from the session.
    fn drop_peer(&mut self, peer: PeerId, reason: LeaveReason) -> Result<(), TransportError>;

    /// Start delivering events of `kind`.
    fn register_event_handler(&mut self, kind: EventKind) -> Result<(), TransportError>;

    /// Stop delivering events of `kind`.
    fn unregister_event_handler(&mut self, kind: EventKind) -> Result<(), TransportError>;

    /// Next pending event of a registered kind.
    fn poll_event(&mut self) -> Option<TransportEvent>;

    /// Leave the session.
    fn leave_game(&mut self, reason: LeaveReason) -> Result<(), TransportError>;
}
