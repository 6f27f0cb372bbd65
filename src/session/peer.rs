//! Peer Slots
//!
//! One fixed slot per possible participant. The lifecycle is a single
//! enum; the remaining fields are per-slot bookkeeping for turn exchange,
//! delta export and full-state reassembly.

use std::fmt;

use crate::network::transport::PeerLink;
use crate::MAX_PEERS;

// =============================================================================
// PEER ID
// =============================================================================

/// Index of a peer slot, always `< MAX_PEERS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PeerId(u8);

impl PeerId {
    /// Create from a slot index.
    ///
    /// # Panics
    /// Panics if `index >= MAX_PEERS`.
    pub const fn new(index: u8) -> Self {
        assert!((index as usize) < MAX_PEERS, "peer index out of range");
        Self(index)
    }

    /// Create from an unchecked index reported by the transport.
    pub fn from_index(index: usize) -> Option<Self> {
        (index < MAX_PEERS).then_some(Self(index as u8))
    }

    /// Slot index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Bit of this slot in a peer mask.
    #[inline]
    pub const fn mask(self) -> u8 {
        1 << self.0
    }

    /// All slots in index order.
    pub fn all() -> impl Iterator<Item = PeerId> {
        (0..MAX_PEERS as u8).map(PeerId)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// LEAVE REASON
// =============================================================================

/// Why a peer left the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LeaveReason {
    /// Ordinary departure, or no reason supplied.
    #[default]
    None,
    /// The peer completed the win condition and ended its game.
    Ending,
    /// Dropped by the session for not delivering turns.
    Drop,
    /// Any other provider-specific code.
    Other(u32),
}

impl LeaveReason {
    /// Wire code for a win-and-leave.
    pub const ENDING_CODE: u32 = 0x4000_0004;
    /// Wire code for a timeout drop.
    pub const DROP_CODE: u32 = 0x4000_0006;

    /// Decode a wire code.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => LeaveReason::None,
            Self::ENDING_CODE => LeaveReason::Ending,
            Self::DROP_CODE => LeaveReason::Drop,
            other => LeaveReason::Other(other),
        }
    }

    /// Decode from a leave event payload; short payloads mean `None`.
    pub fn from_payload(payload: &[u8]) -> Self {
        match payload.get(..4) {
            Some(b) => Self::from_code(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            None => LeaveReason::None,
        }
    }

    /// Wire code.
    pub fn code(self) -> u32 {
        match self {
            LeaveReason::None => 0,
            LeaveReason::Ending => Self::ENDING_CODE,
            LeaveReason::Drop => Self::DROP_CODE,
            LeaveReason::Other(code) => code,
        }
    }
}

// =============================================================================
// PEER STATE
// =============================================================================

/// Lifecycle of a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PeerState {
    /// Nobody in this slot.
    #[default]
    Disconnected,
    /// Present in the session but not yet simulated.
    Connected,
    /// Fully joined and simulated.
    Active,
    /// Departed; departure not yet announced.
    Left {
        /// Reason reported by the transport or the arbiter.
        reason: LeaveReason,
        /// The peer was simulated when it left.
        was_active: bool,
    },
}

impl PeerState {
    /// Connected or active.
    #[inline]
    pub fn is_present(self) -> bool {
        matches!(self, PeerState::Connected | PeerState::Active)
    }

    /// Simulated right now.
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, PeerState::Active)
    }
}

/// Everything the coordinator tracks for one slot.
#[derive(Clone, Debug, Default)]
pub struct PeerSlot {
    /// Lifecycle state.
    pub state: PeerState,
    /// Transport-level link status from the last turn collection.
    pub link: PeerLink,
    /// Slot joined a running session and expects a delta.
    pub turn_bit: bool,
    /// A delta export to this peer is pending.
    pub send_delta: bool,
    /// Bytes of an in-flight full-state transfer received so far.
    pub pack_offset: usize,
    /// Reassembly buffer for the in-flight transfer.
    pub record: Vec<u8>,
    /// Last turn value received from this slot.
    pub last_turn: Option<u32>,
}

impl PeerSlot {
    /// Transport reports this slot connected.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.link.connected
    }

    /// Transport reports this slot delivering turns.
    #[inline]
    pub fn is_responsive(&self) -> bool {
        self.link.connected && self.link.active
    }

    /// Clear the slot back to its initial state.
    pub fn reset(&mut self) {
        *self = PeerSlot::default();
    }
}
