//! User-Facing Notifications
//!
//! Join/leave/win/timeout messages produced for the UI layer.

use std::fmt;

use crate::session::peer::{LeaveReason, PeerId};

/// A message for the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Peer joined a running session.
    Joined {
        /// Slot.
        peer: PeerId,
        /// Display name.
        name: String,
        /// Character level.
        level: u8,
    },
    /// Peer was already in the session when we arrived.
    AlreadyInGame {
        /// Slot.
        peer: PeerId,
        /// Display name.
        name: String,
        /// Character level.
        level: u8,
    },
    /// Peer left normally.
    Left {
        /// Slot.
        peer: PeerId,
        /// Display name.
        name: String,
    },
    /// Peer finished the game and left.
    WonAndLeft {
        /// Slot.
        peer: PeerId,
        /// Display name.
        name: String,
    },
    /// Peer was dropped for not delivering turns.
    DroppedForTimeout {
        /// Slot.
        peer: PeerId,
        /// Display name.
        name: String,
    },
    /// Text relayed by the transport.
    Text {
        /// Slot.
        peer: PeerId,
        /// Message text.
        text: String,
    },
}

impl Notification {
    /// Departure message for `reason`.
    pub fn departure(peer: PeerId, name: String, reason: LeaveReason) -> Self {
        match reason {
            LeaveReason::Ending => Notification::WonAndLeft { peer, name },
            LeaveReason::Drop => Notification::DroppedForTimeout { peer, name },
            LeaveReason::None | LeaveReason::Other(_) => Notification::Left { peer, name },
        }
    }

    /// Slot the message is about.
    pub fn peer(&self) -> PeerId {
        match self {
            Notification::Joined { peer, .. }
            | Notification::AlreadyInGame { peer, .. }
            | Notification::Left { peer, .. }
            | Notification::WonAndLeft { peer, .. }
            | Notification::DroppedForTimeout { peer, .. }
            | Notification::Text { peer, .. } => *peer,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Joined { name, level, .. } => {
                write!(f, "Player '{name}' (level {level}) just joined the game")
            }
            Notification::AlreadyInGame { name, level, .. } => {
                write!(f, "Player '{name}' (level {level}) is already in the game")
            }
            Notification::Left { name, .. } => write!(f, "Player '{name}' just left the game"),
            Notification::WonAndLeft { name, .. } => {
                write!(f, "Player '{name}' completed the game and left!")
            }
            Notification::DroppedForTimeout { name, .. } => {
                write!(f, "Player '{name}' dropped due to timeout")
            }
            Notification::Text { text, .. } => f.write_str(text),
        }
    }
}
