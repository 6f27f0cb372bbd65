//! Session State
//!
//! The single owned struct every component mutates. It is only ever
//! touched from the tick thread, so nothing in here is synchronized.

use std::time::Instant;

use crate::core::framing::FrameBuffer;
use crate::session::notify::Notification;
use crate::session::peer::{PeerId, PeerSlot, PeerState};
use crate::MAX_PEERS;

/// Countdowns gating how often turns are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnClock {
    /// Ticks until the next turn-packet step.
    pub packet_countdown: u32,
    /// Turn-packet steps until the next collection.
    pub sync_countdown: u32,
}

impl Default for TurnClock {
    fn default() -> Self {
        Self {
            packet_countdown: 1,
            sync_countdown: 1,
        }
    }
}

/// All mutable coordinator state for one session.
#[derive(Debug)]
pub struct SessionState {
    /// Our own slot.
    pub local: PeerId,
    /// Per-slot state.
    pub slots: [PeerSlot; MAX_PEERS],
    /// Latency-tolerant batch.
    pub lo_pri: FrameBuffer,
    /// Time-critical batch.
    pub hi_pri: FrameBuffer,
    /// Loop counter feeding entity seeds.
    pub loop_count: u32,
    /// Turn counter we have sent up to.
    pub sent_this_cycle: u32,
    /// Tag the next outgoing turn with the delta request flag.
    pub request_delta: bool,
    /// Slot currently exporting deltas, `None` while unassigned.
    pub delta_sender: Option<PeerId>,
    /// Slots currently simulated, including ours.
    pub active_peers: u8,
    /// Arbiter declared the session unrecoverable.
    pub destroyed: bool,
    /// Some peer completed the game.
    pub somebody_won: bool,
    /// A batch packet already went out this turn.
    pub batch_validated: bool,
    /// Start of the current continuous stall.
    pub timeout_since: Option<Instant>,
    /// Turn collection cadence.
    pub turn_clock: TurnClock,
    /// Fatal fault already reported.
    pub terminated: bool,
    notifications: Vec<Notification>,
}

impl SessionState {
    /// Fresh state for a session where we occupy `local`.
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            slots: Default::default(),
            lo_pri: FrameBuffer::new(),
            hi_pri: FrameBuffer::new(),
            loop_count: 0,
            sent_this_cycle: 0,
            request_delta: false,
            delta_sender: Some(local),
            active_peers: 0,
            destroyed: false,
            somebody_won: false,
            batch_validated: false,
            timeout_since: None,
            turn_clock: TurnClock::default(),
            terminated: false,
            notifications: Vec::new(),
        }
    }

    /// Slot of `peer`.
    #[inline]
    pub fn slot(&self, peer: PeerId) -> &PeerSlot {
        &self.slots[peer.index()]
    }

    /// Mutable slot of `peer`.
    #[inline]
    pub fn slot_mut(&mut self, peer: PeerId) -> &mut PeerSlot {
        &mut self.slots[peer.index()]
    }

    /// Lifecycle state of `peer`.
    #[inline]
    pub fn peer_state(&self, peer: PeerId) -> PeerState {
        self.slot(peer).state
    }

    /// Lowest connected slot other than `except`.
    pub fn lowest_connected_except(&self, except: PeerId) -> Option<PeerId> {
        PeerId::all().find(|&p| p != except && self.slot(p).is_connected())
    }

    /// Queue a notification for the UI.
    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    /// Drain queued notifications.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Notifications not yet drained.
    pub fn pending_notifications(&self) -> &[Notification] {
        &self.notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::transport::PeerLink;

    #[test]
    fn test_new_state() {
        let state = SessionState::new(PeerId::new(2));
        assert_eq!(state.delta_sender, Some(PeerId::new(2)));
        assert_eq!(state.loop_count, 0);
        assert!(state.lo_pri.is_empty() && state.hi_pri.is_empty());
        assert!(state.slots.iter().all(|s| s.state == PeerState::Disconnected));
    }

    #[test]
    fn test_lowest_connected_except() {
        let mut state = SessionState::new(PeerId::new(0));
        assert_eq!(state.lowest_connected_except(PeerId::new(0)), None);

        for i in [0u8, 2, 3] {
            state.slot_mut(PeerId::new(i)).link = PeerLink {
                connected: true,
                ..Default::default()
            };
        }
        assert_eq!(state.lowest_connected_except(PeerId::new(0)), Some(PeerId::new(2)));
        assert_eq!(state.lowest_connected_except(PeerId::new(2)), Some(PeerId::new(0)));
    }

    #[test]
    fn test_notifications_drain() {
        let mut state = SessionState::new(PeerId::new(0));
        state.notify(Notification::Text {
            peer: PeerId::new(1),
            text: "hi".into(),
        });
        assert_eq!(state.pending_notifications().len(), 1);
        assert_eq!(state.take_notifications().len(), 1);
        assert!(state.take_notifications().is_empty());
    }
}
