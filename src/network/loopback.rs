//! In-Memory Loopback Transport
//!
//! A four-slot hub that implements the transport contract entirely in
//! memory. Used by the demo driver and by the multi-peer tests.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::network::transport::{
    EventKind, Inbound, PeerLink, Target, Transport, TransportError, TransportEvent, TurnRound,
};
use crate::session::peer::{LeaveReason, PeerId};
use crate::MAX_PEERS;

#[derive(Default)]
struct HubInner {
    connected: [bool; MAX_PEERS],
    inboxes: [VecDeque<Inbound>; MAX_PEERS],
    /// `turns[receiver][sender]`
    turns: [[VecDeque<u32>; MAX_PEERS]; MAX_PEERS],
    events: [VecDeque<TransportEvent>; MAX_PEERS],
    registered: [HashSet<EventKind>; MAX_PEERS],
}

impl HubInner {
    fn deliver_event(&mut self, to: usize, event: TransportEvent) {
        if self.connected[to] && self.registered[to].contains(&event.kind()) {
            self.events[to].push_back(event);
        }
    }

    fn remove(&mut self, peer: usize, reason: LeaveReason) {
        self.connected[peer] = false;
        self.inboxes[peer].clear();
        for receiver in 0..MAX_PEERS {
            self.turns[receiver][peer].clear();
            self.turns[peer][receiver].clear();
        }
        let payload = reason.code().to_le_bytes().to_vec();
        for to in 0..MAX_PEERS {
            if to != peer {
                self.deliver_event(
                    to,
                    TransportEvent::PeerLeave {
                        peer: PeerId::new(peer as u8),
                        payload: payload.clone(),
                    },
                );
            }
        }
    }
}

/// Shared in-memory session.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    inner: Arc<Mutex<HubInner>>,
}

impl LoopbackHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Occupy `peer` and return its transport handle.
    pub fn join(&self, peer: PeerId) -> LoopbackTransport {
        let mut inner = self.lock();
        let idx = peer.index();
        inner.connected[idx] = true;
        inner.inboxes[idx].clear();
        debug!(peer = idx, "loopback peer joined");
        LoopbackTransport {
            hub: self.clone(),
            local: peer,
        }
    }

    /// Raise a create event for `peer` on every other connected slot.
    pub fn announce_create(&self, peer: PeerId, descriptor: Vec<u8>) {
        let mut inner = self.lock();
        for to in (0..MAX_PEERS).filter(|&to| to != peer.index()) {
            inner.deliver_event(
                to,
                TransportEvent::PeerCreate {
                    peer,
                    descriptor: descriptor.clone(),
                },
            );
        }
    }

    /// Raise a text event on every connected slot.
    pub fn announce_text(&self, peer: PeerId, text: &str) {
        let mut inner = self.lock();
        for to in 0..MAX_PEERS {
            inner.deliver_event(
                to,
                TransportEvent::PeerMessage {
                    peer,
                    text: text.to_string(),
                },
            );
        }
    }

    /// Drop every message and turn sent by `peer` without disconnecting it.
    pub fn silence(&self, peer: PeerId) {
        let mut inner = self.lock();
        let idx = peer.index();
        for receiver in 0..MAX_PEERS {
            inner.turns[receiver][idx].clear();
            inner.inboxes[receiver].retain(|m| m.sender != idx);
        }
    }

    /// Whether `peer` is connected at the transport level.
    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.lock().connected[peer.index()]
    }
}

/// One peer's handle on a `LoopbackHub`.
pub struct LoopbackTransport {
    hub: LoopbackHub,
    local: PeerId,
}

impl Transport for LoopbackTransport {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    fn send_message(&mut self, target: Target, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.hub.lock();
        let me = self.local.index();
        if !inner.connected[me] {
            return Err(TransportError::NotConnected);
        }
        let message = Inbound {
            sender: me,
            data: data.to_vec(),
        };
        match target {
            Target::Peer(peer) => {
                let to = peer.index();
                if !inner.connected[to] {
                    return Err(TransportError::InvalidPlayer);
                }
                inner.inboxes[to].push_back(message);
            }
            Target::Broadcast => {
                for to in 0..MAX_PEERS {
                    if to != me && inner.connected[to] {
                        inner.inboxes[to].push_back(message.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn receive_message(&mut self) -> Result<Option<Inbound>, TransportError> {
        let mut inner = self.hub.lock();
        let me = self.local.index();
        if !inner.connected[me] {
            return Err(TransportError::NotConnected);
        }
        Ok(inner.inboxes[me].pop_front())
    }

    fn send_turn(&mut self, turn: u32) -> Result<(), TransportError> {
        let mut inner = self.hub.lock();
        let me = self.local.index();
        if !inner.connected[me] {
            return Err(TransportError::NotConnected);
        }
        for receiver in 0..MAX_PEERS {
            if inner.connected[receiver] {
                inner.turns[receiver][me].push_back(turn);
            }
        }
        Ok(())
    }

    fn turns_in_transit(&self) -> u32 {
        let inner = self.hub.lock();
        let me = self.local.index();
        (0..MAX_PEERS)
            .filter(|&r| inner.connected[r])
            .map(|r| inner.turns[r][me].len())
            .max()
            .unwrap_or(0) as u32
    }

    fn receive_turns(&mut self) -> Result<TurnRound, TransportError> {
        let mut inner = self.hub.lock();
        let me = self.local.index();
        if !inner.connected[me] {
            return Err(TransportError::NotConnected);
        }

        let mut round = TurnRound::default();
        let mut complete = true;
        for slot in 0..MAX_PEERS {
            let connected = inner.connected[slot];
            let has_turn = !inner.turns[me][slot].is_empty();
            round.links[slot] = PeerLink {
                connected,
                active: connected && has_turn,
                turn: None,
            };
            if connected && !has_turn {
                complete = false;
            }
        }

        // Turns stay queued until every connected peer has delivered.
        if complete {
            for slot in 0..MAX_PEERS {
                if inner.connected[slot] {
                    round.links[slot].turn = inner.turns[me][slot].pop_front();
                }
            }
        }
        round.complete = complete;
        Ok(round)
    }

    fn drop_peer(&mut self, peer: PeerId, reason: LeaveReason) -> Result<(), TransportError> {
        let mut inner = self.hub.lock();
        if !inner.connected[peer.index()] {
            return Err(TransportError::InvalidPlayer);
        }
        debug!(peer = peer.index(), by = self.local.index(), ?reason, "loopback drop");
        inner.remove(peer.index(), reason);
        Ok(())
    }

    fn register_event_handler(&mut self, kind: EventKind) -> Result<(), TransportError> {
        let mut inner = self.hub.lock();
        inner.registered[self.local.index()].insert(kind);
        Ok(())
    }

    fn unregister_event_handler(&mut self, kind: EventKind) -> Result<(), TransportError> {
        let mut inner = self.hub.lock();
        inner.registered[self.local.index()].remove(&kind);
        Ok(())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        let mut inner = self.hub.lock();
        inner.events[self.local.index()].pop_front()
    }

    fn leave_game(&mut self, reason: LeaveReason) -> Result<(), TransportError> {
        let mut inner = self.hub.lock();
        let me = self.local.index();
        if inner.connected[me] {
            inner.remove(me, reason);
        }
        inner.registered[me].clear();
        inner.events[me].clear();
        Ok(())
    }
}
