//! Test doubles shared by the unit tests.

use std::collections::{HashSet, VecDeque};

use crate::network::header::{Tile, Vitals};
use crate::network::transport::{
    EventKind, Inbound, Target, Transport, TransportError, TransportEvent, TurnRound,
};
use crate::session::peer::{LeaveReason, PeerId};
use crate::session::world::{Avatar, CommandInterpreter, World};
use crate::MAX_PEERS;

pub fn pid(i: u8) -> PeerId {
    PeerId::new(i)
}

// =============================================================================
// WORLD
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldCall {
    LastPosition(PeerId, Tile),
    Vitals(PeerId, Vitals),
    Teleport(PeerId, Tile),
    Future(PeerId, Tile),
    Place(PeerId, Tile),
    Path(PeerId, Tile),
    Remove(PeerId),
    Unpack(PeerId, usize),
    Activate(PeerId),
    Export(PeerId),
}

pub struct RecordingWorld {
    pub avatars: [Option<Avatar>; MAX_PEERS],
    pub seeds: Vec<u32>,
    pub level: u8,
    pub occupied: HashSet<Tile>,
    pub record: Vec<u8>,
    pub deltas: Vec<Vec<u8>>,
    pub sync: Vec<u8>,
    pub calls: Vec<WorldCall>,
}

impl RecordingWorld {
    pub fn new(entities: usize) -> Self {
        Self {
            avatars: [None; MAX_PEERS],
            seeds: vec![0; entities],
            level: 1,
            occupied: HashSet::new(),
            record: Vec::new(),
            deltas: Vec::new(),
            sync: Vec::new(),
            calls: Vec::new(),
        }
    }

    pub fn with_avatar(mut self, peer: PeerId, avatar: Avatar) -> Self {
        self.avatars[peer.index()] = Some(avatar);
        self
    }

    pub fn calls_for(&self, peer: PeerId) -> Vec<WorldCall> {
        self.calls
            .iter()
            .filter(|c| match c {
                WorldCall::LastPosition(p, _)
                | WorldCall::Vitals(p, _)
                | WorldCall::Teleport(p, _)
                | WorldCall::Future(p, _)
                | WorldCall::Place(p, _)
                | WorldCall::Path(p, _)
                | WorldCall::Remove(p)
                | WorldCall::Unpack(p, _)
                | WorldCall::Activate(p)
                | WorldCall::Export(p) => *p == peer,
            })
            .cloned()
            .collect()
    }

    fn avatar_mut(&mut self, peer: PeerId) -> &mut Avatar {
        self.avatars[peer.index()].get_or_insert_with(Avatar::default)
    }
}

pub fn live_avatar(tile: Tile, level: u8) -> Avatar {
    Avatar {
        tile,
        future: tile,
        target: tile,
        vitals: Vitals {
            hit_points: 100,
            max_hit_points: 100,
            ..Default::default()
        },
        level,
        level_changing: false,
        char_level: 5,
    }
}

impl World for RecordingWorld {
    fn entity_count(&self) -> usize {
        self.seeds.len()
    }

    fn set_entity_seed(&mut self, entity: usize, seed: u32) {
        self.seeds[entity] = seed;
    }

    fn current_level(&self) -> u8 {
        self.level
    }

    fn avatar(&self, peer: PeerId) -> Option<Avatar> {
        self.avatars[peer.index()]
    }

    fn peer_name(&self, peer: PeerId) -> String {
        format!("hero{peer}")
    }

    fn set_last_position(&mut self, peer: PeerId, tile: Tile) {
        self.calls.push(WorldCall::LastPosition(peer, tile));
    }

    fn set_vitals(&mut self, peer: PeerId, vitals: Vitals) {
        self.avatar_mut(peer).vitals = vitals;
        self.calls.push(WorldCall::Vitals(peer, vitals));
    }

    fn is_tile_occupied(&self, tile: Tile) -> bool {
        self.occupied.contains(&tile)
    }

    fn teleport(&mut self, peer: PeerId, tile: Tile) {
        let avatar = self.avatar_mut(peer);
        avatar.tile = tile;
        avatar.future = tile;
        self.occupied.insert(tile);
        self.calls.push(WorldCall::Teleport(peer, tile));
    }

    fn set_future(&mut self, peer: PeerId, tile: Tile) {
        self.avatar_mut(peer).future = tile;
        self.calls.push(WorldCall::Future(peer, tile));
    }

    fn place(&mut self, peer: PeerId, tile: Tile) {
        let avatar = self.avatar_mut(peer);
        avatar.tile = tile;
        avatar.future = tile;
        self.calls.push(WorldCall::Place(peer, tile));
    }

    fn make_path(&mut self, peer: PeerId, target: Tile) {
        self.calls.push(WorldCall::Path(peer, target));
    }

    fn remove_presence(&mut self, peer: PeerId) {
        self.calls.push(WorldCall::Remove(peer));
    }

    fn pack_local_record(&self) -> Vec<u8> {
        self.record.clone()
    }

    fn unpack_record(&mut self, peer: PeerId, record: &[u8]) {
        self.calls.push(WorldCall::Unpack(peer, record.len()));
    }

    fn activate(&mut self, peer: PeerId) {
        self.calls.push(WorldCall::Activate(peer));
    }

    fn export_delta(&mut self, peer: PeerId) -> Vec<Vec<u8>> {
        self.calls.push(WorldCall::Export(peer));
        self.deltas.clone()
    }

    fn sync_entities(&mut self, budget: usize) -> Vec<u8> {
        let n = self.sync.len().min(budget);
        self.sync[..n].to_vec()
    }
}

// =============================================================================
// COMMAND INTERPRETER
// =============================================================================

/// Interprets `[len][len-1 bytes]` commands; `len == 0` is malformed.
#[derive(Default)]
pub struct RecordingInterpreter {
    pub buffering: bool,
    pub applied: Vec<(PeerId, Vec<u8>)>,
    pub departures: Vec<(PeerId, LeaveReason)>,
}

impl CommandInterpreter for RecordingInterpreter {
    fn apply_command(&mut self, peer: PeerId, bytes: &[u8]) -> usize {
        let n = bytes.first().copied().unwrap_or(0) as usize;
        if n == 0 || n > bytes.len() {
            return 0;
        }
        self.applied.push((peer, bytes[..n].to_vec()));
        n
    }

    fn is_buffering(&self) -> bool {
        self.buffering
    }

    fn queue_departure(&mut self, peer: PeerId, reason: LeaveReason) {
        self.departures.push((peer, reason));
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

#[derive(Default)]
pub struct ScriptedTransport {
    pub local: PeerId,
    pub inbox: VecDeque<Inbound>,
    pub receive_error: Option<TransportError>,
    pub send_error: Option<TransportError>,
    pub invalid_targets: HashSet<usize>,
    pub sent: Vec<(Target, Vec<u8>)>,
    pub turns_sent: Vec<u32>,
    pub in_transit: u32,
    pub rounds: VecDeque<TurnRound>,
    pub drops: Vec<(PeerId, LeaveReason)>,
    pub registered: Vec<EventKind>,
    pub refuse_registration: bool,
    pub events: VecDeque<TransportEvent>,
    pub left: Option<LeaveReason>,
}

impl ScriptedTransport {
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            ..Default::default()
        }
    }

    pub fn push_packet(&mut self, sender: usize, data: Vec<u8>) {
        self.inbox.push_back(Inbound { sender, data });
    }
}

impl Transport for ScriptedTransport {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    fn send_message(&mut self, target: Target, data: &[u8]) -> Result<(), TransportError> {
        if let Some(err) = &self.send_error {
            return Err(err.clone());
        }
        if let Target::Peer(p) = target {
            if self.invalid_targets.contains(&p.index()) {
                return Err(TransportError::InvalidPlayer);
            }
        }
        self.sent.push((target, data.to_vec()));
        Ok(())
    }

    fn receive_message(&mut self) -> Result<Option<Inbound>, TransportError> {
        match self.inbox.pop_front() {
            Some(m) => Ok(Some(m)),
            None => match &self.receive_error {
                Some(err) => Err(err.clone()),
                None => Ok(None),
            },
        }
    }

    fn send_turn(&mut self, turn: u32) -> Result<(), TransportError> {
        self.turns_sent.push(turn);
        Ok(())
    }

    fn turns_in_transit(&self) -> u32 {
        self.in_transit
    }

    fn receive_turns(&mut self) -> Result<TurnRound, TransportError> {
        Ok(self.rounds.pop_front().unwrap_or_default())
    }

    fn drop_peer(&mut self, peer: PeerId, reason: LeaveReason) -> Result<(), TransportError> {
        self.drops.push((peer, reason));
        Ok(())
    }

    fn register_event_handler(&mut self, kind: EventKind) -> Result<(), TransportError> {
        if self.refuse_registration {
            return Err(TransportError::Failed("refused".into()));
        }
        self.registered.push(kind);
        Ok(())
    }

    fn unregister_event_handler(&mut self, kind: EventKind) -> Result<(), TransportError> {
        self.registered.retain(|k| *k != kind);
        Ok(())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }

    fn leave_game(&mut self, reason: LeaveReason) -> Result<(), TransportError> {
        self.left = Some(reason);
        Ok(())
    }
}
