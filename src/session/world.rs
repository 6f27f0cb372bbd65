//! Simulation Collaborators
//!
//! The coordinator never owns simulation state. It reaches the avatars,
//! entity seeds and command interpreter through these two traits.

use crate::network::header::{Tile, Vitals};
use crate::session::peer::{LeaveReason, PeerId};

/// Snapshot of one avatar as the coordinator needs it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Avatar {
    /// Current tile.
    pub tile: Tile,
    /// Predicted next tile.
    pub future: Tile,
    /// Walk target.
    pub target: Tile,
    /// Hit points and base attributes.
    pub vitals: Vitals,
    /// Dungeon level the avatar is on.
    pub level: u8,
    /// Avatar is between levels.
    pub level_changing: bool,
    /// Character level, shown in join notifications.
    pub char_level: u8,
}

/// Simulation surface used by dispatch, seeding and peer lifecycle.
pub trait World {
    /// Number of simulated entities that receive a per-tick seed.
    fn entity_count(&self) -> usize;

    /// Store an entity's seed for the coming tick.
    fn set_entity_seed(&mut self, entity: usize, seed: u32);

    /// Level the local avatar is on.
    fn current_level(&self) -> u8;

    /// Avatar of `peer`, if the simulation has one.
    fn avatar(&self, peer: PeerId) -> Option<Avatar>;

    /// Display name of `peer`.
    fn peer_name(&self, peer: PeerId) -> String;

    /// Record the last tile `peer` reported.
    fn set_last_position(&mut self, peer: PeerId, tile: Tile);

    /// Mirror reported vitals.
    fn set_vitals(&mut self, peer: PeerId, vitals: Vitals);

    /// Whether some avatar stands on `tile`.
    fn is_tile_occupied(&self, tile: Tile) -> bool;

    /// Snap `peer` to `tile` (current and future), keeping the old tile.
    fn teleport(&mut self, peer: PeerId, tile: Tile);

    /// Overwrite the predicted tile.
    fn set_future(&mut self, peer: PeerId, tile: Tile);

    /// Set current and future tile without occupancy bookkeeping.
    fn place(&mut self, peer: PeerId, tile: Tile);

    /// Recompute the walk path toward `target`.
    fn make_path(&mut self, peer: PeerId, target: Tile);

    /// Remove `peer`'s presence: map, portals, missiles.
    fn remove_presence(&mut self, peer: PeerId);

    /// Serialize the local player record.
    fn pack_local_record(&self) -> Vec<u8>;

    /// Load a received player record for `peer`.
    fn unpack_record(&mut self, peer: PeerId, record: &[u8]);

    /// Bring `peer` into the simulation after its record arrived.
    fn activate(&mut self, peer: PeerId);

    /// Export level deltas for a resynchronizing peer, one block per
    /// chunked transfer.
    fn export_delta(&mut self, peer: PeerId) -> Vec<Vec<u8>>;

    /// Entity sync bytes that fit in `budget`.
    fn sync_entities(&mut self, budget: usize) -> Vec<u8>;
}

/// External interpreter of embedded sub-commands.
pub trait CommandInterpreter {
    /// Apply the sub-command at the start of `bytes`; returns bytes
    /// consumed, 0 for malformed or unrecognized input.
    fn apply_command(&mut self, peer: PeerId, bytes: &[u8]) -> usize;

    /// True while game state is buffered and must not be mutated.
    fn is_buffering(&self) -> bool;

    /// Queue a departure to replay once buffering ends.
    fn queue_departure(&mut self, peer: PeerId, reason: LeaveReason);
}
