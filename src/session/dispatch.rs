//! Dispatch Loop
//!
//! Drains the transport every tick. Each packet's header updates the
//! sender's mirrored avatar, then the body is split into sub-commands:
//! record chunks are reassembled here, everything else goes to the
//! command interpreter. Malformed packets are dropped without touching
//! any state.

use tracing::{debug, error, instrument, trace};

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::network::header::{parse_packet, PacketHeader};
use crate::network::transport::Transport;
use crate::session::coordinator::Coordinator;
use crate::session::delta::DeltaQueue;
use crate::session::peer::{PeerId, PeerState};
use crate::session::state::SessionState;
use crate::session::tracker::drain_departures;
use crate::session::transfer::receive_record_chunk;
use crate::session::world::{Avatar, CommandInterpreter, World};

/// Tiles a remote avatar may drift before it is snapped to its report.
const TELEPORT_DISTANCE: u8 = 3;

/// Tiles a prediction may run ahead before it is collapsed.
const PREDICTION_DISTANCE: u8 = 1;

/// Apply a packet header from `peer` to the mirrored avatar.
pub fn apply_header<W: World, C: CommandInterpreter>(
    state: &mut SessionState,
    world: &mut W,
    commands: &C,
    peer: PeerId,
    header: &PacketHeader,
) {
    if state.peer_state(peer) == PeerState::Disconnected {
        debug!(peer = %peer, "first packet from peer");
        state.slot_mut(peer).state = PeerState::Connected;
    }

    world.set_last_position(peer, header.position);
    if peer == state.local {
        return;
    }

    world.set_vitals(peer, header.vitals);
    if commands.is_buffering() || !state.peer_state(peer).is_active() {
        return;
    }
    let Some(avatar) = world.avatar(peer) else {
        return;
    };
    if avatar.vitals.hit_points == 0 {
        return;
    }
    reconcile_avatar(world, peer, &avatar, header);
}

/// Pull a live remote avatar toward its reported position.
///
/// On our level: snap when it drifted too far and the tile is free,
/// collapse a runaway prediction, then path toward the reported target.
/// Elsewhere: place it directly.
pub fn reconcile_avatar<W: World>(world: &mut W, peer: PeerId, avatar: &Avatar, header: &PacketHeader) {
    if avatar.level != world.current_level() || avatar.level_changing {
        world.place(peer, header.position);
        return;
    }

    let mut tile = avatar.tile;
    let mut future = avatar.future;
    if header.position.farther_than(tile, TELEPORT_DISTANCE) && !world.is_tile_occupied(header.position) {
        trace!(peer = %peer, from = ?tile, to = ?header.position, "teleport correction");
        world.teleport(peer, header.position);
        tile = header.position;
        future = header.position;
    }
    if future.farther_than(tile, PREDICTION_DISTANCE) {
        world.set_future(peer, tile);
    }
    world.make_path(peer, header.target);
}

/// Consume the sub-commands in `body`; returns the bytes consumed.
///
/// Stops at the first sub-command nobody recognizes.
pub fn dispatch_commands<W: World, C: CommandInterpreter>(
    state: &mut SessionState,
    world: &mut W,
    commands: &mut C,
    deltas: &mut DeltaQueue,
    config: &CoordinatorConfig,
    peer: PeerId,
    body: &[u8],
) -> usize {
    let mut rest = body;
    while let Some(&cmd) = rest.first() {
        let used = if config.is_record_cmd(cmd) {
            receive_record_chunk(state, world, deltas, config, peer, rest)
        } else {
            commands.apply_command(peer, rest)
        };
        if used == 0 || used > rest.len() {
            debug!(peer = %peer, cmd, remaining = rest.len(), "unparsed sub-command, dropping rest");
            break;
        }
        rest = &rest[used..];
    }
    body.len() - rest.len()
}

impl<T: Transport> Coordinator<T> {
    /// Drain departures, the loopback queue and the transport.
    ///
    /// Returns the number of accepted packets.
    #[instrument(skip_all, fields(local = %self.state.local))]
    pub fn process_network_packets<W: World, C: CommandInterpreter>(
        &mut self,
        world: &mut W,
        commands: &mut C,
    ) -> CoordinatorResult<usize> {
        self.ensure_running()?;
        let result = self.drain_inbound(world, commands);
        self.finish(result)
    }

    fn drain_inbound<W: World, C: CommandInterpreter>(
        &mut self,
        world: &mut W,
        commands: &mut C,
    ) -> CoordinatorResult<usize> {
        drain_departures(&mut self.state, world, commands);

        let local = self.state.local;
        while let Some(msg) = self.loopback.pop_front() {
            dispatch_commands(
                &mut self.state,
                world,
                commands,
                &mut self.deltas,
                &self.config,
                local,
                &msg,
            );
        }

        let mut accepted = 0;
        loop {
            let inbound = match self.transport.receive_message() {
                Ok(Some(inbound)) => inbound,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "receive_message failed");
                    return Err(CoordinatorError::transport("receive_message", e));
                }
            };
            drain_departures(&mut self.state, world, commands);

            let (header, body) = match parse_packet(inbound.sender, &inbound.data) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!(sender = inbound.sender, error = %e, "discarding packet");
                    continue;
                }
            };
            let Some(peer) = PeerId::from_index(inbound.sender) else {
                continue;
            };

            accepted += 1;
            apply_header(&mut self.state, world, commands, peer, &header);
            dispatch_commands(
                &mut self.state,
                world,
                commands,
                &mut self.deltas,
                &self.config,
                peer,
                body,
            );
        }
        Ok(accepted)
    }
}

// =============================================================================
// TESTS
// =============================================================================
