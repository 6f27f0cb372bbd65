//! Connection State Tracker
//!
//! Applies transport events to the peer slots and announces departures.
//! Leave events only mark the slot; the teardown runs in
//! `drain_departures`, once per tick and after every received message,
//! because the simulation may be buffering and must not be touched yet.

use tracing::{debug, info};

use crate::error::CoordinatorResult;
use crate::network::descriptor::GameDescriptor;
use crate::session::delta::{release_sender, DeltaQueue};
use crate::session::notify::Notification;
use crate::session::peer::{LeaveReason, PeerId, PeerState};
use crate::session::state::SessionState;
use crate::session::world::{CommandInterpreter, World};

/// A peer created its presence in the game.
///
/// The descriptor it carries must match ours; a mismatch is fatal.
pub fn on_peer_create(
    state: &mut SessionState,
    local: &GameDescriptor,
    peer: PeerId,
    descriptor: &[u8],
) -> CoordinatorResult<GameDescriptor> {
    let remote = GameDescriptor::decode(descriptor)?;
    remote.check_compatible(local)?;

    let slot = state.slot_mut(peer);
    match slot.state {
        PeerState::Left { .. } => {
            debug!(peer = %peer, "create while departure pending, kept for drain");
        }
        PeerState::Active => {}
        _ => slot.state = PeerState::Connected,
    }
    slot.turn_bit = true;
    info!(peer = %peer, seed = remote.seed, "peer created");
    Ok(remote)
}

/// A peer left or was dropped. `payload` may carry the reason code.
pub fn on_peer_leave(
    state: &mut SessionState,
    deltas: &mut DeltaQueue,
    peer: PeerId,
    payload: &[u8],
) {
    let reason = LeaveReason::from_payload(payload);
    if reason == LeaveReason::Ending {
        state.somebody_won = true;
    }

    let slot = state.slot_mut(peer);
    let was_active = match slot.state {
        PeerState::Left { was_active, .. } => was_active,
        other => other.is_active(),
    };
    slot.state = PeerState::Left { reason, was_active };
    slot.turn_bit = false;
    slot.send_delta = false;
    slot.pack_offset = 0;
    slot.record.clear();
    slot.link = Default::default();

    let dropped = deltas.remove_peer(peer);
    release_sender(state, peer);
    info!(peer = %peer, ?reason, was_active, dropped_transfers = dropped, "peer left");
}

/// Announce and tear down every departed slot.
///
/// While the interpreter buffers, the departure is handed to it for replay
/// and the slot keeps its presence until `player_left` is called.
pub fn drain_departures<W: World, C: CommandInterpreter>(
    state: &mut SessionState,
    world: &mut W,
    commands: &mut C,
) {
    for peer in PeerId::all() {
        let PeerState::Left { reason, was_active } = state.peer_state(peer) else {
            continue;
        };

        if commands.is_buffering() {
            debug!(peer = %peer, ?reason, "departure queued while buffering");
            commands.queue_departure(peer, reason);
            state.slot_mut(peer).state = if was_active {
                PeerState::Active
            } else {
                PeerState::Disconnected
            };
            continue;
        }

        if was_active {
            world.remove_presence(peer);
            if reason == LeaveReason::Ending {
                state.somebody_won = true;
            }
            let name = world.peer_name(peer);
            state.notify(Notification::departure(peer, name, reason));
            state.active_peers = state.active_peers.saturating_sub(1);
        }
        // A create that arrived after the leave survives the reset.
        let slot = state.slot_mut(peer);
        let turn_bit = slot.turn_bit;
        slot.reset();
        slot.turn_bit = turn_bit;
    }
}

/// Replay a departure queued while buffering.
pub fn player_left<W: World, C: CommandInterpreter>(
    state: &mut SessionState,
    world: &mut W,
    commands: &mut C,
    peer: PeerId,
    reason: LeaveReason,
) {
    let was_active = state.peer_state(peer).is_active();
    state.slot_mut(peer).state = PeerState::Left { reason, was_active };
    drain_departures(state, world, commands);
}

// =============================================================================
// TESTS
// =============================================================================
