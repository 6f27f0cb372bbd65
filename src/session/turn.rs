//! Turn Reconciler
//!
//! Turn values travel as a 32-bit word whose high bit asks for a delta
//! export. They are decoded once into a `TurnValue` at the transport
//! boundary; everything past that works with the tagged form.
//!
//! Collection is gated by two countdowns. Between collections the tick
//! proceeds without touching the transport.

use tracing::{debug, error, trace, warn};

use crate::config::CoordinatorConfig;
use crate::core::seed::{entity_seeds, loop_count_for_turn};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::network::transport::{Transport, TurnRound};
use crate::session::peer::PeerId;
use crate::session::state::SessionState;
use crate::session::world::World;

/// Wire bit carrying the delta request.
pub const TURN_DELTA_FLAG: u32 = 0x8000_0000;

/// Mask of the count part.
pub const TURN_COUNT_MASK: u32 = 0x7FFF_FFFF;

/// All-ones count. A counter reaching it is folded back to 16 bits.
pub const TURN_SENTINEL: u32 = TURN_COUNT_MASK;

/// Collections between turns, counted in packet steps.
const SYNC_INTERVAL: u32 = 4;

// =============================================================================
// TURN VALUE
// =============================================================================

/// Decoded turn word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TurnValue {
    /// Absolute turn count, 31 bits.
    pub count: u32,
    /// Sender asks for the delta-sender role to be sorted out.
    pub delta_signal: bool,
}

impl TurnValue {
    /// Build a turn value; `count` is truncated to 31 bits.
    pub const fn new(count: u32, delta_signal: bool) -> Self {
        Self {
            count: count & TURN_COUNT_MASK,
            delta_signal,
        }
    }

    /// Decode a wire word.
    pub const fn from_wire(raw: u32) -> Self {
        Self::new(raw, raw & TURN_DELTA_FLAG != 0)
    }

    /// Encode to a wire word.
    pub const fn to_wire(self) -> u32 {
        let flag = if self.delta_signal { TURN_DELTA_FLAG } else { 0 };
        flag | (self.count & TURN_COUNT_MASK)
    }
}

/// Outcome of one `recv_turns` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPoll {
    /// A collection was due and not every peer delivered.
    Stalled,
    /// The tick may advance.
    Ready {
        /// A packet step elapsed this tick.
        received: bool,
    },
}

// =============================================================================
// RECONCILIATION
// =============================================================================

/// Apply a delta request carried by `sender`'s turn.
///
/// The lowest connected slot other than the sender answers it. If that is
/// us, we owe the sender a delta export; if we are the sender, the answering
/// slot becomes our delta sender (unassigned when nobody else is connected).
pub fn handle_delta_signal(state: &mut SessionState, sender: PeerId) {
    let responder = state.lowest_connected_except(sender);
    if responder == Some(state.local) {
        debug!(peer = %sender, "delta export requested");
        state.slot_mut(sender).send_delta = true;
    } else if sender == state.local {
        debug!(sender = ?responder, "delta sender assigned");
        state.delta_sender = responder;
    }
}

/// Fold one received turn into the local counters.
///
/// Returns `true` when the turn moved the baseline forward. Turns at or
/// below what we already account for are ignored.
pub fn reconcile_turn(
    state: &mut SessionState,
    config: &CoordinatorConfig,
    sender: PeerId,
    turn: TurnValue,
) -> bool {
    if turn.delta_signal {
        handle_delta_signal(state, sender);
    }

    let mut abs = turn.count;
    if state.sent_this_cycle >= config.turns_in_transit.wrapping_add(abs) {
        return false;
    }

    // Only reachable from a corrupt counter; folded rather than trusted.
    if abs >= TURN_SENTINEL {
        warn!(peer = %sender, turn = abs, "turn counter at sentinel, folding to 16 bits");
        abs &= 0xFFFF;
    }
    state.sent_this_cycle = abs.wrapping_add(config.turns_in_transit);
    state.loop_count = loop_count_for_turn(abs, config.net_update_rate);
    debug!(
        peer = %sender,
        turn = abs,
        loop_count = state.loop_count,
        "adopted turn baseline"
    );
    true
}

/// Copy link status from a collected round and reconcile delivered turns.
pub fn apply_round(state: &mut SessionState, config: &CoordinatorConfig, round: &TurnRound) {
    for peer in PeerId::all() {
        state.slot_mut(peer).link = round.links[peer.index()];
    }
    if !round.complete {
        return;
    }
    for peer in PeerId::all() {
        if let Some(raw) = round.links[peer.index()].turn {
            state.slot_mut(peer).last_turn = Some(raw);
            reconcile_turn(state, config, peer, TurnValue::from_wire(raw));
        }
    }
}

/// Advance the loop counter and hand every entity its seed for the tick.
pub fn advance_seeds<W: World>(state: &mut SessionState, world: &mut W) {
    state.loop_count = state.loop_count.wrapping_add(1);
    let count = world.entity_count();
    for (entity, seed) in entity_seeds(state.loop_count, count).enumerate() {
        world.set_entity_seed(entity, seed);
    }
    trace!(loop_count = state.loop_count, entities = count, "seeds advanced");
}

// =============================================================================
// EXCHANGE
// =============================================================================

/// Top up the transport's turns in flight, starting from `cur`.
///
/// The first turn sent carries the pending delta request. Returns the next
/// turn value to send.
pub fn send_and_recv_turn<T: Transport>(
    state: &mut SessionState,
    transport: &mut T,
    config: &CoordinatorConfig,
    cur: u32,
    delta: u32,
) -> CoordinatorResult<u32> {
    let mut cur = cur;
    let mut in_transit = transport.turns_in_transit();
    while in_transit < config.turns_in_transit {
        in_transit += 1;
        let turn = TurnValue::new(cur, state.request_delta);
        transport.send_turn(turn.to_wire()).map_err(|e| {
            error!(error = %e, "send_turn failed");
            CoordinatorError::transport("send_turn", e)
        })?;
        state.request_delta = false;
        trace!(turn = turn.count, delta_signal = turn.delta_signal, "turn sent");

        cur = cur.wrapping_add(delta);
        if cur >= TURN_SENTINEL {
            cur &= 0xFFFF;
        }
    }
    Ok(cur)
}

/// Step the collection countdowns and collect turns when due.
pub fn recv_turns<T: Transport>(
    state: &mut SessionState,
    transport: &mut T,
    config: &CoordinatorConfig,
) -> CoordinatorResult<TurnPoll> {
    let clock = &mut state.turn_clock;
    clock.packet_countdown = clock.packet_countdown.saturating_sub(1);
    if clock.packet_countdown != 0 {
        return Ok(TurnPoll::Ready { received: false });
    }

    clock.sync_countdown = clock.sync_countdown.saturating_sub(1);
    clock.packet_countdown = config.net_update_rate.max(1);
    if clock.sync_countdown != 0 {
        return Ok(TurnPoll::Ready { received: true });
    }

    let round = transport.receive_turns().map_err(|e| {
        error!(error = %e, "receive_turns failed");
        CoordinatorError::transport("receive_turns", e)
    })?;
    apply_round(state, config, &round);

    if !round.complete {
        state.turn_clock.sync_countdown = 1;
        state.turn_clock.packet_countdown = 1;
        trace!("turn collection stalled");
        return Ok(TurnPoll::Stalled);
    }

    state.turn_clock.sync_countdown = SYNC_INTERVAL;
    Ok(TurnPoll::Ready { received: true })
}

// =============================================================================
// TESTS
// =============================================================================
