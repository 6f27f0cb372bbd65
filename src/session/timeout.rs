//! Timeout & Drop Arbiter
//!
//! When turns stop arriving the session waits out a grace period, then
//! decides from the transport's link view who is at fault. Exactly one
//! peer (the lowest-indexed responsive one) issues drops, so peers never
//! race each other with conflicting requests.
//!
//! ```text
//!   stall ─▶ < grace ─▶ wait
//!         ─▶ > give-up ─▶ TimedOut
//!         ─▶ otherwise: |active| vs |inactive|
//!              fewer active      ─▶ destroyed
//!              tie, lowest idle  ─▶ destroyed
//!              tie or majority   ─▶ lowest active drops the idle ones
//! ```

use std::time::Instant;

use tracing::{info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::network::transport::Transport;
use crate::session::peer::{LeaveReason, PeerId, PeerSlot};
use crate::session::state::SessionState;
use crate::MAX_PEERS;

/// What the arbiter decided for one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing for the local peer to do.
    Stand,
    /// Quorum lost; the session cannot continue.
    Destroyed,
    /// We are the authority: drop every connected but idle peer.
    DropInactive,
}

/// Decide from the link view alone.
pub fn arbitrate(slots: &[PeerSlot; MAX_PEERS], local: PeerId) -> Verdict {
    let mut active = 0usize;
    let mut inactive = 0usize;
    let mut lowest_connected = None;
    let mut lowest_active = None;

    for peer in PeerId::all() {
        let slot = &slots[peer.index()];
        if !slot.is_connected() {
            continue;
        }
        lowest_connected.get_or_insert(peer);
        if slot.is_responsive() {
            active += 1;
            lowest_active.get_or_insert(peer);
        } else {
            inactive += 1;
        }
    }

    if lowest_connected.is_none() {
        return Verdict::Stand;
    }

    let authority = lowest_active == Some(local);
    if active < inactive {
        Verdict::Destroyed
    } else if active == inactive {
        if lowest_connected != lowest_active {
            Verdict::Destroyed
        } else if authority {
            Verdict::DropInactive
        } else {
            Verdict::Stand
        }
    } else if authority {
        Verdict::DropInactive
    } else {
        Verdict::Stand
    }
}

/// Start (or restart) the stall clock.
pub fn net_ping(state: &mut SessionState, now: Instant) {
    state.timeout_since = Some(now);
}

/// Run one arbitration poll for a stalled tick.
///
/// The first stall only starts the clock. Past the give-up threshold the
/// session is abandoned with `TimedOut`; a destroyed verdict marks the
/// session and returns `SessionDestroyed`.
pub fn check_timeout<T: Transport>(
    state: &mut SessionState,
    transport: &mut T,
    config: &CoordinatorConfig,
    now: Instant,
) -> CoordinatorResult<()> {
    let Some(since) = state.timeout_since else {
        net_ping(state, now);
        return Ok(());
    };

    let stalled = now.saturating_duration_since(since);
    if stalled > config.timeout_give_up() {
        warn!(stalled_ms = stalled.as_millis() as u64, "giving up on stalled session");
        return Err(CoordinatorError::TimedOut);
    }
    if stalled < config.timeout_grace() {
        return Ok(());
    }

    match arbitrate(&state.slots, state.local) {
        Verdict::Stand => Ok(()),
        Verdict::Destroyed => {
            warn!(local = %state.local, "quorum lost, session destroyed");
            state.destroyed = true;
            Err(CoordinatorError::SessionDestroyed)
        }
        Verdict::DropInactive => {
            for peer in PeerId::all() {
                let slot = state.slot(peer);
                if slot.is_connected() && !slot.is_responsive() {
                    info!(peer = %peer, "dropping unresponsive peer");
                    transport
                        .drop_peer(peer, LeaveReason::Drop)
                        .map_err(|e| CoordinatorError::transport("drop_peer", e))?;
                }
            }
            Ok(())
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
