//! Outgoing Send Paths
//!
//! Every message is sent at once in its own packet and also framed into
//! one of two batch buffers. Once per turn the batches are drained into a
//! single broadcast packet together with entity sync data, so a lost
//! packet is covered by the next batch. Batching is best effort: a full
//! buffer just skips the copy.

use tracing::{debug, error, trace};

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::network::header::{
    build_packet, check_body_len, PacketHeader, HEADER_SIZE, MAX_PACKET_SIZE,
};
use crate::network::transport::{Target, Transport, TransportError};
use crate::session::coordinator::Coordinator;
use crate::session::peer::PeerId;
use crate::session::state::SessionState;
use crate::session::world::World;

/// Header carrying the local avatar snapshot.
pub fn local_header<W: World>(state: &SessionState, world: &W) -> PacketHeader {
    match world.avatar(state.local) {
        Some(avatar) => PacketHeader::new(avatar.tile, avatar.target, avatar.vitals),
        None => PacketHeader::blank(),
    }
}

/// Send `body` behind the local header. Any failure is fatal.
pub fn send_packet<T: Transport, W: World>(
    state: &SessionState,
    transport: &mut T,
    world: &W,
    target: Target,
    body: &[u8],
) -> CoordinatorResult<()> {
    let packet = build_packet(local_header(state, world), body)?;
    transport.send_message(target, &packet).map_err(|e| {
        error!(?target, error = %e, "send_message failed");
        CoordinatorError::transport("send_message", e)
    })
}

/// Send a latency-tolerant message and queue it for the next batch.
pub fn send_lo_pri<T: Transport, W: World>(
    state: &mut SessionState,
    transport: &mut T,
    world: &W,
    target: Target,
    msg: &[u8],
) -> CoordinatorResult<()> {
    if msg.is_empty() {
        return Ok(());
    }
    check_body_len(msg.len())?;
    if let Err(e) = state.lo_pri.append(msg) {
        trace!(error = %e, "lo-pri batch copy skipped");
    }
    send_packet(state, transport, world, target, msg)
}

/// Send a time-critical message, then emit this turn's batch if it has not
/// gone out yet. `None` only emits the batch.
pub fn send_hi_pri<T: Transport, W: World>(
    state: &mut SessionState,
    transport: &mut T,
    world: &mut W,
    config: &CoordinatorConfig,
    target: Target,
    msg: Option<&[u8]>,
) -> CoordinatorResult<()> {
    if let Some(msg) = msg.filter(|m| !m.is_empty()) {
        check_body_len(msg.len())?;
        if let Err(e) = state.hi_pri.append(msg) {
            trace!(error = %e, "hi-pri batch copy skipped");
        }
        send_packet(state, transport, world, target, msg)?;
    }

    if state.batch_validated {
        return Ok(());
    }
    state.batch_validated = true;

    let body = batch_body(state, world, config);
    trace!(len = body.len(), "broadcasting batch");
    send_packet(state, transport, world, Target::Broadcast, &body)
}

/// Drain both batches and fill the rest with entity sync data.
pub fn batch_body<W: World>(
    state: &mut SessionState,
    world: &mut W,
    config: &CoordinatorConfig,
) -> Vec<u8> {
    let budget = config.normal_msg_size.min(MAX_PACKET_SIZE).saturating_sub(HEADER_SIZE);
    let mut body = Vec::with_capacity(budget);
    let budget = state.hi_pri.drain_up_to(&mut body, budget);
    let budget = state.lo_pri.drain_up_to(&mut body, budget);
    let mut sync = world.sync_entities(budget);
    sync.truncate(budget);
    body.extend_from_slice(&sync);
    body
}

/// Send `msg` to every slot in `mask`. Slots that are not in the session
/// are skipped; any other failure is fatal.
pub fn send_msg_packet<T: Transport, W: World>(
    state: &SessionState,
    transport: &mut T,
    world: &W,
    mask: u8,
    msg: &[u8],
) -> CoordinatorResult<()> {
    let packet = build_packet(local_header(state, world), msg)?;
    for peer in PeerId::all().filter(|p| mask & p.mask() != 0) {
        match transport.send_message(Target::Peer(peer), &packet) {
            Ok(()) => {}
            Err(TransportError::InvalidPlayer) => {
                debug!(peer = %peer, "masked peer not in session");
            }
            Err(e) => {
                error!(peer = %peer, error = %e, "send_message failed");
                return Err(CoordinatorError::transport("send_message", e));
            }
        }
    }
    Ok(())
}

impl<T: Transport> Coordinator<T> {
    /// Send a latency-tolerant message to `target`.
    ///
    /// A message too large for one packet is rejected with
    /// `OversizedMessage` and does not end the session.
    pub fn send_lo_pri<W: World>(&mut self, world: &W, target: Target, msg: &[u8]) -> CoordinatorResult<()> {
        self.ensure_running()?;
        check_body_len(msg.len())?;
        let result = send_lo_pri(&mut self.state, &mut self.transport, world, target, msg);
        self.finish(result)
    }

    /// Send a time-critical message to `target`.
    pub fn send_hi_pri<W: World>(
        &mut self,
        world: &mut W,
        target: Target,
        msg: Option<&[u8]>,
    ) -> CoordinatorResult<()> {
        self.ensure_running()?;
        if let Some(msg) = msg {
            check_body_len(msg.len())?;
        }
        let result = send_hi_pri(
            &mut self.state,
            &mut self.transport,
            world,
            &self.config,
            target,
            msg,
        );
        self.finish(result)
    }

    /// Send to every slot whose bit is set in `mask`.
    pub fn send_msg_packet<W: World>(&mut self, world: &W, mask: u8, msg: &[u8]) -> CoordinatorResult<()> {
        self.ensure_running()?;
        check_body_len(msg.len())?;
        let result = send_msg_packet(&self.state, &mut self.transport, world, mask, msg);
        self.finish(result)
    }
}

// =============================================================================
// TESTS
// =============================================================================
