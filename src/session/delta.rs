//! Delta-Sender Coordination
//!
//! One slot at a time exports level deltas to peers that need to
//! resynchronize. Exports and player records destined for a single peer
//! go through `DeltaQueue`, which sends them as chunked transfers once per
//! tick and forgets anything queued for a peer that leaves.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::network::transport::{Target, Transport, TransportError};
use crate::session::peer::PeerId;
use crate::session::state::SessionState;
use crate::session::transfer::send_chunked;
use crate::session::world::World;

/// One transfer waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransfer {
    /// Destination slot.
    pub peer: PeerId,
    /// Chunk sub-command id.
    pub cmd: u8,
    /// Whole payload.
    pub data: Vec<u8>,
}

/// FIFO of per-peer chunked transfers.
#[derive(Debug, Default)]
pub struct DeltaQueue {
    pending: VecDeque<PendingTransfer>,
}

impl DeltaQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `data` for `peer` under `cmd`. Empty payloads are skipped.
    pub fn push(&mut self, peer: PeerId, cmd: u8, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }
        self.pending.push_back(PendingTransfer { peer, cmd, data });
    }

    /// Drop everything queued for `peer`; returns how many transfers went.
    pub fn remove_peer(&mut self, peer: PeerId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|t| t.peer != peer);
        before - self.pending.len()
    }

    /// Transfers waiting.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Nothing waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Clear the queue.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Send every queued transfer.
    ///
    /// A destination that is no longer in the session is skipped; any other
    /// send failure is fatal.
    pub fn flush<T: Transport>(
        &mut self,
        transport: &mut T,
        config: &CoordinatorConfig,
    ) -> CoordinatorResult<usize> {
        let mut sent = 0;
        while let Some(transfer) = self.pending.pop_front() {
            match send_chunked(
                transport,
                config,
                Target::Peer(transfer.peer),
                transfer.cmd,
                &transfer.data,
            ) {
                Ok(_) => sent += 1,
                Err(TransportError::InvalidPlayer) => {
                    debug!(peer = %transfer.peer, "transfer target gone");
                }
                Err(e) => return Err(CoordinatorError::transport("send_message", e)),
            }
        }
        Ok(sent)
    }
}

/// Export deltas to every slot flagged for one.
pub fn export_pending<W: World>(
    state: &mut SessionState,
    world: &mut W,
    queue: &mut DeltaQueue,
    config: &CoordinatorConfig,
) {
    for peer in PeerId::all() {
        let slot = state.slot_mut(peer);
        if !slot.send_delta {
            continue;
        }
        slot.send_delta = false;
        let blocks = world.export_delta(peer);
        info!(peer = %peer, blocks = blocks.len(), "exporting deltas");
        for block in blocks {
            queue.push(peer, config.delta_cmd, block);
        }
    }
}

/// Unassign the delta-sender role if `peer` held it.
pub fn release_sender(state: &mut SessionState, peer: PeerId) {
    if state.delta_sender == Some(peer) {
        info!(peer = %peer, "delta sender released");
        state.delta_sender = None;
    }
}
