//! Chunked Record Transfer
//!
//! Player records and delta exports are larger than one packet. They go
//! out as a run of chunks, each in its own packet with a zeroed header:
//!
//! ```text
//! [cmd u8][offset u16 LE][bytes u16 LE][payload: bytes]
//! ```
//!
//! Record chunks are reassembled per sender. A chunk whose offset does
//! not continue the running total restarts the transfer.

use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::network::header::{build_packet, PacketHeader, HEADER_SIZE, MAX_PACKET_SIZE};
use crate::network::transport::{Target, Transport, TransportError};
use crate::session::delta::DeltaQueue;
use crate::session::notify::Notification;
use crate::session::peer::{PeerId, PeerState};
use crate::session::state::SessionState;
use crate::session::world::World;

/// Size of the chunk prefix.
pub const CHUNK_HEADER_SIZE: usize = 5;

/// Prefix of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Sub-command id.
    pub cmd: u8,
    /// Position of the payload in the whole transfer.
    pub offset: u16,
    /// Payload length.
    pub bytes: u16,
}

impl ChunkHeader {
    /// Encode the prefix.
    pub fn encode(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut out = [0u8; CHUNK_HEADER_SIZE];
        out[0] = self.cmd;
        out[1..3].copy_from_slice(&self.offset.to_le_bytes());
        out[3..5].copy_from_slice(&self.bytes.to_le_bytes());
        out
    }

    /// Split a chunk into prefix and payload. `None` if truncated.
    pub fn decode(bytes: &[u8]) -> Option<(Self, &[u8])> {
        if bytes.len() < CHUNK_HEADER_SIZE {
            return None;
        }
        let header = Self {
            cmd: bytes[0],
            offset: u16::from_le_bytes([bytes[1], bytes[2]]),
            bytes: u16::from_le_bytes([bytes[3], bytes[4]]),
        };
        let end = CHUNK_HEADER_SIZE + header.bytes as usize;
        let payload = bytes.get(CHUNK_HEADER_SIZE..end)?;
        Some((header, payload))
    }

    /// Bytes this chunk occupies in a packet body.
    pub fn wire_len(&self) -> usize {
        CHUNK_HEADER_SIZE + self.bytes as usize
    }
}

// =============================================================================
// SENDING
// =============================================================================

/// Split `data` into complete packets of at most `largest_msg_size` bytes.
pub fn chunk_packets(cmd: u8, data: &[u8], largest_msg_size: usize) -> Vec<Vec<u8>> {
    let data = if data.len() > u16::MAX as usize {
        warn!(len = data.len(), "transfer too large, truncating");
        &data[..u16::MAX as usize]
    } else {
        data
    };

    let body_max = largest_msg_size
        .min(MAX_PACKET_SIZE)
        .saturating_sub(HEADER_SIZE + CHUNK_HEADER_SIZE)
        .max(1);

    let mut packets = Vec::with_capacity(data.len().div_ceil(body_max));
    let mut offset = 0usize;
    for piece in data.chunks(body_max) {
        let chunk = ChunkHeader {
            cmd,
            offset: offset as u16,
            bytes: piece.len() as u16,
        };
        let mut body = Vec::with_capacity(chunk.wire_len());
        body.extend_from_slice(&chunk.encode());
        body.extend_from_slice(piece);
        match build_packet(PacketHeader::blank(), &body) {
            Ok(packet) => packets.push(packet),
            Err(e) => {
                warn!(error = %e, "chunk does not fit a packet");
                break;
            }
        }
        offset += piece.len();
    }
    packets
}

/// Send `data` to `target` as a run of chunks.
pub fn send_chunked<T: Transport>(
    transport: &mut T,
    config: &CoordinatorConfig,
    target: Target,
    cmd: u8,
    data: &[u8],
) -> Result<usize, TransportError> {
    let packets = chunk_packets(cmd, data, config.largest_msg_size);
    for packet in &packets {
        transport.send_message(target, packet)?;
    }
    Ok(packets.len())
}

// =============================================================================
// REASSEMBLY
// =============================================================================

/// Consume one record chunk from `sender`; returns the bytes consumed,
/// 0 if the chunk is truncated.
///
/// The first chunk of an announcement queues our own record back to the
/// sender as an acknowledgement.
pub fn receive_record_chunk<W: World>(
    state: &mut SessionState,
    world: &mut W,
    deltas: &mut DeltaQueue,
    config: &CoordinatorConfig,
    sender: PeerId,
    bytes: &[u8],
) -> usize {
    let Some((chunk, payload)) = ChunkHeader::decode(bytes) else {
        debug!(peer = %sender, len = bytes.len(), "truncated record chunk");
        return 0;
    };
    let consumed = chunk.wire_len();
    if sender == state.local {
        return consumed;
    }

    let offset = chunk.offset as usize;
    let slot = state.slot_mut(sender);
    if slot.pack_offset != offset {
        slot.pack_offset = 0;
        if offset != 0 {
            debug!(peer = %sender, offset, "out-of-order record chunk, waiting for restart");
            return consumed;
        }
    }

    if chunk.cmd == config.announce_cmd && slot.pack_offset == 0 {
        deltas.push(sender, config.ack_cmd, world.pack_local_record());
    }

    let end = offset + payload.len();
    if end > config.record_size {
        debug!(peer = %sender, end, "record chunk overruns record");
        slot.pack_offset = 0;
        return consumed;
    }
    if slot.record.len() != config.record_size {
        slot.record.resize(config.record_size, 0);
    }
    slot.record[offset..end].copy_from_slice(payload);
    slot.pack_offset = end;

    if end == config.record_size {
        complete_record(state, world, sender);
    }
    consumed
}

/// Load a fully received record and bring the peer into the simulation.
///
/// A record for a peer that is already active only refreshes it.
pub fn complete_record<W: World>(state: &mut SessionState, world: &mut W, peer: PeerId) {
    let slot = state.slot_mut(peer);
    slot.pack_offset = 0;
    let record = std::mem::take(&mut slot.record);
    world.unpack_record(peer, &record);

    if slot.state.is_active() {
        debug!(peer = %peer, "record refreshed");
        return;
    }

    world.activate(peer);
    slot.state = PeerState::Active;
    let turn_bit = slot.turn_bit;
    state.active_peers = state.active_peers.saturating_add(1);

    let name = world.peer_name(peer);
    let level = world.avatar(peer).map(|a| a.char_level).unwrap_or_default();
    info!(peer = %peer, %name, level, "peer active");
    state.notify(if turn_bit {
        Notification::Joined { peer, name, level }
    } else {
        Notification::AlreadyInGame { peer, name, level }
    });
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::header::parse_packet;
    use crate::testing::{pid, RecordingWorld, ScriptedTransport, WorldCall};

    fn config() -> CoordinatorConfig {
        CoordinatorConfig {
            record_size: 100,
            largest_msg_size: HEADER_SIZE + CHUNK_HEADER_SIZE + 40,
            ..Default::default()
        }
    }

    fn chunk(cmd: u8, offset: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = ChunkHeader {
            cmd,
            offset,
            bytes: payload.len() as u16,
        }
        .encode()
        .to_vec();
        out.extend_from_slice(payload);
        out
    }

    /// Feed a whole record as the sender would chunk it.
    fn feed_record(
        state: &mut SessionState,
        world: &mut RecordingWorld,
        deltas: &mut DeltaQueue,
        config: &CoordinatorConfig,
        sender: PeerId,
        cmd: u8,
    ) {
        let record = vec![7u8; config.record_size];
        for packet in chunk_packets(cmd, &record, config.largest_msg_size) {
            let (_, body) = parse_packet(sender.index(), &packet).unwrap();
            let used = receive_record_chunk(state, world, deltas, config, sender, body);
            assert_eq!(used, body.len());
        }
    }

    #[test]
    fn test_chunk_header_layout() {
        let header = ChunkHeader {
            cmd: 0x36,
            offset: 0x0102,
            bytes: 3,
        };
        assert_eq!(header.encode(), [0x36, 0x02, 0x01, 3, 0]);

        let mut bytes = header.encode().to_vec();
        bytes.extend_from_slice(&[9, 9, 9, 1]);
        let (decoded, payload) = ChunkHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(payload, &[9, 9, 9]);

        assert!(ChunkHeader::decode(&bytes[..6]).is_none());
    }

    #[test]
    fn test_chunk_packets_respect_size() {
        let config = config();
        let data: Vec<u8> = (0..100).collect();
        let packets = chunk_packets(0x36, &data, config.largest_msg_size);
        assert_eq!(packets.len(), 3);

        let mut rebuilt = Vec::new();
        for packet in &packets {
            assert!(packet.len() <= config.largest_msg_size);
            let (header, body) = parse_packet(1, packet).unwrap();
            assert_eq!(header.position, Default::default());
            assert_eq!(header.vitals, Default::default());
            let (chunk, payload) = ChunkHeader::decode(body).unwrap();
            assert_eq!(chunk.offset as usize, rebuilt.len());
            rebuilt.extend_from_slice(payload);
        }
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn test_chunk_packets_capped_by_length_field() {
        let data = vec![5u8; u16::MAX as usize];
        let packets = chunk_packets(0x38, &data, 200_000);
        assert_eq!(packets.len(), 2);

        let mut total = 0;
        for packet in &packets {
            assert!(packet.len() <= MAX_PACKET_SIZE);
            let (_, body) = parse_packet(1, packet).unwrap();
            let (chunk, payload) = ChunkHeader::decode(body).unwrap();
            assert_eq!(chunk.offset as usize, total);
            total += payload.len();
        }
        assert_eq!(total, data.len());
    }

    #[test]
    fn test_send_chunked() {
        let config = config();
        let mut transport = ScriptedTransport::new(pid(0));
        let sent = send_chunked(&mut transport, &config, Target::Broadcast, 0x36, &[1; 50]).unwrap();
        assert_eq!(sent, 2);
        assert_eq!(transport.sent.len(), 2);
    }

    #[test]
    fn test_completed_record_activates_once() {
        let config = config();
        let mut state = SessionState::new(pid(0));
        let mut world = RecordingWorld::new(0);
        let mut deltas = DeltaQueue::new();
        state.slot_mut(pid(2)).state = PeerState::Connected;
        state.slot_mut(pid(2)).turn_bit = true;
        state.active_peers = 1;

        feed_record(&mut state, &mut world, &mut deltas, &config, pid(2), config.announce_cmd);
        assert_eq!(state.peer_state(pid(2)), PeerState::Active);
        assert_eq!(state.active_peers, 2);
        assert!(matches!(
            state.pending_notifications(),
            [Notification::Joined { peer, .. }] if *peer == pid(2)
        ));

        // Duplicate final chunk after completion.
        let dup = chunk(config.announce_cmd, 80, &[7; 20]);
        receive_record_chunk(&mut state, &mut world, &mut deltas, &config, pid(2), &dup);
        // A whole duplicate transfer refreshes without re-counting.
        feed_record(&mut state, &mut world, &mut deltas, &config, pid(2), config.announce_cmd);

        assert_eq!(state.active_peers, 2);
        assert_eq!(state.pending_notifications().len(), 1);
        let activations = world
            .calls
            .iter()
            .filter(|c| matches!(c, WorldCall::Activate(_)))
            .count();
        assert_eq!(activations, 1);
        assert_eq!(
            world.calls.iter().filter(|c| matches!(c, WorldCall::Unpack(..))).count(),
            2
        );
    }

    #[test]
    fn test_announce_queues_ack_once() {
        let config = config();
        let mut state = SessionState::new(pid(0));
        let mut world = RecordingWorld::new(0);
        world.record = vec![1, 2, 3];
        let mut deltas = DeltaQueue::new();

        feed_record(&mut state, &mut world, &mut deltas, &config, pid(1), config.announce_cmd);
        assert_eq!(deltas.len(), 1);

        // An ack is not answered.
        feed_record(&mut state, &mut world, &mut deltas, &config, pid(3), config.ack_cmd);
        assert_eq!(deltas.len(), 1);
        assert_eq!(state.peer_state(pid(3)), PeerState::Active);
        assert!(matches!(
            state.pending_notifications().last(),
            Some(Notification::AlreadyInGame { .. })
        ));
    }

    #[test]
    fn test_offset_mismatch_restarts() {
        let config = config();
        let mut state = SessionState::new(pid(0));
        let mut world = RecordingWorld::new(0);
        let mut deltas = DeltaQueue::new();
        let cmd = config.ack_cmd;

        receive_record_chunk(&mut state, &mut world, &mut deltas, &config, pid(1), &chunk(cmd, 0, &[1; 40]));
        assert_eq!(state.slot(pid(1)).pack_offset, 40);

        // Gap: discarded and reset.
        receive_record_chunk(&mut state, &mut world, &mut deltas, &config, pid(1), &chunk(cmd, 60, &[1; 40]));
        assert_eq!(state.slot(pid(1)).pack_offset, 0);

        // A fresh start is accepted.
        receive_record_chunk(&mut state, &mut world, &mut deltas, &config, pid(1), &chunk(cmd, 0, &[1; 10]));
        assert_eq!(state.slot(pid(1)).pack_offset, 10);
    }

    #[test]
    fn test_overrun_is_discarded() {
        let config = config();
        let mut state = SessionState::new(pid(0));
        let mut world = RecordingWorld::new(0);
        let mut deltas = DeltaQueue::new();

        receive_record_chunk(&mut state, &mut world, &mut deltas, &config, pid(1), &chunk(config.ack_cmd, 0, &[1; 101]));
        assert_eq!(state.slot(pid(1)).pack_offset, 0);
        assert!(world.calls.is_empty());
    }

    #[test]
    fn test_own_chunks_ignored() {
        let config = config();
        let mut state = SessionState::new(pid(0));
        let mut world = RecordingWorld::new(0);
        let mut deltas = DeltaQueue::new();

        let bytes = chunk(config.announce_cmd, 0, &[1; 10]);
        let used = receive_record_chunk(&mut state, &mut world, &mut deltas, &config, pid(0), &bytes);
        assert_eq!(used, bytes.len());
        assert_eq!(state.slot(pid(0)).pack_offset, 0);
        assert!(deltas.is_empty());
    }
}
