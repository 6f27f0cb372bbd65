//! Lockstep Demo
//!
//! Runs four coordinators over an in-process loopback hub, drives them at
//! the descriptor's tick rate and checks that every peer ends on the same
//! seed table.

use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lockstep_sync::{
    network::{header::Tile, header::Vitals, LoopbackHub, LoopbackTransport},
    session::transfer::ChunkHeader,
    Avatar, CommandInterpreter, Coordinator, CoordinatorConfig, GameDescriptor, LeaveReason,
    PeerId, Target, World, MAX_PEERS, VERSION,
};

/// Ticks the demo runs for.
const DEMO_TICKS: u32 = 100;

/// Entities that receive a seed every tick.
const DEMO_ENTITIES: usize = 32;

/// Ticks between chat messages from peer 0.
const CHAT_INTERVAL: u32 = 25;

/// Command id of a chat message: `[CHAT_CMD][len u8][text]`.
const CHAT_CMD: u8 = 0x01;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    let config = match std::env::args().nth(1) {
        Some(path) => CoordinatorConfig::load(&path)?,
        None => CoordinatorConfig::default(),
    };

    info!("Lockstep Sync v{}", VERSION);
    run_demo(config).await
}

// =============================================================================
// DEMO DRIVER
// =============================================================================

struct DemoPeer {
    coordinator: Coordinator<LoopbackTransport>,
    world: DemoWorld,
    commands: DemoInterpreter,
    advanced: u32,
}

async fn run_demo(config: CoordinatorConfig) -> anyhow::Result<()> {
    if config.is_record_cmd(CHAT_CMD) || config.delta_cmd == CHAT_CMD {
        bail!("command id {CHAT_CMD:#04x} is reserved for chat");
    }
    let hub = LoopbackHub::new();
    let descriptor = GameDescriptor::new(0x5EED, 20);
    let encoded = descriptor.encode().context("encoding game descriptor")?;

    let mut peers: Vec<DemoPeer> = (0..MAX_PEERS as u8)
        .map(PeerId::new)
        .map(|peer| DemoPeer {
            coordinator: Coordinator::new(hub.join(peer), config.clone(), descriptor),
            world: DemoWorld::new(peer, config.record_size),
            commands: DemoInterpreter::new(peer, config.delta_cmd),
            advanced: 0,
        })
        .collect();

    for p in &mut peers {
        p.coordinator
            .init(&mut p.world, false)
            .context("coordinator init")?;
    }
    for p in &peers {
        hub.announce_create(p.coordinator.local(), encoded.clone());
    }

    let tick = Duration::from_millis(u64::from(descriptor.tick_delay_ms()));
    let mut interval = tokio::time::interval(tick);
    info!(peers = peers.len(), ticks = DEMO_TICKS, tick_ms = tick.as_millis() as u64, "running demo");

    for t in 0..DEMO_TICKS {
        interval.tick().await;
        let now = Instant::now();

        for p in &mut peers {
            p.coordinator.pump_events()?;
            p.coordinator
                .process_network_packets(&mut p.world, &mut p.commands)?;

            if t % CHAT_INTERVAL == 0 && p.coordinator.local() == PeerId::new(0) {
                let msg = chat_message(&format!("tick {t}"));
                p.coordinator.send_lo_pri(&p.world, Target::Broadcast, &msg)?;
            }

            if p.coordinator.handle_delta(&mut p.world, now)? {
                p.advanced += 1;
            }
            for note in p.coordinator.take_notifications() {
                info!(local = %p.coordinator.local(), "{note}");
            }
        }
    }

    let mut digests = Vec::with_capacity(peers.len());
    for p in &mut peers {
        let digest = p.coordinator.seed_digest(DEMO_ENTITIES);
        info!(
            peer = %p.coordinator.local(),
            advanced = p.advanced,
            loop_count = p.coordinator.loop_count(),
            active = p.coordinator.active_peers(),
            chat = p.commands.received,
            digest = %hex::encode(&digest[..8]),
            "peer finished"
        );
        digests.push(digest);
        p.coordinator.close()?;
    }

    if digests.windows(2).any(|w| w[0] != w[1]) {
        bail!("peers diverged: seed tables differ");
    }
    info!(digest = %hex::encode(digests[0]), "all peers in lockstep");
    Ok(())
}

// =============================================================================
// DEMO SIMULATION
// =============================================================================

/// Minimal simulation: one avatar per slot and a seed table.
struct DemoWorld {
    local: PeerId,
    avatars: [Avatar; MAX_PEERS],
    seeds: Vec<u32>,
    record: Vec<u8>,
}

impl DemoWorld {
    fn new(local: PeerId, record_size: usize) -> Self {
        let mut avatars = [Avatar::default(); MAX_PEERS];
        for (i, avatar) in avatars.iter_mut().enumerate() {
            let tile = Tile::new(10 + 4 * i as u8, 10);
            *avatar = Avatar {
                tile,
                future: tile,
                target: tile,
                vitals: Vitals {
                    hit_points: 64,
                    max_hit_points: 64,
                    strength: 20,
                    magic: 15,
                    dexterity: 25,
                },
                level: 1,
                level_changing: false,
                char_level: 1,
            };
        }
        Self {
            local,
            avatars,
            seeds: vec![0; DEMO_ENTITIES],
            record: vec![local.index() as u8; record_size],
        }
    }
}

impl World for DemoWorld {
    fn entity_count(&self) -> usize {
        self.seeds.len()
    }

    fn set_entity_seed(&mut self, entity: usize, seed: u32) {
        if let Some(slot) = self.seeds.get_mut(entity) {
            *slot = seed;
        }
    }

    fn current_level(&self) -> u8 {
        self.avatars[self.local.index()].level
    }

    fn avatar(&self, peer: PeerId) -> Option<Avatar> {
        self.avatars.get(peer.index()).copied()
    }

    fn peer_name(&self, peer: PeerId) -> String {
        format!("player{}", peer.index() + 1)
    }

    fn set_last_position(&mut self, _peer: PeerId, _tile: Tile) {}

    fn set_vitals(&mut self, peer: PeerId, vitals: Vitals) {
        self.avatars[peer.index()].vitals = vitals;
    }

    fn is_tile_occupied(&self, tile: Tile) -> bool {
        self.avatars.iter().any(|a| a.tile == tile)
    }

    fn teleport(&mut self, peer: PeerId, tile: Tile) {
        self.place(peer, tile);
    }

    fn set_future(&mut self, peer: PeerId, tile: Tile) {
        self.avatars[peer.index()].future = tile;
    }

    fn place(&mut self, peer: PeerId, tile: Tile) {
        let avatar = &mut self.avatars[peer.index()];
        avatar.tile = tile;
        avatar.future = tile;
    }

    fn make_path(&mut self, peer: PeerId, target: Tile) {
        self.avatars[peer.index()].target = target;
    }

    fn remove_presence(&mut self, peer: PeerId) {
        debug!(peer = %peer, "presence removed");
    }

    fn pack_local_record(&self) -> Vec<u8> {
        self.record.clone()
    }

    fn unpack_record(&mut self, peer: PeerId, record: &[u8]) {
        debug!(peer = %peer, len = record.len(), "record loaded");
    }

    fn activate(&mut self, peer: PeerId) {
        self.avatars[peer.index()].char_level = 1;
    }

    fn export_delta(&mut self, _peer: PeerId) -> Vec<Vec<u8>> {
        vec![self.seeds.iter().flat_map(|s| s.to_le_bytes()).collect()]
    }

    fn sync_entities(&mut self, _budget: usize) -> Vec<u8> {
        Vec::new()
    }
}

/// Frame `text` as a chat command, truncated to 255 bytes.
fn chat_message(text: &str) -> Vec<u8> {
    let text = &text.as_bytes()[..text.len().min(u8::MAX as usize)];
    let mut msg = Vec::with_capacity(2 + text.len());
    msg.push(CHAT_CMD);
    msg.push(text.len() as u8);
    msg.extend_from_slice(text);
    msg
}

/// Interprets chat commands and skips delta chunks.
struct DemoInterpreter {
    local: PeerId,
    delta_cmd: u8,
    received: u32,
}

impl DemoInterpreter {
    fn new(local: PeerId, delta_cmd: u8) -> Self {
        Self {
            local,
            delta_cmd,
            received: 0,
        }
    }
}

impl CommandInterpreter for DemoInterpreter {
    fn apply_command(&mut self, peer: PeerId, bytes: &[u8]) -> usize {
        let Some(&first) = bytes.first() else {
            return 0;
        };
        if first == self.delta_cmd {
            return ChunkHeader::decode(bytes).map_or(0, |(chunk, _)| chunk.wire_len());
        }
        if first != CHAT_CMD {
            debug!(local = %self.local, from = %peer, cmd = first, "unknown command");
            return 0;
        }

        let Some(&len) = bytes.get(1) else {
            return 0;
        };
        let Some(text) = bytes.get(2..2 + len as usize) else {
            return 0;
        };
        let text = String::from_utf8_lossy(text);
        debug!(local = %self.local, from = %peer, %text, "chat");
        self.received += 1;
        2 + len as usize
    }

    fn is_buffering(&self) -> bool {
        false
    }

    fn queue_departure(&mut self, peer: PeerId, reason: LeaveReason) {
        warn!(peer = %peer, ?reason, "departure queued outside buffering");
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_never_looks_like_record_chunk() {
        let config = CoordinatorConfig::default();
        // Length byte equal to a record command id.
        let text = "x".repeat(config.announce_cmd as usize);
        let msg = chat_message(&text);
        assert_eq!(msg[0], CHAT_CMD);
        assert_eq!(msg[1], config.announce_cmd);
        assert!(!config.is_record_cmd(msg[0]));

        let mut commands = DemoInterpreter::new(PeerId::new(0), config.delta_cmd);
        assert_eq!(commands.apply_command(PeerId::new(1), &msg), msg.len());
        assert_eq!(commands.received, 1);
    }

    #[test]
    fn test_interpreter_rejects_truncated_chat() {
        let mut commands = DemoInterpreter::new(PeerId::new(0), 0x38);
        let msg = chat_message("hello");
        assert_eq!(commands.apply_command(PeerId::new(1), &msg[..4]), 0);
        assert_eq!(commands.apply_command(PeerId::new(1), &[0x7F, 1, 2]), 0);
        assert_eq!(commands.received, 0);

        let long = chat_message(&"y".repeat(300));
        assert_eq!(long.len(), 2 + 255);
    }
}
