//! Session Coordinator
//!
//! Owns the session state and the transport and exposes the per-tick entry
//! points. The simulation and the command interpreter are borrowed per
//! call, never stored.
//!
//! A driver calls, once per tick:
//!
//! ```text
//! pump_events()                 transport create/leave/message events
//! process_network_packets(..)   departures, loopback, inbound packets
//! handle_delta(..)              deltas, turns, timeout, batch, seeds
//! ```
//!
//! Any fatal error terminates the session; later calls return
//! `CoordinatorError::Terminated`.

use std::collections::VecDeque;
use std::time::Instant;

use tracing::{error, info, instrument, warn};

use crate::config::CoordinatorConfig;
use crate::core::hash::{seed_digest, SeedDigest};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::network::descriptor::GameDescriptor;
use crate::network::transport::{EventKind, PeerLink, Target, Transport, TransportEvent};
use crate::session::delta::{self, DeltaQueue};
use crate::session::notify::Notification;
use crate::session::outbox;
use crate::session::peer::{LeaveReason, PeerId, PeerState};
use crate::session::state::SessionState;
use crate::session::timeout;
use crate::session::tracker;
use crate::session::transfer::send_chunked;
use crate::session::turn::{self, TurnPoll};
use crate::session::world::{CommandInterpreter, World};

/// Lockstep coordinator for one session.
pub struct Coordinator<T: Transport> {
    pub(crate) state: SessionState,
    pub(crate) transport: T,
    pub(crate) config: CoordinatorConfig,
    pub(crate) descriptor: GameDescriptor,
    pub(crate) loopback: VecDeque<Vec<u8>>,
    pub(crate) deltas: DeltaQueue,
    pub(crate) net_inited: bool,
}

impl<T: Transport> Coordinator<T> {
    /// Wrap a transport. Call `init` before ticking.
    pub fn new(transport: T, config: CoordinatorConfig, descriptor: GameDescriptor) -> Self {
        let local = transport.local_peer();
        Self {
            state: SessionState::new(local),
            transport,
            config,
            descriptor,
            loopback: VecDeque::new(),
            deltas: DeltaQueue::new(),
            net_inited: false,
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Start the session: subscribe to events, send the first turn and
    /// announce our player record.
    ///
    /// `joined_midgame` tags the first turn with a delta request.
    #[instrument(skip_all, fields(local = %self.transport.local_peer()))]
    pub fn init<W: World>(&mut self, world: &mut W, joined_midgame: bool) -> CoordinatorResult<()> {
        let local = self.transport.local_peer();
        self.state = SessionState::new(local);
        self.loopback.clear();
        self.deltas.clear();

        let result = self.start(world, joined_midgame);
        self.finish(result)
    }

    fn start<W: World>(&mut self, world: &mut W, joined_midgame: bool) -> CoordinatorResult<()> {
        for kind in EventKind::ALL {
            self.transport
                .register_event_handler(kind)
                .map_err(|source| CoordinatorError::EventRegistration { kind, source })?;
        }
        self.net_inited = true;

        let local = self.state.local;
        self.state.request_delta = joined_midgame;
        {
            let slot = self.state.slot_mut(local);
            slot.turn_bit = joined_midgame;
            slot.link = PeerLink {
                connected: true,
                active: true,
                turn: None,
            };
        }

        turn::send_and_recv_turn(&mut self.state, &mut self.transport, &self.config, 0, 0)?;

        let record = world.pack_local_record();
        send_chunked(
            &mut self.transport,
            &self.config,
            Target::Broadcast,
            self.config.announce_cmd,
            &record,
        )
        .map_err(|e| CoordinatorError::transport("send_message", e))?;

        self.state.slot_mut(local).state = PeerState::Active;
        self.state.active_peers = 1;
        info!(local = %local, joined_midgame, "session initialized");
        Ok(())
    }

    /// Leave the session. Safe to call more than once.
    pub fn close(&mut self) -> CoordinatorResult<()> {
        if !self.net_inited {
            return Ok(());
        }
        self.net_inited = false;

        for kind in EventKind::ALL {
            if let Err(e) = self.transport.unregister_event_handler(kind) {
                warn!(?kind, error = %e, "unregistering event handler failed");
            }
        }
        self.loopback.clear();
        self.deltas.clear();
        info!(local = %self.state.local, "leaving session");
        self.transport
            .leave_game(LeaveReason::None)
            .map_err(|e| CoordinatorError::transport("leave_game", e))
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Apply pending transport events. Returns how many were handled.
    pub fn pump_events(&mut self) -> CoordinatorResult<usize> {
        self.ensure_running()?;
        let mut handled = 0;
        while let Some(event) = self.transport.poll_event() {
            handled += 1;
            match event {
                TransportEvent::PeerCreate { peer, descriptor } => {
                    let result =
                        tracker::on_peer_create(&mut self.state, &self.descriptor, peer, &descriptor);
                    if let Err(e) = result {
                        return self.finish(Err(e));
                    }
                }
                TransportEvent::PeerLeave { peer, payload } => {
                    tracker::on_peer_leave(&mut self.state, &mut self.deltas, peer, &payload);
                }
                TransportEvent::PeerMessage { peer, text } => {
                    self.state.notify(Notification::Text { peer, text });
                }
            }
        }
        Ok(handled)
    }

    /// Run the turn step of a tick.
    ///
    /// Returns `Ok(false)` while turns are stalled; the simulation must not
    /// advance that tick.
    #[instrument(skip_all, fields(local = %self.state.local, loop_count = self.state.loop_count))]
    pub fn handle_delta<W: World>(&mut self, world: &mut W, now: Instant) -> CoordinatorResult<bool> {
        self.ensure_running()?;
        let result = self.exchange_turns(world, now);
        self.finish(result)
    }

    fn exchange_turns<W: World>(&mut self, world: &mut W, now: Instant) -> CoordinatorResult<bool> {
        if self.state.destroyed {
            return Err(CoordinatorError::SessionDestroyed);
        }

        delta::export_pending(&mut self.state, world, &mut self.deltas, &self.config);
        self.deltas.flush(&mut self.transport, &self.config)?;

        let sent = self.state.sent_this_cycle;
        self.state.sent_this_cycle =
            turn::send_and_recv_turn(&mut self.state, &mut self.transport, &self.config, sent, 1)?;

        let received = match turn::recv_turns(&mut self.state, &mut self.transport, &self.config)? {
            TurnPoll::Stalled => {
                timeout::check_timeout(&mut self.state, &mut self.transport, &self.config, now)?;
                return Ok(false);
            }
            TurnPoll::Ready { received } => received,
        };

        self.state.timeout_since = None;
        if received {
            if !self.state.batch_validated {
                self.batch_hi_pri(world)?;
                self.state.batch_validated = false;
            } else {
                self.state.batch_validated = false;
                if !self.state.hi_pri.is_empty() {
                    self.batch_hi_pri(world)?;
                }
            }
        }

        turn::advance_seeds(&mut self.state, world);
        Ok(true)
    }

    fn batch_hi_pri<W: World>(&mut self, world: &mut W) -> CoordinatorResult<()> {
        outbox::send_hi_pri(
            &mut self.state,
            &mut self.transport,
            world,
            &self.config,
            Target::Broadcast,
            None,
        )
    }

    /// Start the stall clock, e.g. when the driver shows a wait cursor.
    pub fn net_ping(&mut self, now: Instant) {
        timeout::net_ping(&mut self.state, now);
    }

    /// Queue a command for the local peer; applied on the next dispatch.
    pub fn msg_add(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.loopback.push_back(bytes.to_vec());
        }
    }

    /// Replay a departure the command layer queued while buffering.
    pub fn player_left<W: World, C: CommandInterpreter>(
        &mut self,
        world: &mut W,
        commands: &mut C,
        peer: PeerId,
        reason: LeaveReason,
    ) {
        tracker::player_left(&mut self.state, world, commands, peer, reason);
    }

    /// Drain notifications for the UI.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.state.take_notifications()
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Our slot.
    pub fn local(&self) -> PeerId {
        self.state.local
    }

    /// Session state, read-only.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Configuration in use.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Our game descriptor.
    pub fn descriptor(&self) -> &GameDescriptor {
        &self.descriptor
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutable.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Loop counter feeding the seeds.
    pub fn loop_count(&self) -> u32 {
        self.state.loop_count
    }

    /// Simulated slots, ours included.
    pub fn active_peers(&self) -> u8 {
        self.state.active_peers
    }

    /// Slot exporting deltas.
    pub fn delta_sender(&self) -> Option<PeerId> {
        self.state.delta_sender
    }

    /// Some peer completed the game.
    pub fn somebody_won(&self) -> bool {
        self.state.somebody_won
    }

    /// Quorum was lost.
    pub fn is_destroyed(&self) -> bool {
        self.state.destroyed
    }

    /// A fatal error ended the session.
    pub fn is_terminated(&self) -> bool {
        self.state.terminated
    }

    /// Digest of this tick's seed table for `entity_count` entities.
    pub fn seed_digest(&self, entity_count: usize) -> SeedDigest {
        seed_digest(self.state.loop_count, entity_count)
    }

    // =========================================================================
    // INTERNAL
    // =========================================================================

    pub(crate) fn ensure_running(&self) -> CoordinatorResult<()> {
        if self.state.terminated {
            Err(CoordinatorError::Terminated)
        } else {
            Ok(())
        }
    }

    /// Mark the session terminated on a fatal error.
    pub(crate) fn finish<R>(&mut self, result: CoordinatorResult<R>) -> CoordinatorResult<R> {
        if let Err(e) = &result {
            error!(local = %self.state.local, error = %e, "session terminated");
            self.state.terminated = true;
        }
        result
    }
}

// =============================================================================
// TESTS
// =============================================================================
