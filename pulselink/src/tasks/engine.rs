use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc;

use crate::clock::{Clock, SystemClock};
use crate::control::Command;
use crate::message::Message;
use crate::proto::Envelope;
use crate::sched::TICK_PERIOD;
use crate::session::SessionCore;
use crate::sync::{Authority, Effects, Follower, Role};
use crate::tasks::ticker::Ticker;
use crate::{Channel, Config, Dest, PeerEvent, PulselinkError, Result, RoleKind};

/// The one task that owns all playback state on a device. Scheduler passes,
/// mutations and protocol handling all run on it in turn, so none of them
/// can observe another mid-update.
pub(crate) struct EngineTask {
    core: SessionCore,
    clock: Arc<dyn Clock>,
    role: Box<dyn Role>,
    msg_tx: mpsc::Sender<Message>,
    cmd_rx: mpsc::Receiver<Command>,
    wire_tx: mpsc::Sender<(Dest, Envelope)>,
    peer_rx: mpsc::Receiver<PeerEvent>,
    sched: Ticker,
    beacon: Ticker,
    peers: usize,
    transport_closed: bool,
}

impl EngineTask {
    pub(crate) fn new(
        config: &Config,
        channel: Channel,
        msg_tx: mpsc::Sender<Message>,
        cmd_rx: mpsc::Receiver<Command>,
    ) -> EngineTask {
        let role: Box<dyn Role> = match config.role {
            RoleKind::Host => Box::new(Authority),
            RoleKind::Peer => Box::new(Follower::new(config.max_pulse_correction)),
        };
        EngineTask {
            core: SessionCore::new(config.tempo),
            clock: Arc::new(SystemClock::new()),
            role,
            msg_tx,
            cmd_rx,
            wire_tx: channel.tx,
            peer_rx: channel.rx,
            sched: Ticker::stopped(),
            beacon: Ticker::stopped(),
            peers: 0,
            transport_closed: false,
        }
    }

    pub(crate) async fn run(mut self) -> Result<()> {
        if let Err(e) = self.run_impl().await {
            match e {
                PulselinkError::Terminating => return Ok(()),
                _ => return Err(e),
            }
        }
        Ok(())
    }

    async fn run_impl(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.msg_tx.closed() => {
                    return Ok(());
                }
                _ = self.sched.tick() => {
                    self.on_tick().await?;
                }
                _ = self.beacon.tick() => {
                    self.on_beacon().await?;
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await?,
                        None => return Ok(()),
                    }
                }
                ev = self.peer_rx.recv(), if !self.transport_closed => {
                    match ev {
                        Some(ev) => self.handle_peer_event(ev).await?,
                        None => {
                            debug!(target: "pulselink", "transport closed, continuing standalone");
                            self.transport_closed = true;
                            self.beacon.cancel();
                        }
                    }
                }
            }
        }
    }

    async fn on_tick(&mut self) -> Result<()> {
        let mut fx = Effects::default();
        self.role.on_pass(&mut self.core, self.clock.as_ref(), &mut fx);
        self.core.schedule_pass(self.clock.audio_now(), &mut fx.events);
        self.flush(fx).await
    }

    async fn on_beacon(&mut self) -> Result<()> {
        let mut fx = Effects::default();
        self.role.on_beacon(&mut self.core, self.clock.as_ref(), &mut fx);
        // The period can change between beacons (ping burst draining).
        self.beacon.start(self.role.beacon_period());
        self.flush(fx).await
    }

    async fn handle_command(&mut self, cmd: Command) -> Result<()> {
        let now = self.clock.audio_now();
        let mut fx = Effects::default();
        match cmd {
            Command::Play => {
                if !self.core.session.playing {
                    self.role.on_local_play(&mut self.core, self.clock.as_ref(), &mut fx);
                }
            }
            Command::Stop => {
                if self.core.session.playing {
                    self.role.on_local_stop(&mut self.core, &mut fx);
                }
            }
            Command::SetTempo(bpm) => self.core.set_tempo(now, bpm),
            Command::AddTrack => {
                self.core.add_track(now, &mut fx.events);
            }
            Command::RemoveTrack(track) => {
                self.core.remove_track(track, &mut fx.events);
            }
            Command::SetBarCount { track, count } => {
                self.core.set_bar_count(track, count, &mut fx.events);
            }
            Command::SetBeatsForBar { track, bar, beats } => {
                self.core.set_beats_for_bar(track, bar, beats);
            }
            Command::SetSubdivisionForBar {
                track,
                bar,
                subdivision,
            } => {
                self.core.set_subdivision_for_bar(track, bar, subdivision);
            }
            Command::SetRestsForBar { track, bar, rests } => {
                self.core.set_rests_for_bar(track, bar, rests);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.core.snapshot());
            }
            Command::Restore(snapshot) => {
                if self.core.session.playing {
                    self.role.on_local_stop(&mut self.core, &mut fx);
                }
                self.core.restore(snapshot);
            }
        }
        self.reconcile_ticker();
        self.flush(fx).await
    }

    async fn handle_peer_event(&mut self, ev: PeerEvent) -> Result<()> {
        let mut fx = Effects::default();
        match ev {
            PeerEvent::Connected(peer) => {
                self.peers += 1;
                self.role
                    .on_connected(&mut self.core, self.clock.as_ref(), peer, &mut fx);
                self.beacon.start(self.role.beacon_period());
                fx.events.push(Message::PeerJoined(peer));
            }
            PeerEvent::Disconnected(peer) => {
                self.peers = self.peers.saturating_sub(1);
                self.role.on_disconnected(&mut self.core, peer);
                if self.peers == 0 {
                    self.beacon.cancel();
                }
                fx.events.push(Message::PeerLeft(peer));
            }
            PeerEvent::Message(peer, env) => {
                self.role
                    .on_message(&mut self.core, self.clock.as_ref(), peer, env, &mut fx);
            }
        }
        self.reconcile_ticker();
        self.flush(fx).await
    }

    // The scheduler ticker mirrors the playing flag. Cancelling here, on the
    // same task that runs the passes, guarantees no pass fires after a stop.
    fn reconcile_ticker(&mut self) {
        if self.core.session.playing && !self.sched.is_running() {
            self.sched.start(TICK_PERIOD);
        } else if !self.core.session.playing && self.sched.is_running() {
            self.sched.cancel();
        }
    }

    async fn flush(&mut self, fx: Effects) -> Result<()> {
        for out in fx.wire {
            if self.wire_tx.send(out).await.is_err() {
                if !self.transport_closed {
                    warn!(target: "pulselink", "peer channel gone, continuing standalone");
                    self.transport_closed = true;
                }
                break;
            }
        }
        for msg in fx.events {
            self.msg_tx
                .send(msg)
                .await
                .map_err(|_| PulselinkError::Terminating)?;
        }
        Ok(())
    }
}
